use crate::{ClientError, ClientResult};
use leadwire_core::CodecConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Header carrying the server-issued session token
pub const SESSION_TOKEN_HEADER: &str = "Mesos-Stream-Id";

/// Redirects followed per call unless configured otherwise
pub const DEFAULT_MAX_REDIRECTS: u32 = 1;

/// Configuration for the session-affine RPC client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Initial RPC endpoint, e.g. `http://127.0.0.1:5050/api/v1/scheduler`
    pub endpoint: String,

    /// Leader redirects followed before a call fails
    pub max_redirects: u32,

    /// Bound on each attempt; not applied while reading a streamed body
    pub request_timeout: Duration,

    /// Bound on a whole call including its redirects
    pub call_deadline: Duration,

    pub codec: CodecConfig,

    /// Response header carrying the session token
    pub session_header: String,

    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5050/api/v1/scheduler".to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            request_timeout: Duration::from_secs(10),
            call_deadline: Duration::from_secs(30),
            codec: CodecConfig::default(),
            session_header: SESSION_TOKEN_HEADER.to_string(),
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    pub fn with_binary_codec(mut self) -> Self {
        self.codec.use_binary = true;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Parsed endpoint URL.
    pub fn endpoint_url(&self) -> ClientResult<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        if url.host_str().is_none() {
            return Err(ClientError::config(format!("endpoint {} has no host", self.endpoint)));
        }
        Ok(url)
    }

    pub fn validate(&self) -> ClientResult<()> {
        self.endpoint_url()?;
        if self.session_header.is_empty() {
            return Err(ClientError::config("session_header must not be empty"));
        }
        if self.request_timeout.is_zero() || self.call_deadline.is_zero() {
            return Err(ClientError::config("timeouts must be positive"));
        }
        Ok(())
    }
}
