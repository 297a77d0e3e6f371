//! Session-affine RPC client state.

use crate::redirect::resolve_redirect;
use crate::{ClientConfig, ClientError, ClientResult};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use leadwire_core::transport::{Request, Response, Transport};
use leadwire_core::{Codec, PayloadCodec};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Reconfiguration applied to a live client
#[derive(Debug, Clone)]
pub enum ClientOpt {
    /// Re-target every later request
    Endpoint(Url),
    /// Attach a header to every later request, replacing any previous value
    Header(HeaderName, HeaderValue),
    MaxRedirects(u32),
}

/// Statistics about client traffic
#[derive(Debug, Default, Clone)]
pub struct ClientStats {
    pub requests_sent: u64,
    pub redirects_followed: u64,
    pub subscribes: u64,
    pub calls: u64,
}

#[derive(Debug)]
struct ClientState {
    endpoint: Url,
    headers: HeaderMap,
    max_redirects: u32,
}

/// Result of one attempt
pub(crate) enum Delivery {
    Delivered(Response),
    NotLeader { response: Response, hint: String },
}

/// RPC client bound to the current cluster leader.
///
/// `subscribe` opens the long-lived session and yields the session token,
/// which, once applied, rides on every later `call`. Leader redirects are
/// followed transparently, bounded by `max_redirects`.
pub struct Client {
    transport: Arc<dyn Transport>,
    codec: Codec,
    config: ClientConfig,
    session_header: HeaderName,
    state: RwLock<ClientState>,
    pub(crate) subscribe_gate: tokio::sync::Mutex<()>,
    stats: Mutex<ClientStats>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let session_header = HeaderName::from_bytes(config.session_header.as_bytes())
            .map_err(|e| ClientError::config(format!("invalid session header: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::config(format!("invalid value for header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        info!("RPC client targeting {}", endpoint);

        Ok(Self {
            transport,
            codec: config.codec.codec(),
            state: RwLock::new(ClientState {
                endpoint,
                headers,
                max_redirects: config.max_redirects,
            }),
            session_header,
            config,
            subscribe_gate: tokio::sync::Mutex::new(()),
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn endpoint(&self) -> Url {
        self.state.read().endpoint.clone()
    }

    pub fn max_redirects(&self) -> u32 {
        self.state.read().max_redirects
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session token attached to outgoing requests, if one was applied.
    pub fn session_token(&self) -> Option<String> {
        self.state
            .read()
            .headers
            .get(&self.session_header)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    }

    pub(crate) fn session_header(&self) -> &HeaderName {
        &self.session_header
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    pub fn apply(&self, opt: ClientOpt) {
        let mut state = self.state.write();
        match opt {
            ClientOpt::Endpoint(url) => {
                debug!("Re-targeting client to {}", url);
                state.endpoint = url;
            }
            ClientOpt::Header(name, value) => {
                state.headers.insert(name, value);
            }
            ClientOpt::MaxRedirects(max) => state.max_redirects = max,
        }
    }

    /// Points the client at `host_port`, keeping scheme and path.
    ///
    /// Meant for leader-change callbacks that hand over a new leader address.
    pub fn retarget(&self, host_port: &str) -> ClientResult<Url> {
        let mut state = self.state.write();
        let target = resolve_redirect(&state.endpoint, host_port).ok_or_else(|| ClientError::InvalidRedirect {
            hint: host_port.to_string(),
        })?;
        if target != state.endpoint {
            info!("Re-targeting client from {} to {}", state.endpoint, target);
            state.endpoint = target.clone();
        }
        Ok(target)
    }

    /// Resolves `hint` against the current endpoint and switches to it in a
    /// single critical section.
    pub(crate) fn redirect(&self, hint: &str) -> Option<Url> {
        let mut state = self.state.write();
        let target = resolve_redirect(&state.endpoint, hint)?;
        state.endpoint = target.clone();
        Some(target)
    }

    pub(crate) fn record_redirect(&self) {
        self.stats.lock().redirects_followed += 1;
    }

    pub(crate) fn record_call(&self, subscribe: bool) {
        let mut stats = self.stats.lock();
        if subscribe {
            stats.subscribes += 1;
        } else {
            stats.calls += 1;
        }
    }

    pub(crate) fn encode<M>(&self, message: &M) -> ClientResult<Bytes>
    where
        M: leadwire_core::Marshal + ?Sized,
    {
        Ok(Bytes::from(message.marshal(&self.codec)?))
    }

    /// One attempt against the current endpoint.
    pub(crate) async fn send_raw(&self, body: &Bytes, expect_streamed: bool) -> ClientResult<Delivery> {
        let mut request = {
            let state = self.state.read();
            let mut request = Request::post(state.endpoint.clone()).with_body(body.clone());
            request.headers = state.headers.clone();
            request
        };
        let media_type = HeaderValue::from_static(self.codec.media_type());
        request.headers.insert(CONTENT_TYPE, media_type.clone());
        request.headers.insert(ACCEPT, media_type);
        if !expect_streamed {
            request = request.with_timeout(self.config.request_timeout);
        }

        let target = request.url.clone();
        self.stats.lock().requests_sent += 1;
        let response = match tokio::time::timeout(self.config.request_timeout, self.transport.send(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    operation: format!("request to {}", target),
                    elapsed: self.config.request_timeout,
                })
            }
        };

        let status = response.status();
        if status.is_success() {
            Ok(Delivery::Delivered(response))
        } else if status == StatusCode::TEMPORARY_REDIRECT {
            let hint = response.header(LOCATION.as_str()).unwrap_or_default().to_string();
            debug!("{} is not the leader, hint {:?}", target, hint);
            Ok(Delivery::NotLeader { response, hint })
        } else {
            response.close();
            Err(ClientError::Status {
                status: status.as_u16(),
            })
        }
    }

    /// Bounds a whole redirect sequence by the call deadline.
    pub(crate) async fn bounded<T>(
        &self,
        operation: &str,
        future: impl Future<Output = ClientResult<T>>,
    ) -> ClientResult<T> {
        tokio::time::timeout(self.config.call_deadline, future)
            .await
            .map_err(|_| ClientError::Timeout {
                operation: operation.to_string(),
                elapsed: self.config.call_deadline,
            })?
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Client")
            .field("endpoint", &state.endpoint.as_str())
            .field("max_redirects", &state.max_redirects)
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadwire_core::CoreError;

    struct Refusing;

    #[async_trait]
    impl Transport for Refusing {
        async fn send(&self, _request: Request) -> leadwire_core::Result<Response> {
            Err(CoreError::connection("refused"))
        }
    }

    fn client() -> Client {
        Client::new(Arc::new(Refusing), ClientConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_headers() {
        let config = ClientConfig::default().with_header("bad header", "x");
        assert!(matches!(
            Client::new(Arc::new(Refusing), config),
            Err(ClientError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_apply_options() {
        let client = client();
        client.apply(ClientOpt::MaxRedirects(4));
        client.apply(ClientOpt::Endpoint(Url::parse("https://leader:8443/api").unwrap()));
        client.apply(ClientOpt::Header(
            HeaderName::from_static("mesos-stream-id"),
            HeaderValue::from_static("abc"),
        ));

        assert_eq!(client.max_redirects(), 4);
        assert_eq!(client.endpoint().as_str(), "https://leader:8443/api");
        assert_eq!(client.session_token().as_deref(), Some("abc"));
        assert!(format!("{:?}", client).contains("leader:8443"));
    }

    #[test]
    fn test_redirect_swaps_endpoint() {
        let client = client();
        let target = client.redirect("//10.0.0.2:5051").unwrap();
        assert_eq!(client.endpoint(), target);
        assert!(client.redirect("").is_none());
        assert_eq!(client.endpoint(), target);
    }

    #[test]
    fn test_retarget_to_ipv6_leader() {
        let client = client();
        let address = leadwire_core::LeaderInfo::new("m", "::1", 5051).host_port().unwrap();
        let target = client.retarget(&address).unwrap();
        assert_eq!(target.host_str(), Some("[::1]"));
        assert_eq!(target.port(), Some(5051));
        assert_eq!(client.endpoint(), target);
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced() {
        let client = client();
        let err = client.call_no_data(&"ping").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(CoreError::Connection { .. })));
        assert_eq!(client.stats().requests_sent, 1);
    }
}
