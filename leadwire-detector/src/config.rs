use crate::{DetectorError, DetectorResult};
use leadwire_core::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix of election nodes carrying a JSON payload
pub const JSON_MEMBER_PREFIX: &str = "json.info_";

/// Prefix of election nodes carrying a binary payload
pub const BINARY_MEMBER_PREFIX: &str = "info_";

/// Configuration for the leader watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Coordination ensemble hosts as `host:port`
    pub hosts: Vec<String>,

    /// Path under which candidates publish their election nodes
    pub election_path: String,

    /// Name prefix of JSON election nodes
    pub json_prefix: String,

    /// Name prefix of binary election nodes
    pub binary_prefix: String,

    /// Bound on dialing the ensemble
    pub dial_timeout: Duration,

    /// Retry policy for listing members and reading the leader's payload
    pub read_retry: RetryConfig,

    /// Backoff between redials after the session expires; attempts are unbounded
    pub reconnect_backoff: RetryConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:2181".to_string()],
            election_path: "/mesos".to_string(),
            json_prefix: JSON_MEMBER_PREFIX.to_string(),
            binary_prefix: BINARY_MEMBER_PREFIX.to_string(),
            dial_timeout: Duration::from_secs(5),
            read_retry: RetryConfig::new(3, Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(2)),
            reconnect_backoff: RetryConfig::new(0, Duration::from_millis(250))
                .with_max_delay(Duration::from_secs(30)),
        }
    }
}

impl DetectorConfig {
    pub fn new(hosts: Vec<String>, election_path: impl Into<String>) -> Self {
        Self {
            hosts,
            election_path: election_path.into(),
            ..Default::default()
        }
    }

    /// Parses an ensemble URL such as `zk://10.0.0.1:2181,10.0.0.2:2181/mesos`.
    ///
    /// ```rust
    /// use leadwire_detector::DetectorConfig;
    ///
    /// let config = DetectorConfig::from_url("zk://127.0.0.1:2181/mesos").unwrap();
    /// assert_eq!(config.hosts, vec!["127.0.0.1:2181".to_string()]);
    /// assert_eq!(config.election_path, "/mesos");
    ///
    /// assert!(DetectorConfig::from_url("zk://127.0.0.1:2181").is_err());
    /// ```
    pub fn from_url(url: &str) -> DetectorResult<Self> {
        let rest = url.trim().strip_prefix("zk://").ok_or_else(|| {
            DetectorError::config(format!("unsupported ensemble url {}, expected zk://", url))
        })?;

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };

        let hosts: Vec<String> = authority
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(String::from)
            .collect();
        if hosts.is_empty() {
            return Err(DetectorError::config(format!("no ensemble hosts in {}", url)));
        }

        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(DetectorError::config(format!("missing election path in {}", url)));
        }

        Ok(Self::new(hosts, path))
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_read_retry(mut self, retry: RetryConfig) -> Self {
        self.read_retry = retry;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: RetryConfig) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_prefixes(mut self, json_prefix: impl Into<String>, binary_prefix: impl Into<String>) -> Self {
        self.json_prefix = json_prefix.into();
        self.binary_prefix = binary_prefix.into();
        self
    }

    pub fn validate(&self) -> DetectorResult<()> {
        if self.hosts.is_empty() {
            return Err(DetectorError::config("at least one ensemble host is required"));
        }
        if !self.election_path.starts_with('/') {
            return Err(DetectorError::config(format!(
                "election path {} must be absolute",
                self.election_path
            )));
        }
        if self.json_prefix.is_empty() || self.binary_prefix.is_empty() {
            return Err(DetectorError::config("member prefixes must not be empty"));
        }
        if self.read_retry.max_attempts == 0 {
            return Err(DetectorError::config("read_retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_multiple_hosts() {
        let config = DetectorConfig::from_url("zk://10.0.0.1:2181,10.0.0.2:2181/mesos/").unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[1], "10.0.0.2:2181");
        assert_eq!(config.election_path, "/mesos");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_url_nested_path() {
        let config = DetectorConfig::from_url("zk://zk1:2181/prod/mesos").unwrap();
        assert_eq!(config.election_path, "/prod/mesos");
    }

    #[test]
    fn test_from_url_rejects_bad_input() {
        assert!(matches!(
            DetectorConfig::from_url("http://127.0.0.1:2181/mesos"),
            Err(DetectorError::ConfigError { .. })
        ));
        assert!(DetectorConfig::from_url("zk:///mesos").is_err());
        assert!(DetectorConfig::from_url("zk://127.0.0.1:2181/").is_err());
    }

    #[test]
    fn test_validate() {
        let config = DetectorConfig::new(vec![], "/mesos");
        assert!(config.validate().is_err());

        let config = DetectorConfig::new(vec!["zk:2181".into()], "mesos");
        assert!(config.validate().is_err());

        let config = DetectorConfig::default().with_read_retry(RetryConfig::new(0, Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = DetectorConfig::from_url("zk://zk1:2181/mesos")
            .unwrap()
            .with_prefixes("json.leader_", "leader_");
        let json = serde_json::to_string(&config).unwrap();
        let decoded: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.hosts, config.hosts);
        assert_eq!(decoded.json_prefix, "json.leader_");
        assert_eq!(decoded.dial_timeout, config.dial_timeout);
    }
}
