//! Error types for the session-affine RPC client.

use leadwire_core::CoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse classification of client failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The endpoint could not be reached or did not answer in time
    Connectivity,
    /// The server answered in a way the protocol does not allow
    ProtocolViolation,
    /// Leadership moved more often than the client may follow
    LeadershipTransition,
    /// A payload could not be encoded or decoded
    Decode,
    Other,
}

/// Errors that can occur while talking to the cluster leader
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failure reported by the transport or the codec
    #[error("Transport error: {0}")]
    Transport(#[from] CoreError),

    /// A successful subscribe response lacked the session header
    #[error("Subscribe response is missing the {header} header")]
    MissingSessionToken { header: String },

    /// A "not leader" response carried an unusable redirect hint
    #[error("Invalid leader redirect hint {hint:?}")]
    InvalidRedirect { hint: String },

    /// The redirect budget was exhausted
    #[error("Leader changed {attempts} times, last target {target}")]
    LeaderChanged { attempts: u32, target: String },

    /// Non-success, non-redirect HTTP status
    #[error("Unexpected response status {status}")]
    Status { status: u16 },

    #[error("Timeout in {operation} after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    /// Another subscribe on this client has not completed yet
    #[error("A subscribe call is already in flight")]
    SubscribeInFlight,

    /// Configuration error
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    /// Internal system error
    #[error("Internal system error: {reason}")]
    Internal { reason: String },
}

impl ClientError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        ClientError::ConfigError {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(e) if e.is_codec() => ErrorKind::Decode,
            ClientError::Transport(_) | ClientError::Timeout { .. } => ErrorKind::Connectivity,
            ClientError::MissingSessionToken { .. } | ClientError::InvalidRedirect { .. } => {
                ErrorKind::ProtocolViolation
            }
            ClientError::LeaderChanged { .. } => ErrorKind::LeadershipTransition,
            ClientError::Status { .. }
            | ClientError::SubscribeInFlight
            | ClientError::ConfigError { .. }
            | ClientError::Internal { .. } => ErrorKind::Other,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_retryable(),
            ClientError::Timeout { .. } | ClientError::LeaderChanged { .. } => true,
            ClientError::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Internal {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            ClientError::from(CoreError::connection("refused")).kind(),
            ErrorKind::Connectivity
        );
        assert_eq!(
            ClientError::from(CoreError::decode("bad")).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            ClientError::MissingSessionToken {
                header: "Mesos-Stream-Id".into()
            }
            .kind(),
            ErrorKind::ProtocolViolation
        );
        assert_eq!(
            ClientError::LeaderChanged {
                attempts: 1,
                target: "http://b:5050/api/v1/scheduler".into()
            }
            .kind(),
            ErrorKind::LeadershipTransition
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Status { status: 503 }.is_retryable());
        assert!(!ClientError::Status { status: 400 }.is_retryable());
        assert!(!ClientError::SubscribeInFlight.is_retryable());
        assert!(!ClientError::InvalidRedirect { hint: String::new() }.is_retryable());
    }
}
