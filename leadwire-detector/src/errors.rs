//! Error types for leader detection.

use leadwire_core::CoreError;
use thiserror::Error;

/// Result type for leader detection operations
pub type DetectorResult<T> = Result<T, DetectorError>;

/// Errors that can occur while detecting the cluster leader
#[derive(Error, Debug)]
pub enum DetectorError {
    /// None of the ensemble hosts could be reached
    #[error("Unable to reach coordination ensemble {hosts:?}: {reason}")]
    Connection { hosts: Vec<String>, reason: String },

    /// `start` was called more than once
    #[error("Leader watcher already started")]
    AlreadyStarted,

    /// The election path could not be watched
    #[error("Leader watcher failed to start: {reason}")]
    Start { reason: String },

    /// The watcher has been stopped
    #[error("Leader watcher stopped")]
    Stopped,

    /// Configuration error
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    /// Failure reported by the coordination service
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoreError),

    /// Internal system error
    #[error("Internal system error: {reason}")]
    Internal { reason: String },
}

impl DetectorError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        DetectorError::ConfigError {
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for DetectorError {
    fn from(err: anyhow::Error) -> Self {
        DetectorError::Internal {
            reason: err.to_string(),
        }
    }
}
