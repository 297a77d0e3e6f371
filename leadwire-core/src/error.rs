//! # Error Types
//!
//! Error handling shared by the coordination seam, the transport seam and
//! the payload codec.

use thiserror::Error;

/// Errors raised below the watcher and the RPC client.
///
/// Coordination-service and transport implementations report failures with
/// these variants; the detector and client crates wrap them in their own
/// error enums.
///
/// # Error Categories
///
/// - **Connectivity**: the ensemble or an RPC endpoint cannot be reached
/// - **Coordination**: missing nodes and expired or closed sessions
/// - **Codec**: payloads that cannot be encoded or decoded
/// - **Timeout**: operations that exceed their time limit
///
/// # Examples
///
/// ```rust
/// use leadwire_core::CoreError;
///
/// let error = CoreError::connection("connection refused");
/// if error.is_retryable() {
///     println!("This error can be retried");
/// }
/// ```
#[derive(Error, Debug)]
pub enum CoreError {
    /// The remote side could not be reached
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The addressed coordination node does not exist
    #[error("Node {path} does not exist")]
    NoNode { path: String },

    /// The coordination session expired; its ephemeral nodes are gone
    #[error("Coordination session expired")]
    SessionExpired,

    /// The coordination session was closed locally
    #[error("Coordination session closed")]
    SessionClosed,

    /// Operation exceeded its timeout limit
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// A value could not be encoded
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// A payload could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// An address or URL could not be parsed
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// File system or network I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Creates a new connection error with the given message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new missing-node error for `path`.
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    /// Creates a new timeout error naming the operation that timed out.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates a new encode error with the given message.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a new decode error with the given message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Determines if this error condition is potentially recoverable.
    ///
    /// Connectivity problems and timeouts are transient. Missing nodes,
    /// codec failures and closed sessions will not change on retry.
    ///
    /// ```rust
    /// use leadwire_core::CoreError;
    ///
    /// assert!(CoreError::timeout("get /leader/info_1").is_retryable());
    /// assert!(!CoreError::no_node("/leader/info_1").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }

    /// True for codec failures.
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode { .. })
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal {
            message: err.to_string(),
        }
    }
}
