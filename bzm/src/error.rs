/*!
Common error types for the BZM protocol codec.
*/

use thiserror::Error;

use crate::transport::TransportError;

/// Common result type used throughout the codec
pub type Result<T> = std::result::Result<T, BzmError>;

/// Error type for every command and decode operation
#[derive(Error, Debug)]
pub enum BzmError {
    /// Caller-side contract violation, detected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure, or a reply that failed validation
    #[error("I/O failure: {0}")]
    Io(String),

    /// The transport gave up waiting for a reply
    #[error("Timed out waiting for reply")]
    Timeout,
}

impl BzmError {
    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new I/O failure error
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Whether the device stayed silent, as opposed to answering wrongly
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<TransportError> for BzmError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            other => Self::Io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_stays_timeout() {
        let err: BzmError = TransportError::Timeout.into();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_transport_failures_map_to_io() {
        let err: BzmError = TransportError::failed("line stuck low").into();
        assert!(matches!(err, BzmError::Io(ref msg) if msg.contains("line stuck low")));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: BzmError = TransportError::from(io).into();
        assert!(matches!(err, BzmError::Io(_)));
        assert!(!err.is_timeout());
    }
}
