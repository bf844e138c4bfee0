//! Error types for riskrelay

use thiserror::Error;

/// Main error type for riskrelay operations
#[derive(Error, Debug)]
pub enum RiskError {
    /// Certificate bytes did not match the expected wire layout
    #[error("Format error: {0}")]
    Format(String),

    /// Cryptographic operation failed (key mismatch, padding failure, corrupt data)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Remote store returned a failure status or the network call failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Entity failed a model invariant (e.g. interval begin >= end)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using RiskError
pub type RiskResult<T> = Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RiskError::Format("bad magic".to_string());
        assert_eq!(format!("{}", err), "Format error: bad magic");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let risk_err: RiskError = io_err.into();
        assert!(matches!(risk_err, RiskError::Io(_)));
    }
}
