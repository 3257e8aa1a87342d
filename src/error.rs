use thiserror::Error;

/// Main error type for svctopo
#[derive(Error, Debug)]
pub enum SvcTopoError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-retryable API response (4xx other than 429)
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Retry budget exhausted on a transient failure (429, 5xx, connection, timeout)
    #[error("Retries exhausted after {attempts} attempts: {message}")]
    Exhausted { attempts: usize, message: String },

    /// TLS/certificate failure, never retried
    #[error("TLS error: {0}. Try disabling SSL verification if the server uses self-signed certificates.")]
    Tls(String),

    /// Cooperative cancellation was requested
    #[error("Operation cancelled")]
    Cancelled,

    /// Malformed API payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Export file writing errors
    #[error("Export error: {0}")]
    Export(String),
}

impl SvcTopoError {
    /// True when the error is the cooperative-cancellation terminal state.
    /// Traversal loops use this to distinguish "stop now" from a failing
    /// batch that should be skipped.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SvcTopoError::Cancelled)
    }
}

/// Convenient Result type using SvcTopoError
pub type Result<T> = std::result::Result<T, SvcTopoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SvcTopoError::Api {
            status: 403,
            message: "Token is missing required scope".to_string(),
        };
        assert!(err.to_string().contains("HTTP 403"));
        assert!(err.to_string().contains("scope"));
    }

    #[test]
    fn test_exhausted_display() {
        let err = SvcTopoError::Exhausted {
            attempts: 6,
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("6 attempts"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(SvcTopoError::Cancelled.is_cancelled());
        assert!(!SvcTopoError::Config("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SvcTopoError = io_err.into();
        assert!(matches!(err, SvcTopoError::Io(_)));
    }
}
