//! Error Handling Module
//!
//! Defines the error taxonomy of the inference server.
//! Uses thiserror for ergonomic error definitions.

use std::time::Duration;

use thiserror::Error;

/// Main error type for model loading and request handling
#[derive(Error, Debug)]
pub enum ServeError {
    /// Model artifact missing, corrupt or incompatible. Fatal at startup.
    #[error("Startup error: {0}")]
    Startup(String),

    /// Bad input supplied by the caller
    #[error("{0}")]
    Validation(String),

    /// Upload exceeded the configured maximum size
    #[error("Upload exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Preprocessor output disagrees with the model input shape
    #[error("Tensor shape {actual:?} does not match model input shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// Numeric runtime failure during a forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// The caller-side deadline expired before a result was available
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// Errors that are the caller's fault and safe to describe in a response
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServeError::Validation(_) | ServeError::PayloadTooLarge { .. }
        )
    }
}

/// Convenience Result type for server operations
pub type Result<T> = std::result::Result<T, ServeError>;

/// Extension trait for turning foreign errors into startup failures
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ServeError::Startup(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| ServeError::Startup(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ServeError::Startup(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| ServeError::Startup(f()))
    }
}
