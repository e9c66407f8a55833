use thiserror::Error;

/// Errors reported synchronously by recognizer operations
///
/// Failures after a recognition has started are not errors: they arrive as
/// `Canceled` events and results.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The call is not valid in the session's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A configuration value was rejected at the point of mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The audio input could not be started
    #[error("Audio input error: {0}")]
    Audio(#[source] anyhow::Error),

    /// No tokio runtime is available to run the session worker
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl SessionError {
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, SessionError::InvalidOperation(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
