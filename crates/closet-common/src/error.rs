//! Error taxonomy for pipeline stages
//!
//! Every stage converts its failures into one of these variants before the
//! result crosses the stage boundary. The variants map onto the response
//! codes the HTTP-facing stages return: client input and not-found
//! precursors are 400s, adapter and infrastructure failures are 500s.

use thiserror::Error;

/// Result type alias for stage operations
pub type Result<T> = std::result::Result<T, StageError>;

/// Main error type for pipeline stages
#[derive(Error, Debug)]
pub enum StageError {
    /// Missing or malformed request fields, or an unresolvable lookup key.
    /// Safe to report verbatim to the caller.
    #[error("{0}")]
    ClientInput(String),

    /// An external capability returned non-success or unparseable output.
    /// Carries the adapter's raw error text for diagnosability. Never
    /// retried automatically.
    #[error("Adapter error: {message}")]
    Adapter { message: String },

    /// Storage or relational-store operation failure. Fatal to the current
    /// stage invocation.
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[source] anyhow::Error),

    /// Observed state contradicts what a predecessor stage should have left
    /// behind (e.g. the notifying object no longer exists). Recorded into
    /// persisted job state before surfacing.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
}

impl StageError {
    /// Shorthand for an adapter failure with raw upstream text.
    pub fn adapter(message: impl Into<String>) -> Self {
        StageError::Adapter {
            message: message.into(),
        }
    }

    /// Whether this error should be reported as a client-input (400) failure.
    pub fn is_client_input(&self) -> bool {
        matches!(self, StageError::ClientInput(_))
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        StageError::Infrastructure(err)
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::ClientInput(format!("Invalid payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_input_is_reported_verbatim() {
        let err = StageError::ClientInput("Missing s3_key".to_string());
        assert_eq!(err.to_string(), "Missing s3_key");
        assert!(err.is_client_input());
    }

    #[test]
    fn adapter_error_keeps_raw_text() {
        let err = StageError::adapter("Vision API error: rate limited");
        assert_eq!(err.to_string(), "Adapter error: Vision API error: rate limited");
        assert!(!err.is_client_input());
    }
}
