// Error types shared by the capture, analysis and feedback services.

use thiserror::Error;

/// Result alias used across the library crate
pub type Result<T> = std::result::Result<T, VisionError>;

/// Errors that can occur while capturing, analyzing or reporting on an image
#[derive(Error, Debug)]
pub enum VisionError {
    /// The camera could not be opened (permission denied, no device, bad constraints)
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// An operation was called outside the state it is valid in
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The `/predict` request failed at the transport level or returned non-2xx
    #[error("Analysis failed: {}", format_failure(.status, .message))]
    AnalysisFailed {
        status: Option<u16>,
        message: String,
    },

    /// The `/feedback` request failed at the transport level or returned non-2xx
    #[error("Feedback failed: {}", format_failure(.status, .message))]
    FeedbackFailed {
        status: Option<u16>,
        message: String,
    },

    /// A required feedback field was missing
    #[error("Validation error: {0}")]
    Validation(String),

    /// A response arrived after the session moved on and was discarded
    #[error("Response discarded: session moved on before it arrived")]
    StaleResponse,

    /// A captured frame could not be encoded
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// An uploaded file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// True for errors that indicate a caller bug rather than a runtime condition
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

fn format_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}
