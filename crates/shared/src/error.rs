use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classes of trouble a printer session can report to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Rejected intent (missing profile, missing port, no file to print).
    /// Never changes session state.
    UserError,
    /// The printer reported a fault; the session sits in ERRORSTATE until
    /// an explicit disconnect and reconnect.
    DeviceFault,
    /// The link went down without a disconnect intent.
    LinkLoss,
    /// A link operation failed to submit.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct Problem {
    pub code: ErrorCode,
    pub message: String,
}

impl Problem {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the problem should be treated as a fault rather than
    /// user feedback.
    pub fn is_fault(&self) -> bool {
        matches!(self.code, ErrorCode::DeviceFault | ErrorCode::LinkLoss)
    }
}
