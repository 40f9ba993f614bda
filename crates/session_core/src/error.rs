use shared::{
    domain::PrinterState,
    error::{ErrorCode, Problem},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no printer profile selected")]
    NoProfileSelected,
    #[error("no serial port selected")]
    NoPortSelected,
    #[error("unknown printer profile '{0}'")]
    UnknownProfile(String),
    #[error("a printer session is already active ({state})")]
    SessionActive { state: PrinterState },
    #[error("no file open to print")]
    NoOpenFiles,
    #[error("printer is not ready to print ({state})")]
    NotIdle { state: PrinterState },
    #[error("printer is not connected")]
    NotConnected,
    #[error("device link failed to {operation}: {source}")]
    Link {
        operation: &'static str,
        source: anyhow::Error,
    },
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Link { .. } => ErrorCode::Internal,
            _ => ErrorCode::UserError,
        }
    }

    pub fn to_problem(&self) -> Problem {
        Problem::new(self.code(), self.to_string())
    }
}
