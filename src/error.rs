use std::time::Duration;

use thiserror::Error;

/// Errors produced while building, submitting, and tracking a print job.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("layer '{layer}' of type '{kind}' cannot be encoded for printing")]
    UnsupportedLayer { layer: String, kind: String },
    #[error("report submission failed: {0}")]
    Submission(String),
    #[error("status poll failed: {0}")]
    Poll(String),
    #[error("print duration exceeded {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("print service reported failure: {0}")]
    ServerReportedFailure(String),
    #[error("no print in progress")]
    NoJobInProgress,
    #[error("a print job is already in progress")]
    JobInProgress,
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrintError {
    pub fn code(&self) -> &'static str {
        match self {
            PrintError::InvalidArgument(_) => "INVALID_ARGUMENT",
            PrintError::UnsupportedLayer { .. } => "UNSUPPORTED_LAYER",
            PrintError::Submission(_) => "SUBMISSION_ERROR",
            PrintError::Poll(_) => "POLL_ERROR",
            PrintError::Timeout(_) => "TIMEOUT",
            PrintError::ServerReportedFailure(_) => "SERVER_REPORTED_FAILURE",
            PrintError::NoJobInProgress => "NO_JOB_IN_PROGRESS",
            PrintError::JobInProgress => "JOB_IN_PROGRESS",
            PrintError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Poll failures are retried until the overall deadline; everything else
    /// ends the job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PrintError::Poll(_))
    }
}

pub type Result<T> = std::result::Result<T, PrintError>;
