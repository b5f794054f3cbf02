use serde::Serialize;
use time::OffsetDateTime;

use crate::client::JobReference;
use crate::error::PrintError;

/// Identifies one print attempt. Tokens only grow, so a result carrying an
/// older token belongs to a job that is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JobToken(pub u64);

impl std::fmt::Display for JobToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Externally visible job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Submitting,
    Polling { reference: JobReference },
    Ready { url: String },
    Failed { code: &'static str, message: String },
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Ready { .. } | JobState::Failed { .. } | JobState::Cancelled | JobState::TimedOut
        )
    }

    /// One line suitable for a status bar.
    pub fn message(&self) -> String {
        match self {
            JobState::Idle => "Ready to print".to_string(),
            JobState::Submitting => "Sending print request".to_string(),
            JobState::Polling { .. } => "Printing".to_string(),
            JobState::Ready { url } => format!("Print ready: {}", url),
            JobState::Failed { message, .. } => format!("Print failed: {}", message),
            JobState::Cancelled => "Print cancelled".to_string(),
            JobState::TimedOut => "Print timed out".to_string(),
        }
    }
}

/// A transition, stamped with the job it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub job: JobToken,
    pub state: JobState,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// How a job ended, or that it has not ended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Pending,
    Ready(String),
    Failed { code: &'static str, message: String },
    Cancelled,
    TimedOut,
}

impl JobOutcome {
    pub fn failed(err: &PrintError) -> Self {
        JobOutcome::Failed {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Outcome of a job whose wait ended with `err`
    pub fn from_error(err: &PrintError) -> Self {
        match err {
            PrintError::Timeout(_) => JobOutcome::TimedOut,
            other => JobOutcome::failed(other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::Pending)
    }

    /// Event for a terminal outcome; `None` while pending.
    pub fn to_state(&self) -> Option<JobState> {
        match self {
            JobOutcome::Pending => None,
            JobOutcome::Ready(url) => Some(JobState::Ready { url: url.clone() }),
            JobOutcome::Failed { code, message } => Some(JobState::Failed {
                code: *code,
                message: message.clone(),
            }),
            JobOutcome::Cancelled => Some(JobState::Cancelled),
            JobOutcome::TimedOut => Some(JobState::TimedOut),
        }
    }
}

/// Result of asking the controller to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The service answered 200
    Acknowledged(JobReference),
    /// The service refused or could not be reached; the job is cancelled locally anyway
    Rejected(JobReference),
    /// No reference existed yet; it is cancelled as soon as submission returns
    Deferred,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            JobOutcome::from_error(&PrintError::Timeout(Duration::from_secs(1))),
            JobOutcome::TimedOut
        );
        assert_eq!(
            JobOutcome::from_error(&PrintError::Submission("HTTP 500: boom".into())),
            JobOutcome::Failed {
                code: "SUBMISSION_ERROR",
                message: "report submission failed: HTTP 500: boom".into(),
            }
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Idle.is_terminal());
        assert!(!JobState::Submitting.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert_eq!(JobOutcome::Pending.to_state(), None);
        assert_eq!(JobOutcome::TimedOut.to_state(), Some(JobState::TimedOut));
    }

    #[test]
    fn test_state_serialization() {
        let state = JobState::Ready {
            url: "https://x/out.pdf".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["url"], "https://x/out.pdf");
        assert_eq!(JobState::TimedOut.message(), "Print timed out");
    }
}
