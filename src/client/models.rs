//! Wire models exchanged with the print service.
//!
//! - `POST {service}/report.{format}` answers with [`SubmitResponse`]
//! - `GET {statusURL}` answers with [`ReportStatus`]
//! - `DELETE {service}/cancel/{ref}` answers with a bare status code

use serde::{Deserialize, Serialize};

use crate::controller::JobOutcome;
use crate::error::PrintError;

/// Handle to a submitted report, issued by the print service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReference {
    /// Server-side `ref`
    pub id: String,
    /// Absolute URL to poll for status
    pub status_url: String,
    /// Absolute download URL, when the service announced it up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl std::fmt::Display for JobReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "statusURL", default)]
    pub status_url: Option<String>,
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<String>,
}

/// Server-side state of a report.
///
/// Unknown values are read as `Pending` so a newer service never breaks polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    Waiting,
    Running,
    Finished,
    Error,
    Cancelled,
    #[default]
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatus {
    pub done: bool,
    #[serde(default)]
    pub status: ReportState,
    #[serde(rename = "downloadURL", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds spent rendering so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<u64>,
    /// Milliseconds spent queued before rendering started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_time: Option<u64>,
}

impl ReportStatus {
    pub fn pending() -> Self {
        Self {
            done: false,
            status: ReportState::Pending,
            download_url: None,
            error: None,
            elapsed_time: None,
            waiting_time: None,
        }
    }

    pub fn finished(download_url: impl Into<String>) -> Self {
        Self {
            done: true,
            status: ReportState::Finished,
            download_url: Some(download_url.into()),
            ..Self::pending()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            done: true,
            status: ReportState::Error,
            error: Some(error.into()),
            ..Self::pending()
        }
    }

    /// Interpret the status. `fallback_url` is used when a finished report
    /// does not name its download URL.
    pub fn outcome(&self, fallback_url: &str) -> JobOutcome {
        if self.status == ReportState::Error || self.error.is_some() {
            let message = self
                .error
                .clone()
                .unwrap_or_else(|| "print service reported an error without details".to_string());
            return JobOutcome::failed(&PrintError::ServerReportedFailure(message));
        }
        if self.status == ReportState::Cancelled {
            return JobOutcome::Cancelled;
        }
        if self.done {
            let url = self
                .download_url
                .clone()
                .unwrap_or_else(|| fallback_url.to_string());
            return JobOutcome::Ready(url);
        }
        JobOutcome::Pending
    }
}

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAck {
    /// The service answered 200
    pub accepted: bool,
    /// HTTP status, `None` when the request never got an answer
    pub status: Option<u16>,
}
