//! Print service transport.
//!
//! [`PrintService`] is the seam between the job controller and the network;
//! [`ReportClient`] implements it over HTTP. Tests substitute in-memory
//! services.

mod http;
mod models;
mod utils;

pub use http::{HttpConfig, ReportClient};
pub use models::{CancelAck, JobReference, ReportState, ReportStatus};

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::controller::JobOutcome;
use crate::encoder::PrintSpec;
use crate::error::{PrintError, Result};

#[async_trait]
pub trait PrintService: Send + Sync {
    /// Submit a print spec. Returns the server-issued reference.
    async fn submit(&self, spec: &PrintSpec) -> Result<JobReference>;

    /// Fetch the current status of a report.
    async fn poll(&self, reference: &JobReference) -> Result<ReportStatus>;

    /// Ask the service to abandon a report. Never fails; a transport error
    /// is reported as a refused cancellation.
    async fn cancel(&self, reference: &JobReference) -> CancelAck;

    /// Where a finished report is fetched when its status names no URL.
    fn report_url(&self, reference: &JobReference) -> String;
}

/// How often and for how long a submitted job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Poll `reference` every `policy.interval` until the report is finished,
/// failed, or `policy.timeout` has elapsed since the call.
///
/// Transport and malformed-response errors are logged and retried; the
/// deadline bounds them. A server-side error is returned verbatim as
/// [`PrintError::ServerReportedFailure`].
pub async fn wait_for_download_url<S: PrintService + ?Sized>(
    service: &S,
    reference: &JobReference,
    policy: PollingPolicy,
) -> Result<String> {
    match tokio::time::timeout(policy.timeout, poll_until_done(service, reference, policy.interval))
        .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(job_ref = %reference.id, timeout_ms = policy.timeout.as_millis() as u64, "Print deadline exceeded");
            Err(PrintError::Timeout(policy.timeout))
        }
    }
}

async fn poll_until_done<S: PrintService + ?Sized>(
    service: &S,
    reference: &JobReference,
    interval: Duration,
) -> Result<String> {
    let fallback_url = reference
        .download_url
        .clone()
        .unwrap_or_else(|| service.report_url(reference));
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        tokio::time::sleep(interval).await;
        attempts += 1;

        let status = match service.poll(reference).await {
            Ok(status) => status,
            Err(e) if !e.is_terminal() => {
                warn!(job_ref = %reference.id, attempts, error = %e, "Status poll failed, retrying");
                continue;
            }
            Err(e) => return Err(e),
        };

        match status.outcome(&fallback_url) {
            JobOutcome::Pending => {
                debug!(
                    job_ref = %reference.id,
                    attempts,
                    state = ?status.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Report not ready"
                );
            }
            JobOutcome::Ready(url) => {
                debug!(job_ref = %reference.id, attempts, %url, "Report ready");
                return Ok(url);
            }
            JobOutcome::Failed { message, .. } => {
                return Err(PrintError::ServerReportedFailure(
                    status.error.unwrap_or(message),
                ));
            }
            JobOutcome::Cancelled | JobOutcome::TimedOut => {
                return Err(PrintError::ServerReportedFailure(
                    "report was cancelled on the server".to_string(),
                ));
            }
        }
    }
}
