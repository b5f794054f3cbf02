//! HTTP client for the print service

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::models::{CancelAck, JobReference, ReportStatus, SubmitResponse};
use super::utils::{body_excerpt, parse_content_type};
use super::{PollingPolicy, PrintService, wait_for_download_url};
use crate::encoder::PrintSpec;
use crate::error::{PrintError, Result};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "printbox/0.1.0".to_string(),
        }
    }
}

/// Client for a MapFish-style print service rooted at a base URL.
///
/// Endpoints, relative to the base:
/// - `POST report.{format}` submits a spec
/// - `GET status/{ref}.json` when the service did not announce a `statusURL`
/// - `DELETE cancel/{ref}`
/// - `GET report/{ref}` when a finished status carries no `downloadURL`
pub struct ReportClient {
    client: Client,
    /// Always ends with `/` so relative URLs resolve below it
    base_url: Url,
    poll_interval: Duration,
}

impl ReportClient {
    pub fn new(service_url: &str, config: HttpConfig) -> Result<Self> {
        let mut base_url = Url::parse(service_url).map_err(|e| {
            PrintError::InvalidArgument(format!("invalid print service URL '{}': {}", service_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PrintError::InvalidArgument(format!(
                "print service URL '{}' cannot be used as a base",
                service_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PrintError::InvalidArgument(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            poll_interval: PollingPolicy::default().interval,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Reference for a job submitted elsewhere, known only by its `ref`
    pub fn reference_for(&self, id: &str) -> Result<JobReference> {
        let status_url = self.endpoint(&["status", &format!("{}.json", id)])?;
        Ok(JobReference {
            id: id.to_string(),
            status_url: status_url.into(),
            download_url: None,
        })
    }

    /// Poll until the report is ready and return its download URL.
    pub async fn get_download_url(
        &self,
        reference: &JobReference,
        timeout: Duration,
    ) -> Result<String> {
        let policy = PollingPolicy {
            interval: self.poll_interval,
            timeout,
        };
        wait_for_download_url(self, reference, policy).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PrintError::InvalidArgument(format!("cannot extend URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resolve(&self, raw: &str) -> Result<Url> {
        self.base_url
            .join(raw)
            .map_err(|e| PrintError::Submission(format!("invalid URL '{}' in response: {}", raw, e)))
    }
}

#[async_trait]
impl PrintService for ReportClient {
    async fn submit(&self, spec: &PrintSpec) -> Result<JobReference> {
        if spec.format.trim().is_empty() {
            return Err(PrintError::InvalidArgument("output format must not be empty".into()));
        }
        let url = self.endpoint(&[&format!("report.{}", spec.format)])?;
        debug!(%url, layout = %spec.layout, "Submitting report");

        let response = self
            .client
            .post(url)
            .json(spec)
            .send()
            .await
            .map_err(|e| PrintError::Submission(describe(&e)))?;

        let body: SubmitResponse = read_json(response, PrintError::Submission).await?;
        if body.reference.trim().is_empty() {
            return Err(PrintError::Submission("response carries no report ref".into()));
        }

        let status_url = match body.status_url.as_deref() {
            Some(raw) => self.resolve(raw)?,
            None => self.endpoint(&["status", &format!("{}.json", body.reference)])?,
        };
        let download_url = match body.download_url.as_deref() {
            Some(raw) => Some(self.resolve(raw)?.to_string()),
            None => None,
        };

        info!(job_ref = %body.reference, "Report submitted");

        Ok(JobReference {
            id: body.reference,
            status_url: status_url.into(),
            download_url,
        })
    }

    async fn poll(&self, reference: &JobReference) -> Result<ReportStatus> {
        let response = self
            .client
            .get(reference.status_url.as_str())
            .send()
            .await
            .map_err(|e| PrintError::Poll(describe(&e)))?;

        // The service knows nothing of this ref; asking again will not help
        if is_final_rejection(response.status()) {
            let detail = failure_detail(response).await;
            warn!(job_ref = %reference.id, %detail, "Status request rejected");
            return Err(PrintError::ServerReportedFailure(detail));
        }

        let mut status: ReportStatus = read_json(response, PrintError::Poll).await?;

        let resolved = status
            .download_url
            .as_deref()
            .and_then(|raw| self.base_url.join(raw).ok());
        if let Some(url) = resolved {
            status.download_url = Some(url.into());
        }

        Ok(status)
    }

    async fn cancel(&self, reference: &JobReference) -> CancelAck {
        let url = match self.endpoint(&["cancel", &reference.id]) {
            Ok(url) => url,
            Err(e) => {
                warn!(job_ref = %reference.id, error = %e, "Cannot build cancel URL");
                return CancelAck {
                    accepted: false,
                    status: None,
                };
            }
        };

        match self.client.delete(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(job_ref = %reference.id, status = status.as_u16(), "Cancel answered");
                CancelAck {
                    accepted: status == StatusCode::OK,
                    status: Some(status.as_u16()),
                }
            }
            Err(e) => {
                warn!(job_ref = %reference.id, error = %describe(&e), "Cancel request failed");
                CancelAck {
                    accepted: false,
                    status: None,
                }
            }
        }
    }

    fn report_url(&self, reference: &JobReference) -> String {
        match self.endpoint(&["report", &reference.id]) {
            Ok(url) => url.into(),
            Err(_) => format!("{}report/{}", self.base_url, reference.id),
        }
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    wrap: fn(String) -> PrintError,
) -> Result<T> {
    if !response.status().is_success() {
        return Err(wrap(failure_detail(response).await));
    }

    if let Some(value) = response.headers().get(CONTENT_TYPE) {
        let content_type = value
            .to_str()
            .map_err(|_| wrap("unreadable Content-Type header".to_string()))?;
        parse_content_type(content_type).map_err(wrap)?;
    }

    response
        .json::<T>()
        .await
        .map_err(|e| wrap(format!("malformed response body: {}", e)))
}

/// `HTTP <code>: <body excerpt or reason>`
async fn failure_detail(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown").to_string()
    } else {
        body_excerpt(&body)
    };
    format!("HTTP {}: {}", status.as_u16(), detail)
}

/// Client errors other than 408 and 429 will not go away by retrying
fn is_final_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
