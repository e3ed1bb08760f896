//! Bridge to the external deep-research runner.
//!
//! The runner executes out-of-band: `submit` returns a job handle once
//! the run is accepted, and completion is observed only by polling
//! `status`. [`HttpResearchRunner`] wraps the runner's REST endpoints
//! with [`reqwest`]; the [`ResearchRunner`] trait keeps the
//! coordinator testable without a live service.

use async_trait::async_trait;
use serde::Deserialize;

use epistle_core::research::{Activity, ResearchStatus, RunUpdate};
use epistle_core::types::Timestamp;

/// Errors from the research runner boundary.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The runner returned a non-2xx status code.
    #[error("Research runner error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The runner reported a status string this client does not know.
    #[error("Unknown run status: {0}")]
    UnknownStatus(String),
}

/// Handle returned once the runner accepts a submission.
#[derive(Debug, Clone)]
pub struct AcceptedRun {
    pub runner_job_id: String,
}

/// Contract with the external deep-research runner.
#[async_trait]
pub trait ResearchRunner: Send + Sync {
    /// Submit a research prompt. Returns once the runner has queued
    /// the job; the run itself continues out-of-band.
    async fn submit(&self, prompt: &str) -> Result<AcceptedRun, RunnerError>;

    /// Fetch the current status report for an accepted run.
    async fn status(&self, runner_job_id: &str) -> Result<RunUpdate, RunnerError>;

    /// Ask the runner to cancel a run. Fire-and-forget: the terminal
    /// `cancelled` is observed through later `status` calls.
    async fn cancel(&self, runner_job_id: &str) -> Result<(), RunnerError>;
}

/// HTTP client for the research runner service.
pub struct HttpResearchRunner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    progress: Option<f32>,
    #[serde(default)]
    activities: Vec<ActivityPayload>,
    result: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityPayload {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    status: String,
    created_at: Timestamp,
    url: Option<String>,
}

impl HttpResearchRunner {
    /// * `base_url` - Base HTTP URL, e.g. `https://runner.internal`.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RunnerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RunnerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ResearchRunner for HttpResearchRunner {
    async fn submit(&self, prompt: &str) -> Result<AcceptedRun, RunnerError> {
        let response = self
            .client
            .post(format!("{}/v1/research", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: SubmitResponse = response.json().await?;
        Ok(AcceptedRun {
            runner_job_id: body.job_id,
        })
    }

    async fn status(&self, runner_job_id: &str) -> Result<RunUpdate, RunnerError> {
        let response = self
            .client
            .get(format!("{}/v1/research/{runner_job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: StatusResponse = response.json().await?;
        parse_status(body)
    }

    async fn cancel(&self, runner_job_id: &str) -> Result<(), RunnerError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/research/{runner_job_id}/cancel",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

fn parse_run_status(raw: &str) -> Result<ResearchStatus, RunnerError> {
    match raw {
        "queued" => Ok(ResearchStatus::Queued),
        "in_progress" => Ok(ResearchStatus::InProgress),
        "cancelling" => Ok(ResearchStatus::Cancelling),
        "completed" => Ok(ResearchStatus::Completed),
        "failed" => Ok(ResearchStatus::Failed),
        "cancelled" => Ok(ResearchStatus::Cancelled),
        "requires_action" => Ok(ResearchStatus::RequiresAction),
        other => Err(RunnerError::UnknownStatus(other.to_string())),
    }
}

fn parse_status(body: StatusResponse) -> Result<RunUpdate, RunnerError> {
    let status = parse_run_status(&body.status)?;
    let activities = body
        .activities
        .into_iter()
        .map(|a| Activity {
            id: a.id,
            kind: a.kind,
            label: a.label,
            status: a.status,
            created_at: a.created_at,
            url: a.url,
        })
        .collect();
    Ok(RunUpdate {
        status,
        progress: body.progress,
        activities,
        result: body.result,
        error: body.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_map_to_variants() {
        assert_eq!(parse_run_status("queued").unwrap(), ResearchStatus::Queued);
        assert_eq!(
            parse_run_status("requires_action").unwrap(),
            ResearchStatus::RequiresAction
        );
        assert!(matches!(
            parse_run_status("exploded"),
            Err(RunnerError::UnknownStatus(_))
        ));
    }

    #[test]
    fn status_payload_parses_into_update() {
        let body: StatusResponse = serde_json::from_value(serde_json::json!({
            "status": "in_progress",
            "progress": 42.5,
            "activities": [
                {"id": "act-1", "type": "search", "label": "Searching case law",
                 "status": "done", "created_at": "2026-01-05T12:00:00Z"}
            ]
        }))
        .unwrap();
        let update = parse_status(body).unwrap();
        assert_eq!(update.status, ResearchStatus::InProgress);
        assert_eq!(update.progress, Some(42.5));
        assert_eq!(update.activities.len(), 1);
        assert_eq!(update.activities[0].kind, "search");
    }
}
