//! HTTP client for the letter service API.
//!
//! Thin typed wrapper over the REST surface: every success unwraps the
//! `{"data": ...}` envelope, and a 409 on the research endpoints is
//! surfaced as [`ApiError::Conflict`] carrying the authoritative
//! snapshot from the error body so callers can reconcile.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use epistle_core::snapshot::{JobSnapshot, SnapshotPayload};
use epistle_core::types::UserId;

/// Errors from the letter service API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The server rejected the request because of concurrent state
    /// (e.g. a research run already active); the body carried the
    /// current snapshot.
    #[error("Conflict: {message}")]
    Conflict {
        code: Option<String>,
        message: String,
        job: Box<JobSnapshot>,
    },
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
    data: Option<JobSnapshot>,
}

/// Typed client for one user's session against the letter service.
pub struct LetterApiClient {
    client: reqwest::Client,
    base_url: String,
    user_id: UserId,
}

impl LetterApiClient {
    pub fn new(base_url: String, user_id: UserId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            user_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            let body: DataResponse<T> = response.json().await?;
            return Ok(body.data);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        match body {
            Some(ErrorBody {
                error,
                code,
                data: Some(job),
            }) if status == reqwest::StatusCode::CONFLICT => Err(ApiError::Conflict {
                code,
                message: error,
                job: Box::new(job),
            }),
            Some(ErrorBody { error, code, .. }) => Err(ApiError::Api {
                status: status.as_u16(),
                code,
                message: error,
            }),
            None => Err(ApiError::Api {
                status: status.as_u16(),
                code: None,
                message: text,
            }),
        }
    }

    /// Fetch the user's job snapshot, if one exists.
    pub async fn get_job(&self) -> Result<Option<JobSnapshot>, ApiError> {
        let response = self
            .client
            .get(self.url("/api/v1/letters/job"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    /// Persist the editable slice of the snapshot.
    pub async fn save_job(&self, payload: &SnapshotPayload) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .put(self.url("/api/v1/letters/job"))
            .header("x-user-id", self.user_id.to_string())
            .json(payload)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Discard the stored job entirely.
    pub async fn delete_job(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url("/api/v1/letters/job"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            code: None,
            message: text,
        })
    }

    /// Ask the server to generate follow-up questions from the intake.
    pub async fn generate_followups(&self) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .post(self.url("/api/v1/letters/job/followups"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Start a research run. A 409 carries the authoritative snapshot.
    pub async fn start_research(&self) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .post(self.url("/api/v1/letters/job/research/start"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Poll the current research status (merged server-side).
    pub async fn research_status(&self) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .get(self.url("/api/v1/letters/job/research/status"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Request cancellation of the active research run.
    pub async fn cancel_research(&self) -> Result<JobSnapshot, ApiError> {
        let response = self
            .client
            .post(self.url("/api/v1/letters/job/research/cancel"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Current credit balance.
    pub async fn credits(&self) -> Result<f64, ApiError> {
        let response = self
            .client
            .get(self.url("/api/v1/credits"))
            .header("x-user-id", self.user_id.to_string())
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn conflict_body_parses_with_snapshot() {
        let snapshot = JobSnapshot::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        let body = serde_json::json!({
            "error": "A research run is already active for this job",
            "code": "research_active",
            "data": snapshot,
        });
        let parsed: ErrorBody = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.code.as_deref(), Some("research_active"));
        assert_eq!(parsed.data.unwrap().job_id, snapshot.job_id);
    }

    #[test]
    fn error_body_without_data_still_parses() {
        let parsed: ErrorBody = serde_json::from_str(
            r#"{"error": "Insufficient credits", "code": "insufficient_credits"}"#,
        )
        .unwrap();
        assert_matches!(parsed.data, None);
        assert_eq!(parsed.error, "Insufficient credits");
    }
}
