//! Bridge to the follow-up-question generator.
//!
//! Given the intake answers, the generator returns 0–5 clarifying
//! questions plus opaque `notes`/`response_id` context carried through
//! to later composition calls.

use async_trait::async_trait;
use serde::Deserialize;

use epistle_core::intake::{FollowUpBundle, IntakeForm};

/// Errors from the follow-up generator boundary.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Follow-up generator error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Contract with the follow-up-question generator.
#[async_trait]
pub trait FollowUpGenerator: Send + Sync {
    async fn generate(&self, form: &IntakeForm) -> Result<FollowUpBundle, GeneratorError>;
}

/// HTTP client for the generator service.
pub struct HttpFollowUpGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    questions: Vec<String>,
    notes: Option<String>,
    response_id: Option<String>,
}

impl HttpFollowUpGenerator {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl FollowUpGenerator for HttpFollowUpGenerator {
    async fn generate(&self, form: &IntakeForm) -> Result<FollowUpBundle, GeneratorError> {
        let response = self
            .client
            .post(format!("{}/v1/followups", self.base_url))
            .bearer_auth(&self.api_key)
            .json(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response.json().await?;
        Ok(FollowUpBundle {
            questions: body.questions,
            notes: body.notes,
            response_id: body.response_id,
        }
        .normalized())
    }
}
