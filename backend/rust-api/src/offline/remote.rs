use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::models::{content::QuizLectureView, quiz_result::QuizResultSubmission};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No response at all: offline, DNS, timeout.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

/// Result of one upload that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 2xx. `created` is false when the server already had this result id.
    Accepted { created: bool },
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait LectureSource: Send + Sync {
    async fn fetch_lecture(&self, lecture_id: &str) -> Result<QuizLectureView, RemoteError>;
}

#[async_trait]
pub trait ResultUploader: Send + Sync {
    async fn upload(&self, result: &QuizResultSubmission) -> Result<UploadOutcome, RemoteError>;
}

/// Talks to the public `/api/v1` routes.
#[derive(Debug, Clone)]
pub struct HttpQuizApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpQuizApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Bearer token attached to uploads so results are tied to the user.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }
}

#[async_trait]
impl LectureSource for HttpQuizApi {
    async fn fetch_lecture(&self, lecture_id: &str) -> Result<QuizLectureView, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/lectures/{}", lecture_id)))
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ResultUploader for HttpQuizApi {
    async fn upload(&self, result: &QuizResultSubmission) -> Result<UploadOutcome, RemoteError> {
        let mut request = self.client.post(self.url("/results")).json(result);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(UploadOutcome::Accepted {
                created: status == StatusCode::CREATED,
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Ok(UploadOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
