//! HTTP client for a remote engine's RPC surface.
//!
//! Thin typed wrapper over reqwest; every call is fallible and none retry
//! (poll retry is owned by the supervisor's monitor).

use reqwest::StatusCode;
use serde::Deserialize;
use testflow_core::engine::{EngineClient, SubmitRequest};
use testflow_types::error::EngineError;
use testflow_types::execution::EngineStatusSnapshot;
use testflow_types::executor::RuntimeStatus;

/// Client for a remote engine at a base URL.
pub struct HttpEngineClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    engine_execution_id: String,
}

impl HttpEngineClient {
    /// Create a client for an engine at `base_url` (e.g. `http://runner:7700`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => EngineError::ExecutionNotFound(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                EngineError::Rejected(body)
            }
            StatusCode::NOT_IMPLEMENTED => EngineError::Unsupported(body),
            _ => EngineError::Transport(format!("HTTP {status}: {body}")),
        })
    }

    async fn action(&self, engine_execution_id: &str, action: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .post(self.endpoint(&format!("/api/executions/{engine_execution_id}/{action}")))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }
}

impl EngineClient for HttpEngineClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, EngineError> {
        let response = self
            .client
            .post(self.endpoint("/api/executions"))
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(body.engine_execution_id)
    }

    async fn status(&self, engine_execution_id: &str) -> Result<EngineStatusSnapshot, EngineError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/executions/{engine_execution_id}")))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))
    }

    async fn stop(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        self.action(engine_execution_id, "stop").await
    }

    async fn pause(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        self.action(engine_execution_id, "pause").await
    }

    async fn resume(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        self.action(engine_execution_id, "resume").await
    }

    async fn sample_logs(&self, engine_execution_id: &str) -> Result<Vec<String>, EngineError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/executions/{engine_execution_id}/logs")))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))
    }

    async fn list_workers(&self) -> Result<Vec<RuntimeStatus>, EngineError> {
        let response = self
            .client
            .get(self.endpoint("/api/workers"))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
