//! Client for the external language-model assistant pipeline.
//!
//! The pipeline is an opaque remote service: one POST per phase with a JSON
//! envelope, one JSON response back. Prompt templating and model selection
//! live on the other side of the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The request envelope for one phase of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest {
    pub assistant: String,
    pub phase: String,
    pub record_id: String,
    pub project_id: String,
}

/// The pipeline's response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// The request itself failed (connection, non-2xx status).
    #[error("assistant request failed: {0}")]
    Api(String),

    /// The response arrived but was not the expected envelope.
    #[error("failed to parse assistant response: {0}")]
    Parse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// An assistant pipeline reachable per phase.
#[async_trait]
pub trait AssistantClient: Send + Sync + 'static {
    async fn invoke(&self, request: AssistantRequest)
        -> Result<AssistantResponse, AssistantError>;
}

/// HTTP client posting the envelope to a configured pipeline URL, with an
/// optional bearer key.
pub struct HttpAssistant {
    url: String,
    api_key: Option<String>,
}

impl HttpAssistant {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl AssistantClient for HttpAssistant {
    async fn invoke(
        &self,
        request: AssistantRequest,
    ) -> Result<AssistantResponse, AssistantError> {
        let url = self.url.clone();
        let api_key = self.api_key.clone();

        // ureq is synchronous, so wrap in spawn_blocking
        tokio::task::spawn_blocking(move || call_pipeline(&url, api_key.as_deref(), &request))
            .await
            .map_err(|e| AssistantError::Internal(format!("task join error: {}", e)))?
    }
}

/// Make a synchronous call to the assistant pipeline.
fn call_pipeline(
    url: &str,
    api_key: Option<&str>,
    request: &AssistantRequest,
) -> Result<AssistantResponse, AssistantError> {
    let agent = ureq::Agent::new_with_defaults();
    let mut req = agent.post(url).header("content-type", "application/json");
    if let Some(key) = api_key {
        req = req.header("authorization", &format!("Bearer {}", key));
    }

    let response = req
        .send_json(request)
        .map_err(|e| AssistantError::Api(format!("API request failed: {}", e)))?;

    response
        .into_body()
        .read_json()
        .map_err(|e| AssistantError::Parse(format!("failed to parse API response: {}", e)))
}

/// Stand-in used when no pipeline URL is configured: acknowledges every
/// phase so the workflow can be driven end to end locally.
pub struct NullAssistant;

#[async_trait]
impl AssistantClient for NullAssistant {
    async fn invoke(
        &self,
        request: AssistantRequest,
    ) -> Result<AssistantResponse, AssistantError> {
        tracing::info!(
            record_id = %request.record_id,
            phase = %request.phase,
            "no assistant pipeline configured; acknowledging phase"
        );
        Ok(AssistantResponse {
            message: format!("acknowledged phase '{}'", request.phase),
        })
    }
}
