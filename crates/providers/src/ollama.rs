//! Ollama provider using the native `/api/generate` endpoint.
//!
//! Small local models (qwen3, llama3.2, gemma) run well here and keep every
//! utterance on the machine.

use async_trait::async_trait;
use linvoice_core::Provider;
use linvoice_core::error::ProviderError;
use linvoice_core::provider::GenerationRequest;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound for the reachability check, independent of generation timeouts.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaProvider {
    base_url: String,
    model: String,
    disable_thinking: bool,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,

    /// Reasoning models may put everything here and leave `response` empty.
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            disable_thinking: true,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_thinking_disabled(mut self, disabled: bool) -> Self {
        self.disable_thinking = disabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for `/api/generate`.
    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut prompt = match &request.system {
            Some(system) => format!("{system}\n\nUser: {}\nAssistant:", request.prompt),
            None => request.prompt.clone(),
        };
        if self.disable_thinking && self.model.to_lowercase().contains("qwen3") {
            prompt.push_str(" /no_think");
        }

        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": request.options.temperature,
                "num_predict": request.options.max_tokens,
            },
        })
    }
}

/// Pull the first `TOOL: name(...)` call out of a reasoning trace.
fn call_from_thinking(thinking: &str) -> Option<String> {
    let start = thinking.find("TOOL:")?;
    let rest = &thinking[start..];
    let end = rest.find(')')?;
    Some(rest[..=end].to_string())
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(format!("Ollama did not answer within {}s", timeout.as_secs()))
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let timeout = request.options.timeout;
        let body = self.build_body(&request);

        debug!(provider = "ollama", model = %self.model, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(self.model.clone()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        if !parsed.response.trim().is_empty() {
            return Ok(parsed.response);
        }

        match parsed.thinking.as_deref().and_then(call_from_thinking) {
            Some(call) => {
                debug!("Recovered tool call from thinking output");
                Ok(call)
            }
            None => Err(ProviderError::EmptyResponse),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_send_error(e, HEALTH_TIMEOUT))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_send_error(e, HEALTH_TIMEOUT))?;

        Ok(response.status().is_success())
    }
}
