//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, llama.cpp server, vLLM, LM Studio, and
//! Ollama's `/v1` shim. Only non-streaming chat completions are used.

use async_trait::async_trait;
use linvoice_core::Provider;
use linvoice_core::error::ProviderError;
use linvoice_core::provider::GenerationRequest;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: &request.prompt,
        });

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.options.temperature,
            "max_tokens": request.options.max_tokens,
            "stream": false,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(format!("No answer within {}s", timeout.as_secs()))
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let timeout = request.options.timeout;

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .authorized(self.client.post(&url))
            .timeout(timeout)
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::NotConfigured(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let timeout = Duration::from_secs(5);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let timeout = Duration::from_secs(5);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_system_message_first() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.example.com/v1/", "gpt-4o-mini", None);
        let body = provider.build_body(
            &GenerationRequest::new("what's my cpu usage")
                .with_system("You are a desktop assistant.")
                .max_tokens(64),
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "what's my cpu usage");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(provider.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn body_without_system_has_single_message() {
        let provider = OpenAiCompatProvider::new("local", "http://localhost:8080/v1", "any", None);
        let body = provider.build_body(&GenerationRequest::new("hi"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parses_first_choice() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"TOOL: open_app(app_name=\"gimp\")"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("TOOL: open_app(app_name=\"gimp\")")
        );
    }
}
