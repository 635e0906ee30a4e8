//! LLM provider implementations for linvoice.
//!
//! All providers implement the `linvoice_core::Provider` trait.
//! [`build_from_config`] turns the `[llm]` config section into one provider,
//! wrapping it in a [`FallbackProvider`] when fallbacks are configured.

pub mod fallback;
pub mod ollama;
pub mod openai_compat;

pub use fallback::FallbackProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;

use linvoice_config::LlmConfig;
use linvoice_core::Provider;
use linvoice_core::error::ProviderError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build one provider from its kind and connection settings.
pub fn build_provider(
    kind: &str,
    base_url: &str,
    model: &str,
    api_key: Option<String>,
    disable_thinking: bool,
) -> Result<Arc<dyn Provider>, ProviderError> {
    match kind {
        "ollama" => Ok(Arc::new(
            OllamaProvider::new(base_url, model).with_thinking_disabled(disable_thinking),
        )),
        "openai" => Ok(Arc::new(OpenAiCompatProvider::new("openai", base_url, model, api_key))),
        other => Err(ProviderError::NotConfigured(format!("unknown provider kind '{other}'"))),
    }
}

/// Build the provider stack described by `[llm]`.
pub fn build_from_config(config: &LlmConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let primary = build_provider(
        &config.provider,
        &config.base_url,
        &config.model,
        config.api_key.clone(),
        config.disable_thinking,
    )?;

    if config.fallbacks.is_empty() {
        return Ok(primary);
    }

    let mut chain = FallbackProvider::new("fallback").add(primary, config.timeout());
    for fallback in &config.fallbacks {
        let provider = build_provider(
            &fallback.provider,
            &fallback.base_url,
            &fallback.model,
            fallback.api_key.clone(),
            config.disable_thinking,
        )?;
        chain = chain.add(provider, Duration::from_secs(fallback.timeout_secs));
    }
    info!(providers = chain.len(), "Provider fallback chain configured");
    Ok(Arc::new(chain))
}
