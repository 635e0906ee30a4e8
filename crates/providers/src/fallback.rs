//! Provider fallback: ordered chain with per-provider timeouts.
//!
//! When a provider fails or times out, the next one in the chain is tried.
//! The chain as a whole fails only when every entry has failed.

use async_trait::async_trait;
use linvoice_core::Provider;
use linvoice_core::error::ProviderError;
use linvoice_core::provider::GenerationRequest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
}

struct FallbackEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add a provider to the chain with its own timeout.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry { provider, timeout });
        self
    }

    /// Add a provider with the default timeout (60s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, Duration::from_secs(60))
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.provider.name().to_string();
            // The tighter of the entry's bound and the caller's bound wins.
            let bound = entry.timeout.min(request.options.timeout);

            info!(
                provider = %provider_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying provider"
            );

            match tokio::time::timeout(bound, entry.provider.generate(request.clone())).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    warn!(provider = %provider_name, error = %e, "Fallback: provider failed, trying next");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        timeout_ms = bound.as_millis() as u64,
                        "Fallback: provider timed out, trying next"
                    );
                    last_error = ProviderError::Timeout(format!(
                        "Provider '{provider_name}' timed out after {}ms",
                        bound.as_millis()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let mut all_models = Vec::new();
        for entry in &self.chain {
            if let Ok(models) = entry.provider.list_models().await {
                all_models.extend(models);
            }
        }
        Ok(all_models)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        for entry in &self.chain {
            if let Ok(true) = entry.provider.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            Err(self.error.clone())
        }
    }

    struct SuccessProvider {
        name: String,
        call_count: Mutex<usize>,
    }

    impl SuccessProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for SuccessProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(format!("answer from {}", self.name))
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn first_provider_succeeds() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let text = fallback.generate(GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(text, "answer from primary");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_failure() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add_default(p1.clone())
            .add_default(p2.clone());

        let text = fallback.generate(GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(text, "answer from secondary");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn all_providers_fail_returns_last_error() {
        let fallback = FallbackProvider::new("test")
            .add_default(Arc::new(FailingProvider::new("a", ProviderError::Network("down".into()))))
            .add_default(Arc::new(FailingProvider::new("b", ProviderError::EmptyResponse)));

        let err = fallback.generate(GenerationRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let fallback = FallbackProvider::new("test")
            .add(Arc::new(HangingProvider), Duration::from_millis(50))
            .add_default(p2.clone());

        let result = fallback.generate(GenerationRequest::new("hi")).await;
        assert!(result.is_ok());
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn request_timeout_caps_entry_timeout() {
        let fallback = FallbackProvider::new("test").add_default(Arc::new(HangingProvider));
        let request = GenerationRequest::new("hi").timeout(Duration::from_millis(30));

        let started = std::time::Instant::now();
        let err = fallback.generate(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let fallback = FallbackProvider::new("empty");
        match fallback.generate(GenerationRequest::new("hi")).await.unwrap_err() {
            ProviderError::NotConfigured(_) => {}
            other => panic!("Expected NotConfigured, got: {other:?}"),
        }
        assert!(fallback.is_empty());
    }

    #[tokio::test]
    async fn health_check_any_healthy() {
        let fallback = FallbackProvider::new("test")
            .add_default(Arc::new(FailingProvider::new("bad", ProviderError::Network("down".into()))))
            .add_default(Arc::new(SuccessProvider::new("good")));

        assert_eq!(fallback.len(), 2);
        assert!(fallback.health_check().await.unwrap());
    }
}
