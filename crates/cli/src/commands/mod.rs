//! Subcommand implementations and the shared runtime wiring.

pub mod chat;
pub mod context;
pub mod doctor;
pub mod listen;
pub mod onboard;
pub mod tools;

use anyhow::Context;
use linvoice_agent::Router;
use linvoice_config::AppConfig;
use linvoice_core::executor::ToolExecutor;
use linvoice_memory::UserContext;
use tracing::{info, warn};

pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

pub fn load_user_context(config: &AppConfig) -> UserContext {
    UserContext::load(config.user_context.resolved_path())
}

/// Wire config, user context, tools and provider into a router.
///
/// A provider that cannot be built is logged and the router runs on rules
/// alone.
pub fn build_router(config: &AppConfig) -> Router {
    let user_context = load_user_context(config).shared();
    let registry = linvoice_tools::default_registry(&config.tools, user_context.clone());
    let executor = ToolExecutor::new(registry);

    let provider = if config.llm.enabled {
        match linvoice_providers::build_from_config(&config.llm) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "LLM provider unavailable, using rules only");
                None
            }
        }
    } else {
        None
    };

    let router = Router::from_config(config, executor, provider, user_context);
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        llm = router.has_provider(),
        tools = router.executor().registry().len(),
        "Assistant ready"
    );
    router
}
