//! One conversational turn, start to finish.
//!
//! ```text
//! text ─ classify ─┬─ Rule ──────────────────────── one tool call ─┐
//!                  └─ LLM ─ parse ─ dispatch(0..N) ─ follow-up ────┤
//!                        └─ provider down ─ keyword rules ─────────┤
//!                                                   record exchange ─ reply
//! ```
//!
//! [`Router::handle_turn`] never fails: every path ends in a reply string and
//! an appended [`Exchange`](linvoice_memory::Exchange).

use linvoice_config::AppConfig;
use linvoice_core::error::ProviderError;
use linvoice_core::executor::ToolExecutor;
use linvoice_core::provider::{GenerationRequest, Provider};
use linvoice_core::tool::{ToolCall, ToolResult, display_value};
use linvoice_memory::{ConversationMemory, ExchangeMetadata, SharedUserContext};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::classifier::{self, Classification, Intent};
use crate::parser::{ToolCallParser, strip_reasoning};
use crate::prompt::PromptBuilder;

/// Spoken when neither the LLM nor the keyword rules can help.
pub const FALLBACK_APOLOGY: &str =
    "I'm sorry, I couldn't reach my language model. Try a simple command like 'open firefox'.";

/// Spoken when the model answered but said nothing usable.
const UNSURE_REPLY: &str = "I'm not sure how to help with that.";

/// Argument names that identify what a call acted on.
const TARGET_KEYS: &[&str] = &["app_name", "website", "url", "path", "query", "player"];

/// Literal template echoes some small models return instead of a real call.
const TEMPLATE_ECHOES: &[&str] = &["TOOL: name(param=\"value\")", "TOOL:", "TOOL: name()"];

/// Which path produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Rule,
    Llm,
    Fallback,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rule => "rule",
            Self::Llm => "llm",
            Self::Fallback => "fallback",
        })
    }
}

/// What a turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub route: Route,
    /// Calls in execution order, with their results
    pub results: Vec<(ToolCall, ToolResult)>,
}

impl TurnOutcome {
    pub fn tools_used(&self) -> Vec<String> {
        self.results.iter().map(|(call, _)| call.label()).collect()
    }
}

/// LLM sampling settings for both prompts of a turn.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub summary_temperature: f32,
    pub summary_max_tokens: u32,
    pub timeout: Duration,
    pub fallback_to_rules: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 512,
            summary_temperature: 0.3,
            summary_max_tokens: 150,
            timeout: Duration::from_secs(60),
            fallback_to_rules: true,
        }
    }
}

/// Orchestrates classification, prompting, dispatch and memory for each turn.
pub struct Router {
    executor: ToolExecutor,
    provider: Option<Arc<dyn Provider>>,
    settings: LlmSettings,
    parser: ToolCallParser,
    prompts: PromptBuilder,
    memory: ConversationMemory,
    user_context: SharedUserContext,
    context_exchanges: usize,
    auto_learn: bool,
}

impl Router {
    /// A router with no LLM: every turn takes the rule path or the keyword
    /// fallback until a provider is attached.
    pub fn new(executor: ToolExecutor, user_context: SharedUserContext) -> Self {
        let parser = ToolCallParser::with_known_tools(executor.registry().names());
        Self {
            executor,
            provider: None,
            settings: LlmSettings::default(),
            parser,
            prompts: PromptBuilder::default(),
            memory: ConversationMemory::default(),
            user_context,
            context_exchanges: 5,
            auto_learn: false,
        }
    }

    /// Build a router from the application config. `provider` is ignored when
    /// `llm.enabled` is false.
    pub fn from_config(
        config: &AppConfig,
        executor: ToolExecutor,
        provider: Option<Arc<dyn Provider>>,
        user_context: SharedUserContext,
    ) -> Self {
        let llm = &config.llm;
        let mut router = Self::new(executor, user_context)
            .with_settings(LlmSettings {
                temperature: llm.temperature,
                max_tokens: llm.max_tokens,
                summary_temperature: llm.summary_temperature,
                summary_max_tokens: llm.summary_max_tokens,
                timeout: llm.timeout(),
                fallback_to_rules: llm.fallback_to_rules,
            })
            .with_memory(ConversationMemory::new(config.memory.max_history))
            .with_context_window(config.memory.context_exchanges)
            .with_auto_learn(config.user_context.auto_learn)
            .with_assistant_name(&config.assistant.name);
        if llm.enabled {
            router.provider = provider;
        }
        router
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_settings(mut self, settings: LlmSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = memory;
        self
    }

    /// Number of past exchanges rendered into each prompt.
    pub fn with_context_window(mut self, exchanges: usize) -> Self {
        self.context_exchanges = exchanges.max(1);
        self
    }

    pub fn with_auto_learn(mut self, enabled: bool) -> Self {
        self.auto_learn = enabled;
        self
    }

    pub fn with_assistant_name(mut self, name: &str) -> Self {
        self.prompts = PromptBuilder::new(name);
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn user_context(&self) -> &SharedUserContext {
        &self.user_context
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Process one utterance and return the reply to speak.
    pub async fn handle_turn(&mut self, text: &str) -> TurnOutcome {
        let span = info_span!("turn", id = %Uuid::new_v4());
        self.turn(text.trim()).instrument(span).await
    }

    async fn turn(&mut self, text: &str) -> TurnOutcome {
        let started = Instant::now();

        if self.auto_learn && self.user_context.lock().await.learn_from_interaction(text) {
            debug!("Learned something about the user");
        }

        let classification = classifier::classify(text, &self.memory);
        debug!(?classification, "Classified utterance");

        let (outcome, intent) = match classification {
            Classification::Rule(intent) => {
                let name = intent.name();
                (self.rule_path(&intent).await, Some(name.to_string()))
            }
            other => {
                let fallback = match other {
                    Classification::Ambiguous(intent) => intent.to_call(),
                    _ => None,
                };
                match self.provider.clone() {
                    Some(provider) => match self.llm_path(provider.as_ref(), text).await {
                        Ok(outcome) => (outcome, None),
                        Err(e) => {
                            warn!(error = %e, "LLM unavailable, falling back to rules");
                            (self.fallback_path(text, fallback, self.settings.fallback_to_rules).await, None)
                        }
                    },
                    None => (self.fallback_path(text, fallback, true).await, None),
                }
            }
        };

        self.record(text, &outcome, intent);
        info!(
            route = %outcome.route,
            tools = outcome.results.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );
        outcome
    }

    /// Exactly one tool call, no LLM.
    async fn rule_path(&self, intent: &Intent) -> TurnOutcome {
        let Some(call) = intent.to_call() else {
            let reply = match intent {
                Intent::Greeting(reply) => reply.to_string(),
                _ => UNSURE_REPLY.to_string(),
            };
            return TurnOutcome {
                reply,
                route: Route::Rule,
                results: Vec::new(),
            };
        };

        info!(tool = %call.name, "Rule match");
        let result = self.executor.execute_call(&call).await;
        let results = vec![(call, result)];
        TurnOutcome {
            reply: summarize_results(&results),
            route: Route::Rule,
            results,
        }
    }

    async fn llm_path(&self, provider: &dyn Provider, text: &str) -> Result<TurnOutcome, ProviderError> {
        let history = self.memory.get_context(self.context_exchanges);
        let user_summary = self.user_context.lock().await.context_summary();
        let request = GenerationRequest::new(self.prompts.request(text, &user_summary, &history))
            .with_system(self.prompts.system(self.executor.registry()))
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens)
            .timeout(self.settings.timeout);

        let response = self.generate(provider, request).await?;
        if is_template_echo(&response) {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "model echoed the call template".into(),
            });
        }

        let calls = self.parser.parse(&response);
        if calls.is_empty() {
            debug!("No tool calls, replying directly");
            return match self.parser.direct_reply(&response) {
                Some(reply) => Ok(TurnOutcome {
                    reply,
                    route: Route::Llm,
                    results: Vec::new(),
                }),
                None => Err(ProviderError::EmptyResponse),
            };
        }

        let results = self.dispatch(calls).await;
        let reply = self.follow_up(provider, text, &results).await;
        Ok(TurnOutcome {
            reply,
            route: Route::Llm,
            results,
        })
    }

    /// Run every call in order. A failed call does not stop the next one.
    async fn dispatch(&self, calls: Vec<ToolCall>) -> Vec<(ToolCall, ToolResult)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            info!(tool = %call.name, "Dispatching tool call");
            let result = self.executor.execute_call(&call).await;
            if !result.success {
                warn!(tool = %call.name, error = ?result.error, "Tool call failed");
            }
            results.push((call, result));
        }
        results
    }

    /// Second LLM call turning results into speech. Falls back to a local
    /// summary when the model is unavailable or answers with nothing usable.
    async fn follow_up(&self, provider: &dyn Provider, text: &str, results: &[(ToolCall, ToolResult)]) -> String {
        let request = GenerationRequest::new(self.prompts.follow_up(text, results))
            .temperature(self.settings.summary_temperature)
            .max_tokens(self.settings.summary_max_tokens)
            .timeout(self.settings.timeout);

        match self.generate(provider, request).await {
            Ok(response) => self
                .parser
                .direct_reply(&response)
                .unwrap_or_else(|| summarize_results(results)),
            Err(e) => {
                warn!(error = %e, "Follow-up generation failed, summarizing locally");
                summarize_results(results)
            }
        }
    }

    /// `generate` bounded by the configured timeout.
    async fn generate(&self, provider: &dyn Provider, request: GenerationRequest) -> Result<String, ProviderError> {
        let timeout = self.settings.timeout;
        let response = tokio::time::timeout(timeout, provider.generate(request))
            .await
            .map_err(|_| ProviderError::Timeout(format!("{} gave no answer within {}s", provider.name(), timeout.as_secs())))??;
        let response = strip_reasoning(&response);
        debug!(provider = provider.name(), chars = response.len(), "LLM responded");
        Ok(response)
    }

    async fn fallback_path(&self, text: &str, preferred: Option<ToolCall>, use_rules: bool) -> TurnOutcome {
        let call = if use_rules {
            preferred.or_else(|| classifier::infer_intent(text, &self.memory))
        } else {
            None
        };

        let Some(call) = call else {
            return TurnOutcome {
                reply: FALLBACK_APOLOGY.to_string(),
                route: Route::Fallback,
                results: Vec::new(),
            };
        };

        info!(tool = %call.name, "Keyword fallback");
        let result = self.executor.execute_call(&call).await;
        let results = vec![(call, result)];
        TurnOutcome {
            reply: summarize_results(&results),
            route: Route::Fallback,
            results,
        }
    }

    fn record(&mut self, text: &str, outcome: &TurnOutcome, intent: Option<String>) {
        let mut metadata = ExchangeMetadata::default();
        let intent = intent.or_else(|| outcome.results.first().map(|(call, _)| call.name.clone()));
        if let Some(intent) = intent {
            metadata = metadata.with_intent(intent);
        }
        for (call, _) in &outcome.results {
            metadata = metadata.with_tool(call.label());
        }
        if let Some(target) = outcome.results.iter().find_map(|(call, _)| target_of(call)) {
            metadata = metadata.with_target(target);
        }
        self.memory.add_exchange(text, &outcome.reply, metadata);
    }
}

fn is_template_echo(response: &str) -> bool {
    let trimmed = response.trim();
    trimmed.is_empty() || TEMPLATE_ECHOES.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

fn target_of(call: &ToolCall) -> Option<String> {
    TARGET_KEYS
        .iter()
        .find_map(|key| call.arguments.get(*key))
        .map(display_value)
        .filter(|t| !t.is_empty())
}

/// Deterministic spoken summary of tool results.
pub fn summarize_results(results: &[(ToolCall, ToolResult)]) -> String {
    match results {
        [] => "Done.".into(),
        [(call, result)] => describe(call, result),
        many => {
            let succeeded = many.iter().filter(|(_, r)| r.success).count();
            if succeeded == many.len() {
                format!("I've completed {} tasks.", many.len())
            } else if succeeded == 0 {
                "I encountered an error completing that task.".into()
            } else {
                format!("I completed {succeeded} of {} tasks.", many.len())
            }
        }
    }
}

fn describe(call: &ToolCall, result: &ToolResult) -> String {
    if !result.success {
        return format!("I couldn't do that: {}", result.error.as_deref().unwrap_or("unknown error"));
    }

    let stats: Vec<String> = [("cpu_percent", "CPU"), ("memory_percent", "Memory"), ("disk_percent", "Disk")]
        .iter()
        .filter_map(|(key, label)| result.get(key).map(|v| format!("{label} usage is at {}%", display_value(v))))
        .collect();
    if !stats.is_empty() {
        return format!("{}.", stats.join(", "));
    }

    if let Some(message) = result.get_str("message").filter(|m| !m.is_empty()) {
        return if message.ends_with(['.', '!', '?']) {
            message.to_string()
        } else {
            format!("{message}.")
        };
    }

    format!("I've completed the {} task.", call.name.replace('_', " "))
}
