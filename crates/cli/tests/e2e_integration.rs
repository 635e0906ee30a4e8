//! End-to-end tests for the linvoice turn pipeline.
//!
//! These run the real router, parser, executor and built-in registry from
//! user text to spoken reply. The LLM is scripted, and the app launcher is
//! swapped for a recording double so no windows open.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use linvoice_agent::{FALLBACK_APOLOGY, LlmSettings, Route, Router};
use linvoice_config::{AppConfig, ToolsConfig};
use linvoice_core::error::{ProviderError, ToolError};
use linvoice_core::executor::ToolExecutor;
use linvoice_core::provider::{GenerationRequest, Provider};
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult};
use linvoice_memory::{SharedUserContext, UserContext};
use linvoice_tools::default_registry;

// ── Mock provider ────────────────────────────────────────────────────────

/// Returns scripted replies in order. Panics when exhausted.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted after {} calls", self.calls()))
    }
}

/// Never answers.
struct SilentProvider;

#[async_trait]
impl Provider for SilentProvider {
    fn name(&self) -> &str {
        "silent_mock"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Err(ProviderError::EmptyResponse)
    }
}

// ── Recording app launcher ───────────────────────────────────────────────

struct FakeAppTool {
    name: &'static str,
    verb: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for FakeAppTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Recording double for the app launcher"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("app_name", ParamType::String, "Application")]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let app = arguments["app_name"].as_str().unwrap_or_default().to_string();
        self.log.lock().unwrap().push(format!("{}({app})", self.name));
        Ok(ToolResult::message(format!("{} {app}", self.verb)).with("app", app))
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    router: Router,
    launches: Arc<Mutex<Vec<String>>>,
    dir: tempfile::TempDir,
}

fn user_context(dir: &tempfile::TempDir) -> SharedUserContext {
    UserContext::load(dir.path().join("user_context.json")).shared()
}

fn harness(provider: Option<Arc<dyn Provider>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let context = user_context(&dir);
    let launches = Arc::new(Mutex::new(Vec::new()));

    let mut registry = default_registry(&ToolsConfig::default(), context.clone());
    for (name, verb) in [("open_app", "Opened"), ("close_app", "Closed")] {
        let replaced = registry.register(Box::new(FakeAppTool {
            name,
            verb,
            log: launches.clone(),
        }));
        assert!(replaced.is_some(), "{name} should replace the built-in");
    }

    let config = AppConfig::default();
    let router = Router::from_config(&config, ToolExecutor::new(registry), provider, context);
    Harness {
        router,
        launches,
        dir,
    }
}

fn has_percentage(text: &str) -> bool {
    text.split_whitespace().any(|word| {
        let word = word.trim_end_matches(['.', ',']);
        word.strip_suffix('%')
            .is_some_and(|n| !n.is_empty() && n.parse::<f64>().is_ok())
    })
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_firefox_takes_the_rule_path() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let mut h = harness(Some(provider.clone() as Arc<dyn Provider>));

    let outcome = h.router.handle_turn("open firefox").await;

    assert_eq!(outcome.route, Route::Rule);
    assert!(outcome.reply.to_lowercase().contains("firefox"));
    assert_eq!(*h.launches.lock().unwrap(), vec!["open_app(firefox)"]);
    assert_eq!(provider.calls(), 0, "rule path must not call the LLM");
}

#[tokio::test]
async fn cpu_question_runs_system_info_through_the_llm() {
    // The follow-up call fails, so the reply comes from the real tool's numbers.
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("TOOL: get_system_info(info_type=\"cpu\")".into()),
        Err(ProviderError::Network("connection reset".into())),
    ]));
    let mut h = harness(Some(provider.clone() as Arc<dyn Provider>));

    let outcome = h.router.handle_turn("what's my CPU usage").await;

    assert_eq!(outcome.route, Route::Llm);
    assert_eq!(outcome.results.len(), 1);
    let (call, result) = &outcome.results[0];
    assert_eq!(call.name, "get_system_info");
    assert!(result.success, "system info failed: {:?}", result.error);
    assert!(result.get("cpu_percent").is_some());
    assert!(has_percentage(&outcome.reply), "no percentage in {:?}", outcome.reply);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn follow_up_reply_is_spoken() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("<think>user wants cpu</think>\nTOOL: get_system_info(info_type=\"cpu\")".into()),
        Ok("Your CPU is at 12% right now.".into()),
    ]));
    let mut h = harness(Some(provider.clone() as Arc<dyn Provider>));

    let outcome = h.router.handle_turn("what's my CPU usage").await;
    assert_eq!(outcome.reply, "Your CPU is at 12% right now.");
    assert!(has_percentage(&outcome.reply));

    let prompts = provider.prompts.lock().unwrap();
    assert!(prompts[1].contains("cpu_percent:"));
}

#[tokio::test]
async fn close_it_resolves_to_last_opened_app() {
    let mut h = harness(None);

    h.router.handle_turn("open firefox").await;
    let first = h.router.memory().last_exchange().unwrap().metadata.clone();
    assert_eq!(first.tools_used, vec!["open_app(firefox)"]);

    let outcome = h.router.handle_turn("close it").await;
    assert_eq!(outcome.tools_used(), vec!["close_app(firefox)"]);
    assert_eq!(
        *h.launches.lock().unwrap(),
        vec!["open_app(firefox)", "close_app(firefox)"]
    );
}

#[tokio::test]
async fn provider_unavailable_still_answers() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Network("connection refused".into())),
        Err(ProviderError::Network("connection refused".into())),
    ]));
    let mut h = harness(Some(provider as Arc<dyn Provider>));

    let outcome = h.router.handle_turn("write me a poem about penguins").await;
    assert_eq!(outcome.route, Route::Fallback);
    assert!(!outcome.reply.is_empty());
    assert_eq!(outcome.reply, FALLBACK_APOLOGY);

    // Re-attempted on the next turn, then the keyword rules step in.
    let outcome = h.router.handle_turn("how much memory am I using").await;
    assert_eq!(outcome.route, Route::Fallback);
    assert_eq!(outcome.results[0].0.name, "get_system_info");
    assert!(has_percentage(&outcome.reply), "no percentage in {:?}", outcome.reply);
}

#[tokio::test(start_paused = true)]
async fn llm_timeout_apologizes_within_bound() {
    let dir = tempfile::tempdir().unwrap();
    let context = user_context(&dir);
    let registry = default_registry(&ToolsConfig::default(), context.clone());
    let mut router = Router::new(ToolExecutor::new(registry), context)
        .with_provider(Arc::new(SilentProvider))
        .with_settings(LlmSettings {
            timeout: Duration::from_secs(5),
            ..LlmSettings::default()
        });

    let started = tokio::time::Instant::now();
    let outcome = router.handle_turn("tell me about the roman empire").await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.reply, FALLBACK_APOLOGY);
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");

    let recorded = router.memory().last_exchange().unwrap();
    assert_eq!(recorded.user_text, "tell me about the roman empire");
    assert_eq!(recorded.assistant_text, FALLBACK_APOLOGY);
}

#[tokio::test]
async fn preference_tool_persists_user_context() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("TOOL: set_user_preference(category=\"app\", preference=\"browser\", value=\"firefox\")".into()),
        Ok("Okay, firefox is your browser from now on.".into()),
    ]));
    let mut h = harness(Some(provider as Arc<dyn Provider>));

    let outcome = h.router.handle_turn("remember that my browser is firefox").await;
    assert!(outcome.results[0].1.success, "{:?}", outcome.results[0].1.error);

    let reloaded = UserContext::load(h.dir.path().join("user_context.json"));
    assert_eq!(reloaded.app_preference("browser"), Some("firefox"));
}

#[tokio::test]
async fn memory_stays_bounded_over_many_turns() {
    let mut h = harness(None);
    let started = Instant::now();
    for i in 0..25 {
        h.router.handle_turn(&format!("open app{i}")).await;
    }
    assert!(started.elapsed() < Duration::from_secs(10));

    let memory = h.router.memory();
    assert_eq!(memory.len(), memory.max_history());
    let last: Vec<&str> = memory.iter().map(|e| e.user_text.as_str()).collect();
    assert_eq!(last.first(), Some(&"open app15"));
    assert_eq!(last.last(), Some(&"open app24"));
}
