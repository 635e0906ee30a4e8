//! Configuration loading, validation, and management for linvoice.
//!
//! Loads configuration from `~/.linvoice/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.linvoice/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persisted personalization store
    #[serde(default)]
    pub user_context: UserContextConfig,

    /// Built-in tool limits and allowlists
    #[serde(default)]
    pub tools: ToolsConfig,

    /// External speech commands
    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
}

fn default_assistant_name() -> String {
    "JARVIS".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// When false, every turn takes the rule path
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature for the tool-selection prompt
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Temperature for the follow-up summary prompt
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Use keyword rules when the provider is unavailable
    #[serde(default = "default_true")]
    pub fallback_to_rules: bool,

    /// Suppress chain-of-thought output on models that support it
    #[serde(default = "default_true")]
    pub disable_thinking: bool,

    /// Extra providers tried in order when the primary fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<FallbackProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen3:4b".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_summary_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    512
}
fn default_summary_max_tokens() -> u32 {
    150
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            summary_temperature: default_summary_temperature(),
            max_tokens: default_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            timeout_secs: default_timeout_secs(),
            fallback_to_rules: true,
            disable_thinking: true,
            fallbacks: vec![],
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("summary_temperature", &self.summary_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallback_to_rules", &self.fallback_to_rules)
            .field("disable_thinking", &self.disable_thinking)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FallbackProviderConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for FallbackProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProviderConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Exchanges kept in the rolling conversation log
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Exchanges rendered into each prompt
    #[serde(default = "default_context_exchanges")]
    pub context_exchanges: usize,
}

fn default_max_history() -> usize {
    10
}
fn default_context_exchanges() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            context_exchanges: default_context_exchanges(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContextConfig {
    /// Overrides `~/.linvoice/user_context.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Pick up names and preferences from ordinary utterances
    #[serde(default = "default_true")]
    pub auto_learn: bool,
}

impl UserContextConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("user_context.json"))
    }
}

impl Default for UserContextConfig {
    fn default() -> Self {
        Self {
            path: None,
            auto_learn: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Commands `execute_command` may run
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Upper bound for `run_script`, clamped to 5..=300
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Substrings that make `run_script` refuse a script
    #[serde(default = "default_blocked_patterns")]
    pub blocked_script_patterns: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "grep", "find", "head", "tail", "wc", "echo", "pwd", "whoami", "date",
        "df", "du", "ps", "free", "uptime", "uname",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_command_timeout() -> u64 {
    5
}
fn default_script_timeout() -> u64 {
    300
}
fn default_http_timeout() -> u64 {
    10
}
fn default_blocked_patterns() -> Vec<String> {
    [
        "rm -rf /", "mkfs", "dd if=", ":(){", "> /dev/sd", "chmod -R 777 /", "shutdown",
        "reboot", "sudo ",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl ToolsConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs.clamp(5, 300))
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            command_timeout_secs: default_command_timeout(),
            script_timeout_secs: default_script_timeout(),
            http_timeout_secs: default_http_timeout(),
            blocked_script_patterns: default_blocked_patterns(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Command that records and prints one transcription on stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_command: Option<String>,

    /// Command that speaks text received on stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_command: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.linvoice/config.toml).
    ///
    /// Environment overrides:
    /// - `LINVOICE_PROVIDER`
    /// - `LINVOICE_MODEL`
    /// - `LINVOICE_LLM_URL`
    /// - `LINVOICE_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("LINVOICE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("LINVOICE_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("LINVOICE_LLM_URL") {
            self.llm.base_url = url;
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("LINVOICE_API_KEY").ok();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".linvoice")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("llm.temperature", self.llm.temperature),
            ("llm.summary_temperature", self.llm.summary_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("llm.timeout_secs must be > 0".into()));
        }

        if self.memory.max_history == 0 {
            return Err(ConfigError::ValidationError("memory.max_history must be > 0".into()));
        }

        if self.memory.context_exchanges == 0 {
            return Err(ConfigError::ValidationError(
                "memory.context_exchanges must be > 0".into(),
            ));
        }

        if !matches!(self.llm.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "unknown llm.provider '{}' (expected \"ollama\" or \"openai\")",
                self.llm.provider
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            llm: LlmConfig::default(),
            memory: MemoryConfig::default(),
            user_context: UserContextConfig::default(),
            tools: ToolsConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
