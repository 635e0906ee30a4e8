//! Persisted personalization store.
//!
//! The whole context lives in one JSON file (`~/.linvoice/user_context.json`
//! by default). It is loaded once at startup and written through after every
//! mutation via a temp file and rename, so a crash mid-write leaves the
//! previous version intact. A failed write is logged and the in-memory state
//! carries on.

use chrono::{DateTime, Utc};
use linvoice_core::error::MemoryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Oldest facts are dropped beyond this many.
pub const MAX_FACTS: usize = 50;

/// Facts included in the prompt summary.
const SUMMARY_FACTS: usize = 5;

/// Handle shared between the router and the context tools.
pub type SharedUserContext = Arc<Mutex<UserContext>>;

/// Something worth remembering about the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ContextMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            last_updated: now,
        }
    }
}

/// On-disk layout of the context file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default)]
    pub user_info: BTreeMap<String, String>,

    /// category → key → value
    #[serde(default)]
    pub preferences: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(default)]
    pub important_facts: Vec<Fact>,

    #[serde(default)]
    pub work_context: BTreeMap<String, String>,

    /// app type (browser, editor…) → app name
    #[serde(default)]
    pub app_preferences: BTreeMap<String, String>,

    #[serde(default)]
    pub metadata: ContextMetadata,
}

pub struct UserContext {
    /// `None` keeps everything in memory.
    path: Option<PathBuf>,
    data: ContextData,
}

impl UserContext {
    /// Load the context at `path`, starting empty if the file is missing.
    ///
    /// An unreadable or corrupt file is renamed to `<path>.corrupt` first so
    /// the next write cannot destroy it. If it cannot be moved aside, the
    /// context stays in memory only.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::read(&path) {
            Ok(Some(data)) => {
                info!(path = %path.display(), facts = data.important_facts.len(), "Loaded user context");
                Self { path: Some(path), data }
            }
            Ok(None) => {
                debug!(path = %path.display(), "No user context file yet, starting empty");
                Self::empty_at(path)
            }
            Err(e) if !path.is_file() => {
                warn!(error = %e, "User context unreachable, starting empty");
                Self::empty_at(path)
            }
            Err(e) => {
                let aside = Self::corrupt_path(&path);
                match std::fs::rename(&path, &aside) {
                    Ok(()) => {
                        warn!(error = %e, saved_as = %aside.display(), "Unreadable user context moved aside, starting empty");
                        Self::empty_at(path)
                    }
                    Err(rename_err) => {
                        warn!(error = %e, rename_error = %rename_err, "Unreadable user context left in place, not persisting");
                        Self::in_memory()
                    }
                }
            }
        }
    }

    /// Where an unreadable context file is kept: `<path>.corrupt`.
    pub fn corrupt_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    fn empty_at(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            data: ContextData::default(),
        }
    }

    /// A context that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: ContextData::default(),
        }
    }

    pub fn shared(self) -> SharedUserContext {
        Arc::new(Mutex::new(self))
    }

    fn read(path: &Path) -> Result<Option<ContextData>, MemoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| MemoryError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the current state to disk atomically.
    pub fn persist(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create context directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path).map_err(|e| {
            MemoryError::Storage(format!("Failed to replace {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), "Saved user context");
        Ok(())
    }

    /// Stamp `last_updated` and write through, logging failures.
    fn commit(&mut self) {
        self.data.metadata.last_updated = Utc::now();
        if let Err(e) = self.persist() {
            warn!(error = %e, "User context not persisted, keeping in-memory state");
        }
    }

    // --- user info ---

    pub fn set_user_info(&mut self, key: &str, value: &str) {
        self.data.user_info.insert(key.into(), value.into());
        info!(key = %key, "Set user info");
        self.commit();
    }

    pub fn user_info(&self, key: &str) -> Option<&str> {
        self.data.user_info.get(key).map(String::as_str)
    }

    // --- preferences ---

    pub fn set_preference(&mut self, category: &str, key: &str, value: &str) {
        self.data
            .preferences
            .entry(category.into())
            .or_default()
            .insert(key.into(), value.into());
        info!(category = %category, key = %key, "Set preference");
        self.commit();
    }

    pub fn preference(&self, category: &str, key: &str) -> Option<&str> {
        self.data
            .preferences
            .get(category)
            .and_then(|c| c.get(key))
            .map(String::as_str)
    }

    pub fn preference_or<'a>(&'a self, category: &str, key: &str, default: &'a str) -> &'a str {
        self.preference(category, key).unwrap_or(default)
    }

    // --- facts ---

    pub fn add_important_fact(&mut self, fact: &str, category: &str) {
        if self.data.important_facts.len() >= MAX_FACTS {
            self.data.important_facts.remove(0);
        }
        self.data.important_facts.push(Fact {
            fact: fact.into(),
            category: category.into(),
            timestamp: Utc::now(),
        });
        info!(category = %category, "Added important fact");
        self.commit();
    }

    /// Most recent facts first, optionally restricted to one category.
    pub fn important_facts(&self, category: Option<&str>, limit: usize) -> Vec<&str> {
        self.data
            .important_facts
            .iter()
            .rev()
            .filter(|f| category.is_none_or(|c| f.category == c))
            .take(limit)
            .map(|f| f.fact.as_str())
            .collect()
    }

    // --- work context ---

    pub fn set_work_context(&mut self, key: &str, value: &str) {
        self.data.work_context.insert(key.into(), value.into());
        info!(key = %key, "Set work context");
        self.commit();
    }

    pub fn work_context(&self, key: &str) -> Option<&str> {
        self.data.work_context.get(key).map(String::as_str)
    }

    // --- app preferences ---

    pub fn set_app_preference(&mut self, app_type: &str, app_name: &str) {
        self.data
            .app_preferences
            .insert(app_type.into(), app_name.into());
        info!(app_type = %app_type, app = %app_name, "Set app preference");
        self.commit();
    }

    pub fn app_preference(&self, app_type: &str) -> Option<&str> {
        self.data.app_preferences.get(app_type).map(String::as_str)
    }

    /// Prompt-ready summary. Empty when nothing is known.
    pub fn context_summary(&self) -> String {
        fn pairs(map: &BTreeMap<String, String>) -> String {
            map.iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut lines = Vec::new();
        if !self.data.user_info.is_empty() {
            lines.push(format!("User Info: {}", pairs(&self.data.user_info)));
        }
        if let Some(response) = self.data.preferences.get("response").filter(|p| !p.is_empty()) {
            lines.push(format!("Response Preferences: {}", pairs(response)));
        }
        if !self.data.app_preferences.is_empty() {
            lines.push(format!("App Preferences: {}", pairs(&self.data.app_preferences)));
        }
        if !self.data.work_context.is_empty() {
            lines.push(format!("Work Context: {}", pairs(&self.data.work_context)));
        }
        let facts = self.important_facts(None, SUMMARY_FACTS);
        if !facts.is_empty() {
            lines.push(format!("Important Facts: {}", facts.join("; ")));
        }
        lines.join("\n")
    }

    /// Pick up a name, preferences, or work topics from an ordinary
    /// utterance. Returns true if anything was stored.
    pub fn learn_from_interaction(&mut self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        let mut learned = false;

        if let Some(name) = extract_name(&lower) {
            self.set_user_info("name", &name);
            learned = true;
        }
        if lower.contains("i prefer") || lower.contains("i like") {
            self.add_important_fact(text.trim(), "preference");
            learned = true;
        }
        if lower.contains("i work on") || lower.contains("i'm working on") {
            self.add_important_fact(text.trim(), "work");
            learned = true;
        }
        learned
    }

    /// Reset to an empty context and persist it.
    pub fn clear(&mut self) {
        self.data = ContextData::default();
        info!("User context cleared");
        self.commit();
    }

    pub fn export(&self) -> serde_json::Value {
        serde_json::to_value(&self.data).unwrap_or_default()
    }

    pub fn data(&self) -> &ContextData {
        &self.data
    }

    pub fn fact_count(&self) -> usize {
        self.data.important_facts.len()
    }
}

/// Words that follow "i'm"/"i am" without being a name.
const NOT_NAMES: &[&str] = &[
    "a", "an", "the", "not", "so", "very", "just", "really", "working", "going", "trying",
    "looking", "fine", "good", "ok", "okay", "done", "back", "here", "tired", "busy", "ready",
    "sorry", "sure", "using", "at", "in", "on",
];

fn extract_name(lower: &str) -> Option<String> {
    for phrase in ["my name is ", "call me ", "i'm ", "i am "] {
        let Some((_, rest)) = lower.split_once(phrase) else {
            continue;
        };
        let word: String = rest
            .split_whitespace()
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_alphabetic() || *c == '-')
            .collect();
        let casual = matches!(phrase, "i'm " | "i am ");
        if word.chars().count() < 2 || (casual && NOT_NAMES.contains(&word.as_str())) {
            continue;
        }
        let mut chars = word.chars();
        return chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect());
    }
    None
}

impl std::fmt::Display for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefs: usize = self.data.preferences.values().map(BTreeMap::len).sum();
        write!(f, "UserContext({} facts, {prefs} preferences)", self.data.important_facts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_context() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("user_context.json");
        (dir, path)
    }

    #[test]
    fn preference_survives_reload() {
        let (_dir, path) = temp_context();
        let mut ctx = UserContext::load(&path);
        ctx.set_preference("response", "style", "concise");
        ctx.set_app_preference("browser", "firefox");

        let reloaded = UserContext::load(&path);
        assert_eq!(reloaded.preference("response", "style"), Some("concise"));
        assert_eq!(reloaded.app_preference("browser"), Some("firefox"));
        assert_eq!(reloaded.preference_or("voice", "speed", "normal"), "normal");
    }

    #[test]
    fn write_leaves_no_temp_file() {
        let (_dir, path) = temp_context();
        let mut ctx = UserContext::load(&path);
        ctx.set_user_info("name", "Ada");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let (_dir, path) = temp_context();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let ctx = UserContext::load(&path);
        assert_eq!(ctx.fact_count(), 0);
        assert_eq!(ctx.context_summary(), "");
    }

    #[test]
    fn corrupt_file_is_kept_aside_before_writing() {
        let (_dir, path) = temp_context();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"user_info\": {\"name\": \"Ada\"").unwrap();

        let mut ctx = UserContext::load(&path);
        let aside = UserContext::corrupt_path(&path);
        assert!(aside.ends_with("user_context.json.corrupt"));
        assert_eq!(
            std::fs::read_to_string(&aside).unwrap(),
            "{\"user_info\": {\"name\": \"Ada\""
        );

        ctx.set_user_info("name", "Grace");
        assert_eq!(UserContext::load(&path).user_info("name"), Some("Grace"));
        assert!(std::fs::read_to_string(&aside).unwrap().contains("Ada"));
    }

    #[test]
    fn persistence_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent "directory" is a regular file, so every write fails.
        let mut ctx = UserContext::load(blocker.join("ctx.json"));
        ctx.set_user_info("name", "Ada");
        assert_eq!(ctx.user_info("name"), Some("Ada"));
        assert!(ctx.persist().is_err());
    }

    #[test]
    fn facts_are_capped_and_newest_first() {
        let mut ctx = UserContext::in_memory();
        for i in 0..55 {
            let category = if i % 2 == 0 { "even" } else { "odd" };
            ctx.add_important_fact(&format!("fact {i}"), category);
        }
        assert_eq!(ctx.fact_count(), MAX_FACTS);
        assert_eq!(ctx.important_facts(None, 2), vec!["fact 54", "fact 53"]);
        assert_eq!(ctx.important_facts(Some("odd"), 2), vec!["fact 53", "fact 51"]);
        assert!(!ctx.important_facts(None, 100).contains(&"fact 4"));
    }

    #[test]
    fn summary_lists_sections() {
        let mut ctx = UserContext::in_memory();
        ctx.set_user_info("name", "Ada");
        ctx.set_preference("response", "style", "concise");
        ctx.set_preference("voice", "speed", "fast");
        ctx.set_work_context("project", "compiler");
        ctx.add_important_fact("likes tea", "general");
        ctx.add_important_fact("uses vim", "general");

        let summary = ctx.context_summary();
        assert_eq!(
            summary,
            "User Info: name: Ada\n\
             Response Preferences: style: concise\n\
             Work Context: project: compiler\n\
             Important Facts: uses vim; likes tea"
        );
    }

    #[test]
    fn learns_name_and_preferences() {
        let mut ctx = UserContext::in_memory();
        assert!(ctx.learn_from_interaction("My name is ada"));
        assert_eq!(ctx.user_info("name"), Some("Ada"));

        assert!(ctx.learn_from_interaction("I prefer short answers"));
        assert_eq!(ctx.important_facts(Some("preference"), 1), vec!["I prefer short answers"]);

        assert!(!ctx.learn_from_interaction("open firefox"));
    }

    #[test]
    fn casual_phrases_are_not_names() {
        let mut ctx = UserContext::in_memory();
        ctx.learn_from_interaction("I'm working on the parser");
        assert_eq!(ctx.user_info("name"), None);
        assert_eq!(ctx.important_facts(Some("work"), 1), vec!["I'm working on the parser"]);
    }

    #[test]
    fn clear_resets_everything() {
        let (_dir, path) = temp_context();
        let mut ctx = UserContext::load(&path);
        ctx.set_user_info("name", "Ada");
        ctx.clear();
        assert_eq!(UserContext::load(&path).user_info("name"), None);
        assert_eq!(ctx.export()["user_info"], serde_json::json!({}));
    }
}
