//! Rolling conversation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Pronouns that point back at something said earlier.
const REFERENCE_WORDS: &[&str] = &["it", "that", "this", "them", "those"];

/// Words whose next word is usually the thing being talked about.
const TARGET_VERBS: &[&str] = &["open", "launch", "start", "close", "quit", "play", "pause", "about", "for"];

/// What happened during a turn, besides the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    /// Call labels such as `open_app(firefox)`, in execution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,

    /// The entity the turn acted on, for later pronoun resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ExchangeMetadata {
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_tool(mut self, label: impl Into<String>) -> Self {
        self.tools_used.push(label.into());
        self
    }
}

/// One user utterance and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user_text: String,
    pub assistant_text: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: ExchangeMetadata,
}

/// FIFO of the most recent exchanges. Never holds more than `max_history`.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    max_history: usize,
}

impl ConversationMemory {
    /// `max_history` is raised to 1 if given as 0.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            exchanges: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    pub fn add_exchange(
        &mut self,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        metadata: ExchangeMetadata,
    ) {
        self.push(Exchange {
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            timestamp: Utc::now(),
            metadata,
        });
    }

    pub fn push(&mut self, exchange: Exchange) {
        while self.exchanges.len() >= self.max_history {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(exchange);
        debug!(total = self.exchanges.len(), "Added exchange to conversation memory");
    }

    /// The last `num_exchanges` exchanges as `User: …` / `Assistant: …` lines.
    pub fn get_context(&self, num_exchanges: usize) -> String {
        let skip = self.exchanges.len().saturating_sub(num_exchanges);
        self.exchanges
            .iter()
            .skip(skip)
            .flat_map(|e| {
                [
                    format!("User: {}", e.user_text),
                    format!("Assistant: {}", e.assistant_text),
                ]
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Intents of the last `num` exchanges, newest first.
    pub fn recent_topics(&self, num: usize) -> Vec<String> {
        self.exchanges
            .iter()
            .rev()
            .take(num)
            .filter_map(|e| e.metadata.intent.clone())
            .collect()
    }

    pub fn last_exchange(&self) -> Option<&Exchange> {
        self.exchanges.back()
    }

    /// Resolve a pronoun in `text` to something mentioned earlier.
    ///
    /// Returns `None` when `text` has no reference word. Otherwise walks back
    /// through history and returns the first recorded target, falling back to
    /// the word after an action verb in that exchange's user text.
    pub fn find_reference(&self, text: &str) -> Option<String> {
        if !has_reference_word(text) {
            return None;
        }

        self.exchanges.iter().rev().find_map(|e| {
            e.metadata
                .target
                .clone()
                .or_else(|| word_after_verb(&e.user_text))
        })
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
        tracing::info!("Conversation memory cleared");
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(10)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
}

/// Whole-word match, so "with" or "italic" do not count as "it".
pub fn has_reference_word(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("the same") || words(text).any(|w| REFERENCE_WORDS.contains(&w.as_str()))
}

fn word_after_verb(text: &str) -> Option<String> {
    let tokens: Vec<String> = words(text).collect();
    tokens
        .windows(2)
        .find(|pair| TARGET_VERBS.contains(&pair[0].as_str()))
        .map(|pair| pair[1].clone())
        .filter(|w| !REFERENCE_WORDS.contains(&w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_max_history() {
        let mut memory = ConversationMemory::new(5);
        for i in 0..12 {
            memory.add_exchange(format!("Question {i}"), format!("Answer {i}"), ExchangeMetadata::default());
            assert!(memory.len() <= 5);
        }
        let kept: Vec<&str> = memory.iter().map(|e| e.user_text.as_str()).collect();
        assert_eq!(kept, vec!["Question 7", "Question 8", "Question 9", "Question 10", "Question 11"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut memory = ConversationMemory::new(0);
        memory.add_exchange("a", "b", ExchangeMetadata::default());
        memory.add_exchange("c", "d", ExchangeMetadata::default());
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.last_exchange().unwrap().user_text, "c");
    }

    #[test]
    fn context_renders_recent_window() {
        let mut memory = ConversationMemory::default();
        for i in 0..5 {
            memory.add_exchange(format!("Q{i}"), format!("A{i}"), ExchangeMetadata::default());
        }
        assert_eq!(memory.get_context(2), "User: Q3\nAssistant: A3\nUser: Q4\nAssistant: A4");
        assert_eq!(ConversationMemory::default().get_context(5), "");
    }

    #[test]
    fn recent_topics_newest_first() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("open firefox", "ok", ExchangeMetadata::default().with_intent("open_app"));
        memory.add_exchange("hi", "hello", ExchangeMetadata::default());
        memory.add_exchange("cpu?", "12%", ExchangeMetadata::default().with_intent("system_info"));
        assert_eq!(memory.recent_topics(3), vec!["system_info", "open_app"]);
    }

    #[test]
    fn reference_uses_recorded_target() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange(
            "open firefox",
            "Opening firefox",
            ExchangeMetadata::default().with_target("firefox").with_tool("open_app(firefox)"),
        );
        assert_eq!(memory.find_reference("close it").as_deref(), Some("firefox"));
    }

    #[test]
    fn reference_looks_past_untargeted_turns() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("open spotify", "Opening", ExchangeMetadata::default().with_target("spotify"));
        memory.add_exchange("thanks", "You're welcome", ExchangeMetadata::default());
        assert_eq!(memory.find_reference("close it").as_deref(), Some("spotify"));
    }

    #[test]
    fn reference_falls_back_to_word_after_verb() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("Play jazz please", "Playing", ExchangeMetadata::default());
        assert_eq!(memory.find_reference("pause that").as_deref(), Some("jazz"));
    }

    #[test]
    fn no_reference_word_means_no_resolution() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("open firefox", "ok", ExchangeMetadata::default().with_target("firefox"));
        assert!(memory.find_reference("close with care").is_none());
        assert!(memory.find_reference("open terminal").is_none());
        assert!(ConversationMemory::default().find_reference("close it").is_none());
    }

    #[test]
    fn clear_empties_memory() {
        let mut memory = ConversationMemory::default();
        memory.add_exchange("a", "b", ExchangeMetadata::default());
        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.last_exchange().is_none());
    }
}
