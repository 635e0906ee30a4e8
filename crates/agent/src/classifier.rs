//! Rule-versus-LLM classification of an utterance.
//!
//! [`classify`] is deliberately small: only high-confidence command shapes
//! take the rule path. That means greetings, and "open X" / "close X" where X
//! is in the app or website alias tables. Everything else goes to the LLM. [`infer_intent`] is the looser keyword matcher used when the
//! LLM cannot be reached.

use linvoice_core::tool::{Arguments, ToolCall};
use linvoice_memory::ConversationMemory;
use linvoice_memory::conversation::has_reference_word;
use linvoice_tools::apps::is_known_app;
use linvoice_tools::web::is_known_website;

const OPEN_VERBS: &[&str] = &["open", "launch", "start", "run"];
const CLOSE_VERBS: &[&str] = &["close", "quit", "stop", "kill", "exit"];

/// Targets that belong to the media player, not to an app.
const MEDIA_WORDS: &[&str] = &["music", "song", "songs", "playback", "video", "track", "media", "playing"];

const FILLER_PREFIXES: &[&str] = &["please ", "can you ", "could you ", "would you ", "will you "];
const ARTICLES: &[&str] = &["the ", "my ", "a ", "an ", "up "];
const TRAILING_FILLER: &[&str] = &[" for me", " right now", " now"];
const CONJUNCTIONS: &[&str] = &[" and ", " then ", ", ", " also "];

const GREETINGS: &[(&str, &str)] = &[
    ("hello", "Hello! How can I help you today?"),
    ("hi", "Hi there! What can I do for you?"),
    ("hey", "Hey! How can I assist you?"),
    ("good morning", "Good morning! How can I help you today?"),
    ("good afternoon", "Good afternoon! What can I do for you?"),
    ("good evening", "Good evening! How may I assist you?"),
    ("how are you", "I'm doing great, thank you for asking! How can I help you?"),
    ("thank you", "You're welcome! Is there anything else I can help with?"),
    ("thanks", "You're welcome! Anything else?"),
];

/// Words allowed after a greeting ("hello there", "thanks a lot").
const GREETING_TAILS: &[&str] = &["", "jarvis", "there", "so much", "a lot", "you", "again"];

/// Longest app or site name the rule path accepts, in words.
const MAX_TARGET_WORDS: usize = 3;

/// A command the rule path can carry out without the LLM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting(&'static str),
    OpenApp(String),
    CloseApp(String),
    OpenWebsite(String),
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Greeting(_) => "greeting",
            Self::OpenApp(_) => "open_app",
            Self::CloseApp(_) => "close_app",
            Self::OpenWebsite(_) => "open_website",
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Greeting(_) => None,
            Self::OpenApp(t) | Self::CloseApp(t) | Self::OpenWebsite(t) => Some(t),
        }
    }

    /// The single tool call this intent maps to. Greetings need none.
    pub fn to_call(&self) -> Option<ToolCall> {
        let call = match self {
            Self::Greeting(_) => return None,
            Self::OpenApp(app) => ToolCall::new("open_app", Arguments::new()).with_arg("app_name", app.as_str()),
            Self::CloseApp(app) => ToolCall::new("close_app", Arguments::new()).with_arg("app_name", app.as_str()),
            Self::OpenWebsite(site) => {
                ToolCall::new("open_website", Arguments::new()).with_arg("website", site.as_str())
            }
        };
        Some(call)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Handle locally.
    Rule(Intent),
    /// Needs the language model.
    LlmRequired,
    /// Looks like a command but carries more than the rule can express.
    /// Goes to the LLM; the intent is the fallback if the LLM is down.
    Ambiguous(Intent),
}

/// Lowercase, trim punctuation and polite filler.
pub fn normalize(text: &str) -> String {
    let mut s = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    s = s.trim_end_matches(['.', '!', '?', ',']).trim().to_string();
    for prefix in FILLER_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    if let Some(rest) = s.strip_suffix(" please") {
        s = rest.trim_end_matches(',').to_string();
    }
    s
}

fn greeting(text: &str) -> Option<&'static str> {
    GREETINGS.iter().find_map(|(greeting, reply)| {
        let tail = text.strip_prefix(greeting)?;
        let tail = tail.trim_start_matches(',').trim();
        if tail.len() == text.len() - greeting.len() && !tail.is_empty() {
            // "history" starts with "hi" but is not a greeting.
            return None;
        }
        GREETING_TAILS.contains(&tail).then_some(*reply)
    })
}

fn strip_articles(target: &str) -> &str {
    let mut target = target.trim();
    while let Some(rest) = ARTICLES.iter().find_map(|a| target.strip_prefix(a)) {
        target = rest.trim();
    }
    TRAILING_FILLER
        .iter()
        .find_map(|f| target.strip_suffix(f))
        .unwrap_or(target)
        .trim()
}

fn is_media(target: &str) -> bool {
    target.split_whitespace().any(|w| MEDIA_WORDS.contains(&w))
}

/// Split a compound request at its first conjunction.
fn first_clause(target: &str) -> (&str, bool) {
    CONJUNCTIONS
        .iter()
        .filter_map(|c| target.find(c))
        .min()
        .map_or((target, false), |idx| (&target[..idx], true))
}

/// The intent for `verb target`, if the target names an app or site the
/// alias tables know. Anything else is left to the LLM.
fn app_intent(verb: &str, target: &str) -> Option<Intent> {
    if CLOSE_VERBS.contains(&verb) {
        is_known_app(target).then(|| Intent::CloseApp(target.to_string()))
    } else if is_known_website(target) {
        Some(Intent::OpenWebsite(target.to_string()))
    } else {
        is_known_app(target).then(|| Intent::OpenApp(target.to_string()))
    }
}

/// Decide how to handle `text`.
pub fn classify(text: &str, memory: &ConversationMemory) -> Classification {
    let text = normalize(text);
    if text.is_empty() {
        return Classification::LlmRequired;
    }
    if let Some(reply) = greeting(&text) {
        return Classification::Rule(Intent::Greeting(reply));
    }

    let Some((verb, rest)) = text.split_once(' ') else {
        return Classification::LlmRequired;
    };
    if !OPEN_VERBS.contains(&verb) && !CLOSE_VERBS.contains(&verb) {
        return Classification::LlmRequired;
    }

    let (clause, compound) = first_clause(rest);
    let target = strip_articles(clause);
    if target.is_empty() || is_media(target) {
        return Classification::LlmRequired;
    }

    let target = if has_reference_word(target) {
        match memory.find_reference(target) {
            Some(resolved) => resolved,
            None => return Classification::LlmRequired,
        }
    } else {
        target.to_string()
    };
    if target.split_whitespace().count() > MAX_TARGET_WORDS {
        return Classification::LlmRequired;
    }

    let Some(intent) = app_intent(verb, &target) else {
        return Classification::LlmRequired;
    };
    if compound {
        Classification::Ambiguous(intent)
    } else {
        Classification::Rule(intent)
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

fn first_number(text: &str) -> Option<i64> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Best-effort keyword mapping to one tool call, for when the LLM is down.
pub fn infer_intent(text: &str, memory: &ConversationMemory) -> Option<ToolCall> {
    let text = normalize(text);
    let words: Vec<&str> = text.split_whitespace().collect();

    // "... open X ..." anywhere in the sentence
    if let Some(pos) = words
        .iter()
        .position(|w| OPEN_VERBS.contains(w) || CLOSE_VERBS.contains(w))
    {
        let verb = words[pos];
        let rest = words[pos + 1..].join(" ");
        let (clause, _) = first_clause(&rest);
        let target = strip_articles(clause);
        if !target.is_empty() && !is_media(target) {
            let target = if has_reference_word(target) {
                memory.find_reference(target)
            } else {
                Some(target.split_whitespace().take(MAX_TARGET_WORDS).collect::<Vec<_>>().join(" "))
            };
            if let Some(call) = target.and_then(|t| app_intent(verb, &t)).and_then(|i| i.to_call()) {
                return Some(call);
            }
        }
    }

    let info_type = if has_word(&text, "cpu") || has_word(&text, "processor") {
        Some("cpu")
    } else if has_word(&text, "memory") || has_word(&text, "ram") {
        Some("memory")
    } else if has_word(&text, "disk") || has_word(&text, "storage") || has_word(&text, "space") {
        Some("disk")
    } else {
        None
    };
    if let Some(info_type) = info_type {
        return Some(ToolCall::new("get_system_info", Arguments::new()).with_arg("info_type", info_type));
    }

    for (keyword, tool) in [("volume", "control_system_volume"), ("brightness", "control_brightness")] {
        if !has_word(&text, keyword) {
            continue;
        }
        let call = ToolCall::new(tool, Arguments::new());
        if let Some(value) = first_number(&text) {
            return Some(call.with_arg("action", "set").with_arg("value", value.clamp(0, 100)));
        }
        if ["up", "louder", "higher", "increase", "raise", "brighter"].iter().any(|w| has_word(&text, w)) {
            return Some(call.with_arg("action", "increase"));
        }
        if ["down", "quieter", "lower", "decrease", "reduce", "dimmer"].iter().any(|w| has_word(&text, w)) {
            return Some(call.with_arg("action", "decrease"));
        }
        return Some(call.with_arg("action", "get"));
    }

    if has_word(&text, "unmute") {
        return Some(ToolCall::new("control_system_volume", Arguments::new()).with_arg("action", "unmute"));
    }
    if has_word(&text, "mute") {
        return Some(ToolCall::new("control_system_volume", Arguments::new()).with_arg("action", "mute"));
    }

    let media_action = [
        ("pause", "pause"),
        ("resume", "play"),
        ("play", "play"),
        ("next", "next"),
        ("skip", "next"),
        ("previous", "previous"),
        ("stop", "stop"),
    ]
    .into_iter()
    .find(|(word, _)| has_word(&text, word));
    media_action.map(|(_, action)| ToolCall::new("control_media", Arguments::new()).with_arg("action", action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use linvoice_memory::ExchangeMetadata;
    use serde_json::json;

    fn empty() -> ConversationMemory {
        ConversationMemory::default()
    }

    #[test]
    fn open_and_close_take_the_rule_path() {
        assert_eq!(
            classify("Open Firefox.", &empty()),
            Classification::Rule(Intent::OpenApp("firefox".into()))
        );
        assert_eq!(
            classify("please close the file manager", &empty()),
            Classification::Rule(Intent::CloseApp("file manager".into()))
        );
        assert_eq!(
            classify("open youtube", &empty()),
            Classification::Rule(Intent::OpenWebsite("youtube".into()))
        );
    }

    #[test]
    fn questions_and_chatter_go_to_the_llm() {
        for text in [
            "what's my CPU usage",
            "how do I list files",
            "tell me a joke",
            "open",
            "stop the music",
            "open a new tab in firefox please",
            "",
        ] {
            assert_eq!(classify(text, &empty()), Classification::LlmRequired, "{text}");
        }
    }

    #[test]
    fn unknown_targets_never_take_the_rule_path() {
        for text in [
            "run rm -rf /x",
            "run rm -rf /tmp/victim",
            "start sh -c reboot",
            "close a",
            "open my-script.sh",
        ] {
            let result = classify(text, &empty());
            assert!(
                !matches!(result, Classification::Rule(Intent::OpenApp(_) | Intent::CloseApp(_))),
                "{text}: {result:?}"
            );
        }
        assert_eq!(classify("run rm -rf /x", &empty()), Classification::LlmRequired);
        assert_eq!(classify("close a", &empty()), Classification::LlmRequired);
        assert!(infer_intent("please run rm -rf /x", &empty()).is_none());
    }

    #[test]
    fn greetings_are_answered_locally() {
        assert!(matches!(classify("Hello!", &empty()), Classification::Rule(Intent::Greeting(_))));
        assert!(matches!(classify("thanks a lot", &empty()), Classification::Rule(Intent::Greeting(_))));
        assert_eq!(classify("history of linux", &empty()), Classification::LlmRequired);
        assert_eq!(classify("hey open firefox", &empty()), Classification::LlmRequired);
    }

    #[test]
    fn compound_commands_are_ambiguous() {
        assert_eq!(
            classify("open firefox and play some music", &empty()),
            Classification::Ambiguous(Intent::OpenApp("firefox".into()))
        );
    }

    #[test]
    fn pronouns_resolve_through_memory() {
        let mut memory = empty();
        assert_eq!(classify("close it", &memory), Classification::LlmRequired);

        memory.add_exchange(
            "open firefox",
            "Opened firefox",
            ExchangeMetadata::default().with_intent("open_app").with_target("firefox"),
        );
        assert_eq!(
            classify("close it", &memory),
            Classification::Rule(Intent::CloseApp("firefox".into()))
        );
    }

    #[test]
    fn intents_map_to_single_calls() {
        let call = Intent::OpenApp("firefox".into()).to_call().unwrap();
        assert_eq!(call.name, "open_app");
        assert_eq!(call.arguments.get("app_name"), Some(&json!("firefox")));
        assert!(Intent::Greeting("hi").to_call().is_none());
    }

    #[test]
    fn keyword_inference() {
        let memory = empty();
        let call = infer_intent("what's my CPU usage", &memory).unwrap();
        assert_eq!(call.name, "get_system_info");
        assert_eq!(call.arguments.get("info_type"), Some(&json!("cpu")));

        let call = infer_intent("set the volume to 35 percent", &memory).unwrap();
        assert_eq!(call.name, "control_system_volume");
        assert_eq!(call.arguments.get("value"), Some(&json!(35)));

        let call = infer_intent("make the screen brightness lower", &memory).unwrap();
        assert_eq!(call.name, "control_brightness");
        assert_eq!(call.arguments.get("action"), Some(&json!("decrease")));

        let call = infer_intent("could you open the terminal for me", &memory).unwrap();
        assert_eq!(call.arguments.get("app_name"), Some(&json!("terminal")));

        let call = infer_intent("pause", &memory).unwrap();
        assert_eq!(call.name, "control_media");

        let call = infer_intent("stop the music", &memory).unwrap();
        assert_eq!(call.arguments.get("action"), Some(&json!("stop")));

        assert!(infer_intent("tell me a story", &memory).is_none());
    }
}
