//! Tool call extraction from free-text LLM output.
//!
//! Recognized call forms, all case-insensitive on the marker:
//!
//! ~~~text
//! TOOL: open_app(app_name="firefox")
//! [CALL: control_media(action="pause")]
//! ```tool
//! get_system_info(info_type="cpu")
//! ```
//! {"tool": "search_web", "params": {"query": "rust"}}
//! ~~~
//!
//! With [`ToolCallParser::with_known_tools`], a bare `name(...)` is also
//! accepted when `name` is a registered tool.
//!
//! Argument grammar (informal):
//! ```text
//! call   = IDENT "(" [arg ("," arg)* [","]] ")"
//! arg    = IDENT ("=" | ":") value
//! value  = QUOTED | NUMBER | "true" | "false" | "null" | "none" | BARE
//! ```
//!
//! Malformed calls are dropped. A call's scan never crosses the next marker,
//! so one broken call cannot swallow the calls after it.

use linvoice_core::tool::{Arguments, ToolCall};
use regex_lite::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

static REASONING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<think>.*?</think>",
        r"(?is)<thinking>.*?</thinking>",
        r"(?is)<reasoning>.*?</reasoning>",
        r"(?is)\[thinking\].*?\[/thinking\]",
        // An unterminated block hides everything after it.
        r"(?is)<(?:think|thinking|reasoning)>.*$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\[\s*)?\b(?:tool|call)\s*:\s*|```[ \t]*tool\b\s*").ok());

static BARE_CALL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").ok());

static FILLER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:(?:okay|ok|sure|alright)[,.!]?|let me\b.*|i will\b.*|i'll\b.*)$").ok());

/// Remove reasoning blocks (`<think>…</think>` and friends).
pub fn strip_reasoning(text: &str) -> String {
    let mut cleaned = text.to_string();
    for re in REASONING.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    // Some models emit only the closing tag.
    if let Some(idx) = cleaned.rfind("</think>") {
        cleaned = cleaned[idx + "</think>".len()..].to_string();
    }
    cleaned.trim().to_string()
}

/// A recognized call and the byte span of its source text.
#[derive(Debug, Clone)]
struct Found {
    start: usize,
    end: usize,
    call: ToolCall,
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallParser {
    known_tools: Option<HashSet<String>>,
}

impl ToolCallParser {
    /// A parser that only accepts marked calls and JSON objects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept unmarked `name(...)` calls for these tool names.
    pub fn with_known_tools<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_tools: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Extract every well-formed call, in order of appearance. Identical
    /// calls are collapsed to the first occurrence.
    pub fn parse(&self, text: &str) -> Vec<ToolCall> {
        let cleaned = strip_reasoning(text);
        let calls: Vec<ToolCall> = self.scan(&cleaned).into_iter().map(|f| f.call).collect();
        if calls.is_empty() {
            trace!("No tool calls in response");
        } else {
            debug!(count = calls.len(), "Parsed tool calls");
        }
        calls
    }

    /// The part of `text` meant for the user: reasoning and call syntax
    /// removed. `None` when nothing useful is left ("okay", "let me check").
    pub fn direct_reply(&self, text: &str) -> Option<String> {
        let cleaned = strip_reasoning(text);
        let found = self.scan(&cleaned);

        let mut remaining = String::with_capacity(cleaned.len());
        let mut cursor = 0;
        for f in &found {
            if f.start >= cursor {
                remaining.push_str(&cleaned[cursor..f.start]);
                remaining.push(' ');
                cursor = f.end;
            }
        }
        remaining.push_str(&cleaned[cursor..]);

        // Drop lines that still hold a marker of a malformed call.
        let kept: Vec<&str> = remaining
            .lines()
            .filter(|line| MARKER.as_ref().is_none_or(|re| !re.is_match(line)))
            .collect();
        let reply = kept.join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        let reply = reply.trim_matches(|c: char| c == '`' || c.is_whitespace()).to_string();

        if reply.is_empty() || FILLER.as_ref().is_some_and(|re| re.is_match(&reply)) {
            return None;
        }
        Some(reply)
    }

    fn scan(&self, text: &str) -> Vec<Found> {
        let mut found = Vec::new();

        let markers: Vec<(usize, usize, bool)> = MARKER
            .as_ref()
            .map(|re| {
                re.find_iter(text)
                    .map(|m| (m.start(), m.end(), m.as_str().starts_with('[')))
                    .collect()
            })
            .unwrap_or_default();

        let mut consumed = 0;
        for (i, &(start, body, bracketed)) in markers.iter().enumerate() {
            if start < consumed {
                // Marker text inside a quoted argument of the previous call.
                continue;
            }
            let next = markers[i + 1..].iter().map(|m| m.0).find(|&s| s > body);
            let Some((call, mut end)) = parse_call_near(text, body, next) else {
                debug!(at = start, "Dropping malformed tool call");
                continue;
            };
            let limit = markers.iter().map(|m| m.0).find(|&s| s >= end).unwrap_or(text.len());
            end = consume_closer(text, end, limit, if bracketed { "]" } else { "```" });
            consumed = end;
            found.push(Found { start, end, call });
        }

        found.extend(parse_json_calls(text));

        if let (Some(known), Some(re)) = (&self.known_tools, BARE_CALL.as_ref()) {
            let covered: Vec<(usize, usize)> = found.iter().map(|f| (f.start, f.end)).collect();
            for caps in re.captures_iter(text) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if !known.contains(name.as_str()) || covered.iter().any(|&(s, e)| whole.start() >= s && whole.start() < e) {
                    continue;
                }
                let next = markers.iter().map(|m| m.0).find(|&s| s > whole.start());
                if let Some((call, end)) = parse_call_near(text, whole.start(), next) {
                    found.push(Found {
                        start: whole.start(),
                        end,
                        call,
                    });
                }
            }
        }

        found.sort_by_key(|f| f.start);
        let mut seen: Vec<ToolCall> = Vec::new();
        found.retain(|f| {
            if seen.contains(&f.call) {
                false
            } else {
                seen.push(f.call.clone());
                true
            }
        });
        found
    }
}

/// Skip whitespace and an optional closing token (`]` or a code fence).
fn consume_closer(text: &str, pos: usize, limit: usize, closer: &str) -> usize {
    let rest = &text[pos..limit];
    let trimmed = rest.trim_start();
    if trimmed.starts_with(closer) {
        pos + (rest.len() - trimmed.len()) + closer.len()
    } else {
        pos
    }
}

/// Character cursor over `text[pos..limit]`.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    limit: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        if self.pos >= self.limit {
            return None;
        }
        self.text[self.pos..self.limit].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let text = self.text;
        Some(&text[start..self.pos])
    }

    fn quoted(&mut self, quote: char) -> Option<String> {
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    /// Unquoted token up to the next top-level `,` or `)`.
    fn bare(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ')' {
                break;
            }
            if c == '(' || c == '"' || c == '\'' {
                return None;
            }
            self.bump();
        }
        let text = self.text;
        let token = text[start..self.pos].trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Parse the call at `pos`. Quoted values may contain marker text, so the
/// whole text is tried first; a call that only closes before the next marker
/// is the fallback.
fn parse_call_near(text: &str, pos: usize, next_marker: Option<usize>) -> Option<(ToolCall, usize)> {
    parse_call(text, pos, text.len()).or_else(|| next_marker.and_then(|limit| parse_call(text, pos, limit)))
}

/// Parse `name(args…)` starting at `pos`, never reading past `limit`.
fn parse_call(text: &str, pos: usize, limit: usize) -> Option<(ToolCall, usize)> {
    let mut cur = Cursor { text, pos, limit };
    let name = cur.ident()?;
    cur.skip_ws();
    if !cur.eat('(') {
        return None;
    }

    let mut arguments = Arguments::new();
    loop {
        cur.skip_ws();
        if cur.eat(')') {
            break;
        }
        let key = cur.ident()?;
        cur.skip_ws();
        if !(cur.eat('=') || cur.eat(':')) {
            return None;
        }
        cur.skip_ws();
        let value = match cur.peek()? {
            q @ ('"' | '\'') => {
                cur.bump();
                Value::String(cur.quoted(q)?)
            }
            _ => literal(cur.bare()?),
        };
        arguments.insert(key.to_string(), value);
        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        if cur.eat(')') {
            break;
        }
        return None;
    }

    Some((ToolCall::new(name, arguments), cur.pos))
}

/// Type a bare token: number, bool, null, or string.
pub fn literal(token: &str) -> Value {
    let lower = token.to_ascii_lowercase();
    match lower.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }

    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    let numeric = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if numeric {
        if let Ok(i) = token.trim_start_matches('+').parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(f) = token.trim_start_matches('+').parse::<f64>() {
            return Value::from(f);
        }
    }
    Value::String(token.to_string())
}

/// Calls written as JSON objects with a `tool` (or `name`/`function`) key.
fn parse_json_calls(text: &str) -> Vec<Found> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(rel) = text[offset..].find('{') {
        let start = offset + rel;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(obj))) => {
                let end = start + stream.byte_offset();
                if let Some(call) = json_call(&obj) {
                    found.push(Found { start, end, call });
                }
                offset = end;
            }
            _ => offset = start + 1,
        }
    }
    found
}

fn json_call(obj: &serde_json::Map<String, Value>) -> Option<ToolCall> {
    let name = ["tool", "name", "function"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
    let arguments = ["params", "parameters", "args", "arguments"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_object))
        .cloned();
    // A bare {"name": …} is too common in ordinary JSON to count.
    if !obj.contains_key("tool") && arguments.is_none() {
        return None;
    }
    Some(ToolCall::new(name, arguments.unwrap_or_default()))
}
