//! Tool trait: the abstraction over assistant capabilities.
//!
//! Tools are what let the assistant act on the desktop: launch apps, read
//! system stats, drive the media player, fetch pages. Each tool declares a
//! typed parameter list; the [`ToolExecutor`](crate::executor::ToolExecutor)
//! validates and coerces arguments against it before `execute` runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::error::ToolError;

/// Arguments passed to a tool, keyed by parameter name.
pub type Arguments = serde_json::Map<String, Value>;

/// The primitive types a tool parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Value used when the caller omits the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    /// A parameter every call must supply.
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// A parameter the caller may leave out.
    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// The externally visible description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,

    /// Declared parameters, in declaration order.
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Compact signature for prompts, e.g. `open_app(app_name: string)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.required && p.default.is_none() { "" } else { "?" };
                match &p.default {
                    Some(default) => format!("{}{marker}: {} = {default}", p.name, p.param_type),
                    None => format!("{}{marker}: {}", p.name, p.param_type),
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// A structured request to run a tool, usually produced by the call parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,

    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Builder-style argument insertion.
    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// Short label used in conversation metadata, e.g. `open_app(firefox)`.
    pub fn label(&self) -> String {
        let values: Vec<String> = self.arguments.values().map(display_value).collect();
        format!("{}({})", self.name, values.join(", "))
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// The outcome of a tool execution. Failure is encoded here, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default)]
    pub payload: Arguments,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(payload: Arguments) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    /// A successful result carrying a single `message` field.
    pub fn message(text: impl Into<String>) -> Self {
        let mut payload = Arguments::new();
        payload.insert("message".into(), Value::String(text.into()));
        Self::ok(payload)
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Arguments::new(),
            error: Some(error.into()),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// The core Tool trait.
///
/// `execute` receives arguments that have already been validated against
/// [`Tool::parameters`]: required values are present, defaults are filled in,
/// and every value has the declared type. Returning `Err` is equivalent to a
/// failed [`ToolResult`]; the executor wraps it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique, case-sensitive name (e.g. `open_app`).
    fn name(&self) -> &str;

    /// What the tool does, shown to the LLM.
    fn description(&self) -> &str;

    /// Declared parameters, in order.
    fn parameters(&self) -> Vec<ToolParameter>;

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Name → tool mapping that preserves registration order.
///
/// Registering a name that already exists replaces the old tool in its
/// original slot, so schema export order stays stable.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool, returning the tool it replaced, if any.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Option<Box<dyn Tool>> {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                warn!(tool = %name, "Tool registered twice, replacing previous definition");
                Some(std::mem::replace(&mut self.tools[slot], tool))
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    /// Remove a tool by name.
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Tool>> {
        let slot = self.index.remove(name)?;
        let removed = self.tools.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(removed)
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Schemas of every tool, in registration order.
    pub fn all_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Prompt section listing every tool as `- signature - description`.
    pub fn render_reference(&self) -> String {
        self.all_schemas()
            .iter()
            .map(|s| format!("- {} - {}", s.signature(), s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// --- Argument accessors for tool implementations ---

/// Fetch a string argument. Missing values are an argument error.
pub fn str_arg<'a>(arguments: &'a Arguments, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}' argument")))
}

pub fn opt_str_arg<'a>(arguments: &'a Arguments, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

pub fn int_arg(arguments: &Arguments, key: &str) -> Option<i64> {
    arguments.get(key).and_then(Value::as_i64)
}

pub fn bool_arg(arguments: &Arguments, key: &str) -> Option<bool> {
    arguments.get(key).and_then(Value::as_bool)
}

/// Render a JSON value for humans: strings without quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".into(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        name: &'static str,
        description: &'static str,
    }

    impl EchoTool {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                description: "Echoes back the input",
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn parameters(&self) -> Vec<ToolParameter> {
            vec![
                ToolParameter::required("text", ParamType::String, "Text to echo"),
                ToolParameter::optional("times", ParamType::Int, "Repeat count").with_default(1),
            ]
        }
        async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
            let text = str_arg(&arguments, "text")?;
            Ok(ToolResult::message(text))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::named("echo")));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("Echo").is_none());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn schemas_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Box::new(EchoTool::named(name)));
        }
        let names: Vec<String> = registry.all_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_registration_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool::named("first")));
        registry.register(Box::new(EchoTool::named("echo")));
        registry.register(Box::new(EchoTool::named("last")));

        let replaced = registry.register(Box::new(EchoTool {
            name: "echo",
            description: "Second echo",
        }));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["first", "echo", "last"]);
        assert_eq!(registry.get("echo").unwrap().description(), "Second echo");
    }

    #[test]
    fn unregister_keeps_index_consistent() {
        let mut registry = ToolRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(Box::new(EchoTool::named(name)));
        }
        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        assert_eq!(registry.get("c").unwrap().name(), "c");
        assert_eq!(registry.names(), vec!["b", "c"]);
    }

    #[test]
    fn signature_marks_optional_parameters() {
        let schema = EchoTool::named("echo").schema();
        assert_eq!(schema.signature(), "echo(text: string, times?: int = 1)");
    }

    #[test]
    fn call_label_uses_argument_values() {
        let call = ToolCall::new("open_app", Arguments::new()).with_arg("app_name", "firefox");
        assert_eq!(call.label(), "open_app(firefox)");
        assert_eq!(call.to_string(), "open_app(app_name=\"firefox\")");
    }

    #[test]
    fn schema_serializes_type_field() {
        let schema = EchoTool::named("echo").schema();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["parameters"][0]["type"], "string");
        assert_eq!(json["parameters"][1]["default"], 1);
    }
}
