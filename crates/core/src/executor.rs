//! Tool executor: validate, coerce, invoke, normalize.
//!
//! `execute` never returns an error. Unknown tools, bad arguments, tool
//! errors and panics all come back as a failed [`ToolResult`].

use futures::FutureExt;
use serde_json::{Number, Value};
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::error::ToolError;
use crate::tool::{Arguments, ParamType, ToolCall, ToolParameter, ToolRegistry, ToolResult, ToolSchema, display_value};

/// Runs tool calls against a registry.
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Execute the named tool with the given arguments.
    pub async fn execute(&self, name: &str, arguments: &Arguments) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = %name, "Requested tool is not registered");
            return ToolResult::failed(format!("unknown tool: {name}"));
        };

        let normalized = match normalize_arguments(&tool.schema(), arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool arguments rejected");
                return ToolResult::failed(e.to_string());
            }
        };

        debug!(tool = %name, "Executing tool");
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(normalized)).catch_unwind().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                debug!(tool = %name, success = result.success, duration_ms, "Tool finished");
                result
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, duration_ms, "Tool failed");
                ToolResult::failed(e.to_string())
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(tool = %name, panic = %detail, "Tool panicked");
                ToolResult::failed(format!("Tool execution failed: {name} panicked: {detail}"))
            }
        }
    }

    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        self.execute(&call.name, &call.arguments).await
    }
}

/// Check `arguments` against `schema`, fill defaults, and coerce types.
///
/// Unknown keys are dropped. `null` counts as absent.
pub fn normalize_arguments(schema: &ToolSchema, arguments: &Arguments) -> Result<Arguments, ToolError> {
    let mut normalized = Arguments::new();
    let mut missing = Vec::new();

    for param in &schema.parameters {
        match arguments.get(&param.name).filter(|v| !v.is_null()) {
            Some(value) => {
                normalized.insert(param.name.clone(), coerce(param, value)?);
            }
            None => match &param.default {
                Some(default) => {
                    normalized.insert(param.name.clone(), default.clone());
                }
                None if param.required => missing.push(param.name.as_str()),
                None => {}
            },
        }
    }

    if !missing.is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "{} is missing required parameter(s): {}",
            schema.name,
            missing.join(", ")
        )));
    }

    let ignored: Vec<&str> = arguments
        .keys()
        .filter(|k| schema.parameter(k).is_none())
        .map(String::as_str)
        .collect();
    if !ignored.is_empty() {
        debug!(tool = %schema.name, ignored = ?ignored, "Ignoring undeclared arguments");
    }

    Ok(normalized)
}

/// `f` as an `i64` when it is a whole number inside the `i64` range.
fn whole_i64(f: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.fract() == 0.0 && (-BOUND..BOUND).contains(&f)).then_some(f as i64)
}

fn coerce(param: &ToolParameter, value: &Value) -> Result<Value, ToolError> {
    let coerced = match param.param_type {
        ParamType::String => Some(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(display_value(other)),
        }),
        ParamType::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(whole_i64))
                .map(Value::from),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_i64))
                    .map(Value::from)
            }
            _ => None,
        },
        ParamType::Float => match value {
            Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        ParamType::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            _ => None,
        },
    };

    coerced.ok_or_else(|| {
        ToolError::InvalidArguments(format!(
            "parameter '{}' expects {}, got {}",
            param.name, param.param_type, value
        ))
    })
}

/// Render a result as plain text for the follow-up LLM prompt.
pub fn format_result_for_llm(result: &ToolResult) -> String {
    if !result.success {
        return format!("Error: {}", result.error.as_deref().unwrap_or("unknown error"));
    }
    if result.payload.is_empty() {
        return "Success".into();
    }
    result
        .payload
        .iter()
        .map(|(k, v)| format!("{k}: {}", display_value(v)))
        .collect::<Vec<_>>()
        .join("\n")
}
