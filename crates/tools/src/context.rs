//! Tools that let the assistant write to the persistent user profile.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, str_arg};
use linvoice_memory::SharedUserContext;
use tracing::info;

pub struct SetUserPreferenceTool {
    context: SharedUserContext,
}

impl SetUserPreferenceTool {
    pub fn new(context: SharedUserContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for SetUserPreferenceTool {
    fn name(&self) -> &str {
        "set_user_preference"
    }

    fn description(&self) -> &str {
        "Remember a preference the user states, e.g. 'I prefer concise responses' or 'use Firefox as my browser'"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("category", ParamType::String, "response, app, programming, work…"),
            ToolParameter::required("preference", ParamType::String, "Preference key"),
            ToolParameter::required("value", ParamType::String, "Preference value"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let category = str_arg(&arguments, "category")?;
        let preference = str_arg(&arguments, "preference")?;
        let value = str_arg(&arguments, "value")?;

        let mut context = self.context.lock().await;
        if category == "app" {
            context.set_app_preference(preference, value);
        } else {
            context.set_preference(category, preference, value);
        }
        info!(category = %category, preference = %preference, "Stored user preference");

        Ok(ToolResult::message(format!("I'll remember that you prefer {value} for {preference}"))
            .with("category", category)
            .with("preference", preference)
            .with("value", value))
    }
}

pub struct RememberUserInfoTool {
    context: SharedUserContext,
}

impl RememberUserInfoTool {
    pub fn new(context: SharedUserContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for RememberUserInfoTool {
    fn name(&self) -> &str {
        "remember_user_info"
    }

    fn description(&self) -> &str {
        "Remember a personal detail the user shares: name, location, occupation, timezone"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("info_type", ParamType::String, "name, location, occupation, timezone…"),
            ToolParameter::required("value", ParamType::String, "The information"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let info_type = str_arg(&arguments, "info_type")?;
        let value = str_arg(&arguments, "value")?;

        self.context.lock().await.set_user_info(info_type, value);
        info!(info_type = %info_type, "Stored user info");

        Ok(ToolResult::message(format!("Got it, I'll remember your {info_type}"))
            .with("info_type", info_type)
            .with("value", value))
    }
}

pub struct SetWorkContextTool {
    context: SharedUserContext,
}

impl SetWorkContextTool {
    pub fn new(context: SharedUserContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for SetWorkContextTool {
    fn name(&self) -> &str {
        "set_work_context"
    }

    fn description(&self) -> &str {
        "Remember what the user is working on: current project, directory, language or task"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "context_type",
                ParamType::String,
                "current_project, project_directory, primary_language, task…",
            ),
            ToolParameter::required("value", ParamType::String, "The context value"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let context_type = str_arg(&arguments, "context_type")?;
        let value = str_arg(&arguments, "value")?;

        self.context.lock().await.set_work_context(context_type, value);

        Ok(ToolResult::message(format!("Noted, your {} is {value}", context_type.replace('_', " ")))
            .with("context_type", context_type)
            .with("value", value))
    }
}
