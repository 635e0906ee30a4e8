//! Session and machine power state.
//!
//! Lock and suspend run straight away. Logout, shutdown and reboot end the
//! user's work, so they only run when the call carries `confirmed=true`;
//! without it the tool fails with `requires_confirmation` and the assistant
//! is expected to ask first.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, bool_arg, str_arg};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::process::{on_path, run_bounded};

/// Actions that need an explicit confirmation.
const NEEDS_CONFIRMATION: &[&str] = &["logout", "shutdown", "reboot"];

/// Command lines to try for each action, in order.
const POWER_COMMANDS: &[(&str, &[&[&str]])] = &[
    ("lock", &[&["loginctl", "lock-session"], &["xdg-screensaver", "lock"]]),
    ("suspend", &[&["systemctl", "suspend"], &["loginctl", "suspend"]]),
    ("logout", &[&["loginctl", "terminate-user", "$USER"]]),
    ("shutdown", &[&["systemctl", "poweroff"], &["shutdown", "now"]]),
    ("reboot", &[&["systemctl", "reboot"], &["reboot"]]),
];

fn commands_for(action: &str) -> Option<&'static [&'static [&'static str]]> {
    POWER_COMMANDS
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, commands)| *commands)
}

pub struct PowerManagementTool {
    timeout: Duration,
}

impl PowerManagementTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for PowerManagementTool {
    fn name(&self) -> &str {
        "power_management"
    }

    fn description(&self) -> &str {
        "Lock the screen, suspend, log out, shut down or reboot. Logout, shutdown and reboot need confirmed=true after asking the user"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("action", ParamType::String, "One of lock, suspend, logout, shutdown, reboot"),
            ToolParameter::optional("confirmed", ParamType::Bool, "The user confirmed this action").with_default(false),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let action = str_arg(&arguments, "action")?.trim().to_lowercase();
        let Some(commands) = commands_for(&action) else {
            return Err(ToolError::InvalidArguments(format!(
                "unknown power action '{action}', expected lock, suspend, logout, shutdown or reboot"
            )));
        };

        if NEEDS_CONFIRMATION.contains(&action.as_str()) && !bool_arg(&arguments, "confirmed").unwrap_or(false) {
            info!(action = %action, "Power action awaiting confirmation");
            return Ok(ToolResult::failed(format!(
                "Confirmation required for {action}. Ask the user before calling again with confirmed=true."
            ))
            .with("action", action.as_str())
            .with("requires_confirmation", true));
        }

        let user = std::env::var("USER").unwrap_or_default();
        let mut last_error = String::from("no power command available");
        for command in commands {
            let Some((&program, args)) = command.split_first() else {
                continue;
            };
            if !on_path(program) {
                debug!(program, "Power command not installed");
                continue;
            }
            let args: Vec<&str> = args.iter().map(|a| if *a == "$USER" { user.as_str() } else { *a }).collect();
            let out = run_bounded("power_management", program, &args, None, self.timeout).await?;
            if out.success() {
                info!(action = %action, program, "Power action started");
                return Ok(ToolResult::message(format!("Power action {action} started")).with("action", action.as_str()));
            }
            warn!(action = %action, program, exit_code = out.code, "Power command failed");
            last_error = format!("{program} exited with {}: {}", out.code, out.stderr);
        }

        Ok(ToolResult::failed(format!("Could not {action}: {last_error}")).with("action", action.as_str()))
    }
}
