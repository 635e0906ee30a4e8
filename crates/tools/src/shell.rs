//! Whitelisted command tool.
//!
//! Runs read-only commands (ls, df, ps…) without a shell: the line is split
//! on whitespace and the first word must be on the allowlist.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, str_arg};
use std::time::Duration;
use tracing::{debug, warn};

use crate::process::{run_bounded, truncate};

/// Output longer than this is cut before it reaches the LLM.
const MAX_OUTPUT_CHARS: usize = 1000;

/// `find` actions that write, delete or run other programs.
const FIND_WRITE_ACTIONS: &[&str] = &["-delete", "-exec", "-execdir", "-ok", "-okdir", "-fls", "-fprint"];

/// The first argument that would make an allowed program modify the system.
fn write_action<'a>(base_cmd: &str, args: &[&'a str]) -> Option<&'a str> {
    match base_cmd {
        "find" => args
            .iter()
            .copied()
            .find(|arg| FIND_WRITE_ACTIONS.iter().any(|action| arg.starts_with(action))),
        _ => None,
    }
}

pub struct ExecuteCommandTool {
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl ExecuteCommandTool {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
        }
    }

    fn is_command_allowed(&self, base_cmd: &str) -> bool {
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Run a safe read-only command such as ls, cat, grep, df or ps and return its output"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "command",
            ParamType::String,
            "Command line to run; the program must be whitelisted",
        )]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let command = str_arg(&arguments, "command")?;
        let parts: Vec<&str> = command.split_whitespace().collect();
        let Some((&base_cmd, args)) = parts.split_first() else {
            return Err(ToolError::InvalidArguments("Empty command".into()));
        };

        if !self.is_command_allowed(base_cmd) {
            warn!(command = %base_cmd, "Command not in allowlist");
            return Err(ToolError::PermissionDenied {
                tool_name: "execute_command".into(),
                reason: format!("'{base_cmd}' is not allowed. Only safe read-only commands are permitted."),
            });
        }

        if let Some(action) = write_action(base_cmd, args) {
            warn!(command = %base_cmd, action = %action, "Write action refused");
            return Err(ToolError::PermissionDenied {
                tool_name: "execute_command".into(),
                reason: format!("'{base_cmd} {action}' can modify files and is not allowed."),
            });
        }

        debug!(command = %command, "Executing whitelisted command");
        let out = run_bounded("execute_command", base_cmd, args, None, self.timeout).await?;

        let (stdout, truncated) = truncate(&out.stdout, MAX_OUTPUT_CHARS);
        let mut result = if out.success() {
            ToolResult::ok(Arguments::new())
        } else {
            warn!(command = %command, exit_code = out.code, "Command failed");
            let (stderr, _) = truncate(&out.stderr, MAX_OUTPUT_CHARS);
            ToolResult::failed(format!("exit code {}: {stderr}", out.code))
        };
        result = result
            .with("command", command)
            .with("stdout", stdout)
            .with("return_code", out.code);
        if truncated {
            result = result.with("truncated", true);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(allowed: &[&str]) -> ExecuteCommandTool {
        ExecuteCommandTool::new(allowed.iter().map(|s| s.to_string()).collect(), Duration::from_secs(5))
    }

    fn args(command: &str) -> Arguments {
        let mut a = Arguments::new();
        a.insert("command".into(), command.into());
        a
    }

    #[test]
    fn allowlist_check() {
        let tool = tool(&["ls", "cat"]);
        assert!(tool.is_command_allowed("ls"));
        assert!(!tool.is_command_allowed("rm"));
        assert!(!tool.is_command_allowed("sudo"));
    }

    #[tokio::test]
    async fn execute_echo() {
        let result = tool(&["echo"]).execute(args("echo hello world")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.get_str("stdout"), Some("hello world"));
    }

    #[tokio::test]
    async fn no_shell_interpretation() {
        let result = tool(&["echo"]).execute(args("echo a; rm -rf /tmp/x")).await.unwrap();
        assert_eq!(result.get_str("stdout"), Some("a; rm -rf /tmp/x"));
    }

    #[tokio::test]
    async fn blocked_command() {
        let result = tool(&["ls"]).execute(args("rm -rf /")).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn find_write_actions_refused() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("keep.txt");
        std::fs::write(&victim, "data").unwrap();

        let root = dir.path().display();
        for line in [
            format!("find {root} -delete"),
            format!("find {root} -name keep.txt -exec rm {{}} ;"),
            format!("find {root} -execdir rm {{}} +"),
            format!("find {root} -fprint0 {root}/out"),
            format!("find {root} -fls {root}/out"),
        ] {
            let result = tool(&["find"]).execute(args(&line)).await;
            assert!(matches!(result, Err(ToolError::PermissionDenied { .. })), "{line}");
        }
        assert!(victim.exists());
    }

    #[tokio::test]
    async fn plain_find_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "").unwrap();
        let line = format!("find {} -name keep.txt", dir.path().display());
        let result = tool(&["find"]).execute(args(&line)).await.unwrap();
        assert!(result.success);
        assert!(result.get_str("stdout").unwrap().ends_with("keep.txt"));
    }

    #[tokio::test]
    async fn empty_command_rejected() {
        let result = tool(&["ls"]).execute(args("   ")).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let long = "x".repeat(3000);
        let result = tool(&["echo"]).execute(args(&format!("echo {long}"))).await.unwrap();
        assert_eq!(result.get_str("stdout").unwrap().len(), MAX_OUTPUT_CHARS);
        assert_eq!(result.get("truncated"), Some(&serde_json::Value::Bool(true)));
    }
}
