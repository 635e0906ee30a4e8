//! Shell script tool for multi-step jobs (mkdir, pipelines, git…).
//!
//! Unlike `execute_command` this goes through `sh -c`, so it is guarded
//! twice: a blocklist of destructive patterns, and an allowlist of programs
//! each command segment may start with.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, opt_str_arg, str_arg};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::process::{run_bounded, truncate};

const MAX_OUTPUT_CHARS: usize = 2000;

const ALLOWED_PREFIXES: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "find", "echo", "pwd", "whoami", "date", "df", "du",
    "ps", "free", "mkdir", "touch", "cp", "mv", "cd", "wc", "sort", "uniq", "cut", "awk",
    "sed", "tr", "python", "python3", "pip", "npm", "node", "git", "curl", "wget", "tar",
    "zip", "unzip", "true", "test",
];

pub struct RunScriptTool {
    blocked_patterns: Vec<String>,
    timeout: Duration,
}

impl RunScriptTool {
    pub fn new(blocked_patterns: Vec<String>, timeout: Duration) -> Self {
        Self {
            blocked_patterns,
            timeout,
        }
    }

    /// Reason the script must not run, if any.
    fn check(&self, script: &str) -> Option<String> {
        let lower = script.to_lowercase();
        if let Some(pattern) = self.blocked_patterns.iter().find(|p| lower.contains(&p.to_lowercase())) {
            return Some(format!("script contains blocked pattern '{pattern}'"));
        }

        segments(script)
            .filter_map(|segment| segment.split_whitespace().next())
            .find(|program| !ALLOWED_PREFIXES.contains(program))
            .map(|program| format!("'{program}' is not an allowed script command"))
    }
}

/// Command segments separated by `;`, `&&`, `||`, `|` or newlines.
fn segments(script: &str) -> impl Iterator<Item = &str> {
    script
        .split(['\n', ';', '|', '&'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Tool for RunScriptTool {
    fn name(&self) -> &str {
        "run_script"
    }

    fn description(&self) -> &str {
        "Run a short shell script (create folders, chain commands, git operations)"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("script", ParamType::String, "Shell commands to run"),
            ToolParameter::optional("working_dir", ParamType::String, "Directory to run in (default: home)"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let script = str_arg(&arguments, "script")?;

        if let Some(reason) = self.check(script) {
            warn!(reason = %reason, "Script refused");
            return Err(ToolError::PermissionDenied {
                tool_name: "run_script".into(),
                reason,
            });
        }

        let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"));
        let cwd = opt_str_arg(&arguments, "working_dir")
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .unwrap_or(home);

        info!(cwd = %cwd.display(), "Running script");
        let out = run_bounded("run_script", "sh", &["-c", script], Some(&cwd), self.timeout).await?;

        let combined = if out.stdout.is_empty() { &out.stderr } else { &out.stdout };
        let (output, _) = truncate(combined, MAX_OUTPUT_CHARS);
        let output = if output.is_empty() { "Command executed successfully".to_string() } else { output };

        let result = if out.success() {
            ToolResult::ok(Arguments::new())
        } else {
            ToolResult::failed(format!("script exited with code {}", out.code))
        };
        Ok(result
            .with("output", output)
            .with("return_code", out.code)
            .with("working_dir", cwd.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> RunScriptTool {
        RunScriptTool::new(vec!["rm -rf /".into(), "mkfs".into(), "sudo ".into()], Duration::from_secs(5))
    }

    fn args(script: &str, dir: Option<&std::path::Path>) -> Arguments {
        let mut a = Arguments::new();
        a.insert("script".into(), script.into());
        if let Some(d) = dir {
            a.insert("working_dir".into(), d.display().to_string().into());
        }
        a
    }

    #[test]
    fn blocks_dangerous_patterns() {
        assert!(tool().check("sudo rm -rf /").is_some());
        assert!(tool().check("MKFS.ext4 /dev/sda").is_some());
    }

    #[test]
    fn every_segment_must_be_allowed() {
        assert!(tool().check("mkdir demo && ls demo | wc -l").is_none());
        assert!(tool().check("ls; reboot").unwrap().contains("reboot"));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool().execute(args("mkdir made && ls", Some(dir.path()))).await.unwrap();
        assert!(result.success);
        assert!(dir.path().join("made").is_dir());
        assert_eq!(result.get_str("output"), Some("made"));
    }

    #[tokio::test]
    async fn failing_script_reports_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool().execute(args("ls does-not-exist", Some(dir.path()))).await.unwrap();
        assert!(!result.success);
        assert_ne!(result.get("return_code"), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn refused_script_is_permission_error() {
        let err = tool().execute(args("shutdown now", None)).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
