//! Screen brightness through the kernel backlight interface.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, int_arg, str_arg};
use std::path::{Path, PathBuf};
use tracing::debug;

const BACKLIGHT_ROOT: &str = "/sys/class/backlight";

pub struct ControlBrightnessTool {
    root: PathBuf,
}

impl ControlBrightnessTool {
    pub fn new() -> Self {
        Self::with_root(BACKLIGHT_ROOT)
    }

    /// Use a different backlight class directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// First backlight device, preferring `intel_backlight`.
    fn device(&self) -> Option<PathBuf> {
        let mut names: Vec<String> = std::fs::read_dir(&self.root)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let name = names
            .iter()
            .find(|n| *n == "intel_backlight")
            .or_else(|| names.first())?;
        Some(self.root.join(name))
    }
}

impl Default for ControlBrightnessTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_number(path: &Path) -> Result<i64, ToolError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| ToolError::ExecutionFailed {
        tool_name: "control_brightness".into(),
        reason: format!("{}: {e}", path.display()),
    })?;
    raw.trim().parse().map_err(|_| ToolError::ExecutionFailed {
        tool_name: "control_brightness".into(),
        reason: format!("unexpected value in {}", path.display()),
    })
}

#[async_trait]
impl Tool for ControlBrightnessTool {
    fn name(&self) -> &str {
        "control_brightness"
    }

    fn description(&self) -> &str {
        "Read or change the screen brightness (laptop and integrated displays)"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("action", ParamType::String, "One of get, set, increase, decrease"),
            ToolParameter::optional("value", ParamType::Int, "Percentage for set, or step").with_default(10),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let action = str_arg(&arguments, "action")?.to_lowercase();
        let value = int_arg(&arguments, "value").unwrap_or(10);

        let Some(device) = self.device() else {
            return Ok(ToolResult::failed("No backlight device found"));
        };
        let max = read_number(&device.join("max_brightness")).await?.max(1);
        let current = read_number(&device.join("brightness")).await?;
        let percent = current * 100 / max;

        let target = match action.as_str() {
            "get" => {
                return Ok(ToolResult::ok(Arguments::new()).with("brightness", percent));
            }
            "set" => {
                if !(0..=100).contains(&value) {
                    return Err(ToolError::InvalidArguments("brightness must be between 0 and 100".into()));
                }
                value
            }
            "increase" | "up" => (percent + value).min(100),
            "decrease" | "down" => (percent - value).max(0),
            other => {
                return Err(ToolError::InvalidArguments(format!("unknown brightness action '{other}'")));
            }
        };

        let raw = target * max / 100;
        debug!(device = %device.display(), raw, "Writing brightness");
        if let Err(e) = tokio::fs::write(device.join("brightness"), raw.to_string()).await {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                return Err(ToolError::PermissionDenied {
                    tool_name: "control_brightness".into(),
                    reason: "writing the backlight needs a udev rule or root".into(),
                });
            }
            return Ok(ToolResult::failed(e.to_string()));
        }

        Ok(ToolResult::message(format!("Brightness set to {target}%"))
            .with("action", action)
            .with("brightness", target))
    }
}
