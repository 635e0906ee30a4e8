//! Media playback through `playerctl` (MPRIS) and master volume through `amixer`.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, int_arg, opt_str_arg, str_arg};
use std::time::Duration;
use tracing::debug;

use crate::process::{CommandOutput, on_path, run_bounded};

pub struct MediaControlTool {
    timeout: Duration,
}

impl MediaControlTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn playerctl(&self, player: Option<&str>, command: &[&str]) -> Result<CommandOutput, ToolError> {
        let mut args: Vec<&str> = Vec::with_capacity(command.len() + 2);
        if let Some(p) = player {
            args.extend(["-p", p]);
        }
        args.extend_from_slice(command);
        run_bounded("control_media", "playerctl", &args, None, self.timeout).await
    }
}

/// `key: value` lines from `playerctl metadata --format`.
pub fn parse_metadata(output: &str) -> Arguments {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().into()))
        .collect()
}

const METADATA_FORMAT: &str = "title: {{title}}\nartist: {{artist}}\nalbum: {{album}}";

#[async_trait]
impl Tool for MediaControlTool {
    fn name(&self) -> &str {
        "control_media"
    }

    fn description(&self) -> &str {
        "Control media playback (Spotify, VLC, browsers): play, pause, play-pause, stop, next, previous, status, info"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("action", ParamType::String, "Playback action"),
            ToolParameter::optional("player", ParamType::String, "Player to control; defaults to the active one"),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let action = str_arg(&arguments, "action")?.to_lowercase();
        let player = opt_str_arg(&arguments, "player");

        if !on_path("playerctl") {
            return Ok(ToolResult::failed("playerctl is not installed"));
        }

        let (command, message): (&[&str], &str) = match action.as_str() {
            "play" | "resume" => (&["play"], "Playback started"),
            "pause" => (&["pause"], "Playback paused"),
            "play-pause" | "toggle" => (&["play-pause"], "Playback toggled"),
            "stop" => (&["stop"], "Playback stopped"),
            "next" | "skip" => (&["next"], "Skipped to next track"),
            "previous" | "prev" | "back" => (&["previous"], "Back to previous track"),
            "status" => (&["status"], ""),
            "info" => (&["metadata", "--format", METADATA_FORMAT], ""),
            other => {
                return Err(ToolError::InvalidArguments(format!("unknown media action '{other}'")));
            }
        };

        debug!(action = %action, player = ?player, "Media control");
        let out = self.playerctl(player, command).await?;
        if !out.success() {
            let reason = if out.stderr.is_empty() { "No media player is running".to_string() } else { out.stderr };
            return Ok(ToolResult::failed(reason));
        }

        let result = match action.as_str() {
            "status" => ToolResult::ok(Arguments::new()).with("status", out.stdout),
            "info" => {
                let mut result = ToolResult::ok(Arguments::new());
                result.payload.insert("now_playing".into(), parse_metadata(&out.stdout).into());
                result
            }
            _ => ToolResult::message(message),
        };
        Ok(result.with("action", action))
    }
}

/// Volume percentage and mute state from `amixer get Master`.
pub fn parse_amixer(output: &str) -> Option<(u8, bool)> {
    let volume = output.lines().find_map(|line| {
        let start = line.find('[')?;
        let rest = &line[start + 1..];
        let end = rest.find("%]")?;
        rest[..end].parse::<u8>().ok()
    })?;
    let muted = output.contains("[off]");
    Some((volume, muted))
}

pub struct SystemVolumeTool {
    timeout: Duration,
}

impl SystemVolumeTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `amixer <verb> Master …`, preferring the PulseAudio device.
    async fn amixer(&self, verb: &str, extra: &[&str]) -> Result<CommandOutput, ToolError> {
        let mut pulse = vec!["-D", "pulse", verb, "Master"];
        pulse.extend_from_slice(extra);
        let out = run_bounded("control_system_volume", "amixer", &pulse, None, self.timeout).await?;
        if out.success() {
            return Ok(out);
        }
        let mut plain = vec![verb, "Master"];
        plain.extend_from_slice(extra);
        run_bounded("control_system_volume", "amixer", &plain, None, self.timeout).await
    }
}

#[async_trait]
impl Tool for SystemVolumeTool {
    fn name(&self) -> &str {
        "control_system_volume"
    }

    fn description(&self) -> &str {
        "Set, raise, lower, read, mute or unmute the system master volume"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("action", ParamType::String, "One of set, increase, decrease, get, mute, unmute"),
            ToolParameter::optional("value", ParamType::Int, "Percentage for set, or step for increase/decrease")
                .with_default(10),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let action = str_arg(&arguments, "action")?.to_lowercase();
        let value = int_arg(&arguments, "value").unwrap_or(10).clamp(0, 100);

        let change = match action.as_str() {
            "get" => None,
            "set" => Some(format!("{value}%")),
            "increase" | "up" => Some(format!("{value}%+")),
            "decrease" | "down" => Some(format!("{value}%-")),
            "mute" => Some("mute".to_string()),
            "unmute" => Some("unmute".to_string()),
            other => {
                return Err(ToolError::InvalidArguments(format!("unknown volume action '{other}'")));
            }
        };

        if let Some(arg) = &change {
            let out = self.amixer("set", &[arg.as_str()]).await?;
            if !out.success() {
                return Ok(ToolResult::failed(format!("amixer failed: {}", out.stderr)));
            }
        }

        let out = self.amixer("get", &[]).await?;
        let Some((volume, muted)) = parse_amixer(&out.stdout) else {
            return Ok(ToolResult::failed("Could not read the current volume"));
        };
        Ok(ToolResult::ok(Arguments::new())
            .with("action", action)
            .with("volume", volume)
            .with("is_muted", muted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_amixer_output() {
        let out = "Simple mixer control 'Master',0\n  Capabilities: pvolume pswitch\n  Front Left: Playback 42598 [65%] [on]\n  Front Right: Playback 42598 [65%] [on]\n";
        assert_eq!(parse_amixer(out), Some((65, false)));

        let muted = "  Mono: Playback 0 [0%] [-inf dB] [off]\n";
        assert_eq!(parse_amixer(muted), Some((0, true)));

        assert_eq!(parse_amixer("amixer: Unable to find simple control"), None);
    }

    #[test]
    fn parses_player_metadata() {
        let meta = parse_metadata("title: Bohemian Rhapsody\nartist: Queen\nalbum: \n");
        assert_eq!(meta.get("title").and_then(|v| v.as_str()), Some("Bohemian Rhapsody"));
        assert_eq!(meta.get("artist").and_then(|v| v.as_str()), Some("Queen"));
        assert!(meta.get("album").is_none());
    }

    #[tokio::test]
    async fn unknown_volume_action_is_rejected() {
        let mut args = Arguments::new();
        args.insert("action".into(), "explode".into());
        args.insert("value".into(), 10.into());
        let err = SystemVolumeTool::new(Duration::from_secs(1)).execute(args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
