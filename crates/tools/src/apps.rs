//! Application launch and shutdown.
//!
//! Spoken names ("terminal", "file manager") map to a list of likely
//! executables; the first one found on `PATH` wins.

use async_trait::async_trait;
use linvoice_core::error::ToolError;
use linvoice_core::tool::{Arguments, ParamType, Tool, ToolParameter, ToolResult, bool_arg, str_arg};
use std::time::Duration;
use tracing::{debug, info};

use crate::process::{on_path, run_bounded, spawn_detached};

const APP_ALIASES: &[(&str, &[&str])] = &[
    ("terminal", &["gnome-terminal", "konsole", "xfce4-terminal", "alacritty", "kitty", "xterm"]),
    ("file manager", &["nautilus", "dolphin", "thunar", "nemo", "pcmanfm"]),
    ("files", &["nautilus", "dolphin", "thunar", "nemo"]),
    ("browser", &["firefox", "google-chrome", "chromium", "brave-browser"]),
    ("chrome", &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]),
    ("firefox", &["firefox", "firefox-esr"]),
    ("code", &["code", "codium", "code-oss"]),
    ("vscode", &["code", "codium", "code-oss"]),
    ("vs code", &["code", "codium", "code-oss"]),
    ("sublime", &["subl", "sublime_text"]),
    ("settings", &["gnome-control-center", "systemsettings", "xfce4-settings-manager"]),
    ("calculator", &["gnome-calculator", "kcalc", "galculator"]),
    ("text editor", &["gedit", "gnome-text-editor", "kate", "mousepad", "xed"]),
    ("music", &["rhythmbox", "spotify", "vlc", "audacious"]),
    ("video", &["vlc", "totem", "mpv", "celluloid"]),
    ("spotify", &["spotify", "flatpak run com.spotify.Client"]),
    ("slack", &["slack", "flatpak run com.slack.Slack"]),
    ("discord", &["discord", "flatpak run com.discordapp.Discord"]),
    ("libreoffice", &["libreoffice", "soffice"]),
    ("writer", &["libreoffice --writer", "soffice --writer"]),
    ("gimp", &["gimp"]),
    ("inkscape", &["inkscape"]),
    ("thunderbird", &["thunderbird"]),
    ("obs", &["obs"]),
    ("obs studio", &["obs"]),
    ("steam", &["steam"]),
    ("telegram", &["telegram-desktop"]),
    ("system monitor", &["gnome-system-monitor", "ksysguard", "xfce4-taskmanager"]),
];

/// Shorter names match too many processes to be worth signalling.
const MIN_APP_NAME_CHARS: usize = 2;

/// Longest name the kernel keeps in `/proc/<pid>/comm`.
const COMM_LEN: usize = 15;

/// One way to start an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Alias-table entry, possibly with arguments.
    Alias(&'static str),
    /// A single executable derived from the spoken name. Never split.
    Executable(String),
}

impl Candidate {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Alias(line) => *line,
            Self::Executable(exe) => exe.as_str(),
        }
    }

    fn argv(&self) -> (&str, Vec<&str>) {
        match self {
            Self::Alias(line) => {
                let mut parts = line.split_whitespace();
                let program = parts.next().unwrap_or_default();
                (program, parts.collect())
            }
            Self::Executable(exe) => (exe.as_str(), Vec::new()),
        }
    }

    /// Name of the process this candidate shows up as.
    fn process_name(&self) -> &str {
        match self {
            Self::Alias(line) => line
                .split_whitespace()
                .find(|p| *p != "flatpak" && *p != "run" && !p.starts_with('-'))
                .unwrap_or_default(),
            Self::Executable(exe) => exe.as_str(),
        }
    }
}

/// A bare program name: letters, digits, `-` and `_`, starting with a letter
/// or digit. No paths, no options, no whitespace.
fn is_plain_executable(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Whether `name` is a spoken app name or executable the alias table knows.
pub fn is_known_app(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    APP_ALIASES
        .iter()
        .any(|(alias, exes)| *alias == name || exes.iter().any(|exe| *exe == name))
}

/// Ways to start a spoken app name, most specific first.
pub fn candidates(app_name: &str) -> Vec<Candidate> {
    let name = app_name.trim().to_lowercase();
    let mut out: Vec<Candidate> = APP_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, exes)| exes.iter().copied().map(Candidate::Alias).collect())
        .unwrap_or_default();

    let derived = [
        name.clone(),
        name.replace(' ', "-"),
        name.replace(' ', "_"),
        format!("gnome-{}", name.replace(' ', "-")),
    ];
    for exe in derived {
        if is_plain_executable(&exe) && !out.iter().any(|c| c.as_str() == exe) {
            out.push(Candidate::Executable(exe));
        }
    }
    out
}

/// `pkill` selectors for one candidate. Matching is on the exact process
/// name; alias executables too long for `comm` also match on argv[0].
fn pkill_selectors(candidate: &Candidate) -> Vec<[String; 2]> {
    let name = candidate.process_name();
    if name.is_empty() {
        return Vec::new();
    }
    let mut selectors = vec![["-x".to_string(), name.to_string()]];
    if matches!(candidate, Candidate::Alias(_)) && name.len() > COMM_LEN {
        selectors.push(["-f".to_string(), format!("^([^ ]*/)?{name}( |$)")]);
    }
    selectors
}

pub struct OpenAppTool;

impl OpenAppTool {
    fn try_launch(candidate: &Candidate) -> bool {
        let (program, args) = candidate.argv();
        if program.is_empty() || !on_path(program) {
            return false;
        }
        match spawn_detached(program, &args) {
            Ok(()) => {
                info!(executable = %candidate.as_str(), "Launched application");
                true
            }
            Err(e) => {
                debug!(executable = %candidate.as_str(), error = %e, "Launch failed");
                false
            }
        }
    }
}

#[async_trait]
impl Tool for OpenAppTool {
    fn name(&self) -> &str {
        "open_app"
    }

    fn description(&self) -> &str {
        "Open or launch an application by name (terminal, firefox, file manager, code, or any installed app)"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "app_name",
            ParamType::String,
            "Application to open, e.g. 'firefox' or 'terminal'",
        )]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let app = str_arg(&arguments, "app_name")?.trim().to_lowercase();
        if app.is_empty() {
            return Err(ToolError::InvalidArguments("app_name is empty".into()));
        }

        let tried = candidates(&app);
        match tried.iter().find(|c| Self::try_launch(c)) {
            Some(exe) => Ok(ToolResult::message(format!("Opened {app}"))
                .with("app", app.as_str())
                .with("executable", exe.as_str())),
            None => Ok(ToolResult::failed(format!(
                "Could not find or launch '{app}'. Make sure it's installed."
            ))
            .with("app", app.as_str())
            .with("tried", tried.iter().take(5).map(|c| c.as_str().to_string()).collect::<Vec<_>>())),
        }
    }
}

pub struct CloseAppTool {
    timeout: Duration,
}

impl CloseAppTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for CloseAppTool {
    fn name(&self) -> &str {
        "close_app"
    }

    fn description(&self) -> &str {
        "Close a running application by name"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("app_name", ParamType::String, "Application to close"),
            ToolParameter::optional("force", ParamType::Bool, "Kill immediately instead of asking it to quit")
                .with_default(false),
        ]
    }

    async fn execute(&self, arguments: Arguments) -> Result<ToolResult, ToolError> {
        let app = str_arg(&arguments, "app_name")?.trim().to_lowercase();
        if app.is_empty() {
            return Err(ToolError::InvalidArguments("app_name is empty".into()));
        }
        if app.chars().count() < MIN_APP_NAME_CHARS {
            return Ok(ToolResult::failed(format!("'{app}' is too short to name an application"))
                .with("app", app.as_str()));
        }
        let signal = if bool_arg(&arguments, "force").unwrap_or(false) { "-KILL" } else { "-TERM" };

        for candidate in candidates(&app) {
            for [mode, pattern] in pkill_selectors(&candidate) {
                let args = [signal, mode.as_str(), pattern.as_str()];
                let out = run_bounded("close_app", "pkill", &args, None, self.timeout).await?;
                if out.success() {
                    info!(app = %app, process = %candidate.process_name(), "Closed application");
                    return Ok(ToolResult::message(format!("Closed {app}")).with("app", app.as_str()));
                }
            }
        }

        Ok(ToolResult::failed(format!("No running process found for '{app}'")).with("app", app.as_str()))
    }
}
