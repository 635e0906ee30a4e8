//! Built-in tool implementations for linvoice.
//!
//! Tools give the assistant hands on the desktop: launch and close apps,
//! read system stats, run whitelisted commands and short scripts, browse
//! and search files, search and open the web, drive the media player, volume
//! and backlight, lock or power off the machine, and write to the user's
//! profile.
//!
//! Every tool bounds its own latency; subprocesses are killed when their
//! timeout fires.

pub mod apps;
pub mod context;
pub mod display;
pub mod filesystem;
pub mod media;
pub mod power;
pub mod process;
pub mod script;
pub mod shell;
pub mod system;
pub mod web;

use linvoice_config::ToolsConfig;
use linvoice_core::tool::ToolRegistry;
use linvoice_memory::SharedUserContext;

/// Create a registry holding every built-in tool.
///
/// Security defaults come from `config`:
/// - `execute_command` only runs `allowed_commands`, without a shell
/// - `run_script` refuses `blocked_script_patterns` and unknown programs
/// - file tools never touch ~/.ssh, ~/.gnupg, /etc/shadow and the like
/// - `power_management` only logs out, shuts down or reboots with `confirmed=true`
pub fn default_registry(config: &ToolsConfig, user_context: SharedUserContext) -> ToolRegistry {
    let command_timeout = config.command_timeout();
    let http_timeout = config.http_timeout();

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(apps::OpenAppTool));
    registry.register(Box::new(apps::CloseAppTool::new(command_timeout)));
    registry.register(Box::new(system::GetSystemInfoTool::new(command_timeout)));
    registry.register(Box::new(system::GetProcessesTool));
    registry.register(Box::new(shell::ExecuteCommandTool::new(
        config.allowed_commands.clone(),
        command_timeout,
    )));
    registry.register(Box::new(script::RunScriptTool::new(
        config.blocked_script_patterns.clone(),
        config.script_timeout(),
    )));
    registry.register(Box::new(filesystem::ListFilesTool));
    registry.register(Box::new(filesystem::SearchFilesTool));
    registry.register(Box::new(filesystem::ReadFileTool));
    registry.register(Box::new(web::SearchWebTool::new(http_timeout)));
    registry.register(Box::new(web::FetchUrlTool::new(http_timeout)));
    registry.register(Box::new(web::OpenWebsiteTool::new(command_timeout)));
    registry.register(Box::new(media::MediaControlTool::new(command_timeout)));
    registry.register(Box::new(media::SystemVolumeTool::new(command_timeout)));
    registry.register(Box::new(display::ControlBrightnessTool::new()));
    registry.register(Box::new(power::PowerManagementTool::new(command_timeout)));
    registry.register(Box::new(context::SetUserPreferenceTool::new(user_context.clone())));
    registry.register(Box::new(context::RememberUserInfoTool::new(user_context.clone())));
    registry.register(Box::new(context::SetWorkContextTool::new(user_context)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use linvoice_memory::UserContext;

    #[test]
    fn default_registry_has_every_builtin() {
        let registry = default_registry(&ToolsConfig::default(), UserContext::in_memory().shared());
        assert_eq!(registry.len(), 19);
        for name in [
            "open_app",
            "close_app",
            "get_system_info",
            "get_processes",
            "execute_command",
            "run_script",
            "list_files",
            "search_files",
            "read_file",
            "search_web",
            "fetch_url",
            "open_website",
            "control_media",
            "control_system_volume",
            "control_brightness",
            "power_management",
            "set_user_preference",
            "remember_user_info",
            "set_work_context",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn reference_lists_required_parameters() {
        let registry = default_registry(&ToolsConfig::default(), UserContext::in_memory().shared());
        let reference = registry.render_reference();
        assert!(reference.contains("- open_app(app_name: string) - "));
        assert!(reference.contains("max_lines?: int = 100"));
    }
}
