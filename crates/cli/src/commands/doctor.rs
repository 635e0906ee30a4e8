//! `linvoice doctor`: diagnose config, LLM reachability and helper programs.

use linvoice_config::AppConfig;
use linvoice_tools::process::on_path;

/// Programs the desktop tools shell out to.
const HELPERS: &[(&str, &str)] = &[
    ("xdg-open", "open_website"),
    ("playerctl", "control_media"),
    ("amixer", "control_system_volume"),
    ("pkill", "close_app"),
    ("df", "get_system_info"),
    ("systemctl", "power_management"),
];

pub async fn run() -> anyhow::Result<()> {
    println!("linvoice doctor");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  [ok]   Config file valid: {}", config_path.display());
                config
            }
            Err(e) => {
                println!("  [fail] Config file invalid: {e}");
                println!("\n  1 issue found. Fix the config and re-run.");
                return Ok(());
            }
        }
    } else {
        println!("  [warn] No config file, using defaults. Run `linvoice onboard`");
        issues += 1;
        AppConfig::default()
    };

    if config.llm.enabled {
        match linvoice_providers::build_from_config(&config.llm) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => {
                    println!("  [ok]   LLM reachable: {} at {}", config.llm.provider, config.llm.base_url);
                    let models = provider.list_models().await.unwrap_or_default();
                    if models.is_empty() || models.iter().any(|m| m == &config.llm.model) {
                        println!("  [ok]   Model: {}", config.llm.model);
                    } else {
                        println!("  [warn] Model '{}' not found. Available: {}", config.llm.model, models.join(", "));
                        issues += 1;
                    }
                }
                Ok(false) | Err(_) => {
                    println!("  [warn] LLM not reachable at {}; only simple commands will work", config.llm.base_url);
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  [fail] LLM provider: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  [ok]   LLM disabled, rules only");
    }

    let context_path = config.user_context.resolved_path();
    if context_path.exists() {
        println!("  [ok]   User context: {}", context_path.display());
    } else {
        println!("  [ok]   User context will be created at {}", context_path.display());
    }

    for (program, tool) in HELPERS {
        if on_path(program) {
            println!("  [ok]   {program} found");
        } else {
            println!("  [warn] {program} not found; {tool} will not work");
            issues += 1;
        }
    }

    for (label, command) in [("stt_command", &config.speech.stt_command), ("tts_command", &config.speech.tts_command)] {
        match command {
            Some(command) => println!("  [ok]   speech.{label}: {command}"),
            None => println!("  [info] speech.{label} not set"),
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
