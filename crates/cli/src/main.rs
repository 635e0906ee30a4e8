//! linvoice CLI: the main entry point.
//!
//! Commands:
//! - `chat`     Typed turns, interactive or single-message
//! - `listen`   Voice turns; Enter starts one
//! - `tools`    List the built-in tools
//! - `context`  Show or edit the stored user context
//! - `doctor`   Diagnose config, LLM and helper programs
//! - `onboard`  Write the default config

use clap::{Parser, Subcommand};

mod commands;
mod speech;

#[derive(Parser)]
#[command(
    name = "linvoice",
    about = "linvoice: a voice assistant for the Linux desktop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Onboard,

    /// Talk to the assistant by typing
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Voice mode: press Enter to speak
    Listen,

    /// List available tools
    Tools,

    /// Inspect or edit what the assistant remembers about you
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ContextAction {
    /// Print the stored context
    Show {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a preference
    SetPref {
        category: String,
        key: String,
        value: String,
    },

    /// Store a fact about the user (name, location, ...)
    SetInfo { key: String, value: String },

    /// Forget everything
    Clear {
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Listen => commands::listen::run().await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Context { action } => match action {
            ContextAction::Show { json } => commands::context::show(json).await?,
            ContextAction::SetPref { category, key, value } => {
                commands::context::set_pref(&category, &key, &value).await?
            }
            ContextAction::SetInfo { key, value } => commands::context::set_info(&key, &value).await?,
            ContextAction::Clear { confirm } => commands::context::clear(confirm).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
