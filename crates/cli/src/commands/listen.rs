//! `linvoice listen`: voice turns. Each press of Enter is one activation.

use anyhow::Context;
use linvoice_agent::{ActivationQueue, run_turn_loop};
use linvoice_core::speech::Speaker;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::speech::{CommandSpeaker, CommandTranscriber, ConsoleSpeaker};

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    let stt = config
        .speech
        .stt_command
        .clone()
        .context("speech.stt_command is not set; use `linvoice chat` for typed input")?;

    let transcriber = CommandTranscriber::new(stt);
    let speaker: Box<dyn Speaker> = match config.speech.tts_command.clone() {
        Some(command) => Box::new(CommandSpeaker::new(command)),
        None => Box::new(ConsoleSpeaker),
    };
    let mut router = super::build_router(&config);

    let (queue, activations) = ActivationQueue::new();
    let keyboard = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if matches!(line.trim(), "q" | "quit" | "exit") {
                break;
            }
            queue.trigger("keyboard");
        }
    });

    println!("\n  {} is listening. Press Enter to speak, 'q' to quit.\n", config.assistant.name);
    let turns = run_turn_loop(&mut router, activations, &transcriber, speaker.as_ref()).await;
    keyboard.abort();

    info!(turns, "Listen session ended");
    Ok(())
}
