//! `linvoice chat`: typed turns, interactive or single-message.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let mut router = super::build_router(&config);

    if let Some(msg) = message {
        let outcome = router.handle_turn(&msg).await;
        println!("{}", outcome.reply);
        return Ok(());
    }

    println!();
    println!("  {} (interactive)", config.assistant.name);
    println!("  Provider:  {}", if router.has_provider() { config.llm.provider.as_str() } else { "none (rules only)" });
    println!("  Model:     {}", config.llm.model);
    println!("  Tools:     {}", router.executor().registry().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit, 'clear' to forget this conversation.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                router.memory_mut().clear();
                println!("  (conversation cleared)\n");
                continue;
            }
            _ => {}
        }

        let outcome = router.handle_turn(line).await;
        println!();
        for reply_line in outcome.reply.lines() {
            println!("  {} > {reply_line}", config.assistant.name);
        }
        println!();
    }

    println!("\n  Goodbye!\n");
    Ok(())
}
