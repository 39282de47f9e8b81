use std::io::Write;
use std::pin::pin;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use playframe_config::PlayConfig;
use playframe_runtime::RequestSettings;

use super::run::{cancel_on_ctrl_c, print_event};

pub(super) async fn cmd_chat(
    config: &PlayConfig,
    settings: RequestSettings,
) -> playframe_core::Result<()> {
    let manager = super::manager(config)?;

    // Every turn shares one key so the store carries the conversation.
    let key = settings
        .key
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    println!("🎬 PlayFrame Interactive Chat");
    println!("   Conversation key: {key}");
    println!("   Type 'exit' or Ctrl+C to quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("\x1b[36myou>\x1b[0m ");
        std::io::stderr().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" {
            println!("👋 Goodbye!");
            break;
        }

        let turn = settings.clone().with_key(key.as_str());
        let mut events = pin!(manager.execute_with(trimmed, turn, cancel_on_ctrl_c()));
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => print_event(&event),
                Err(e) => {
                    println!("\x1b[31m❌ {e}\x1b[0m");
                    break;
                }
            }
        }
        println!();
    }

    Ok(())
}
