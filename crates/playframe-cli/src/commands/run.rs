use std::pin::pin;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use playframe_config::PlayConfig;
use playframe_core::{AiResponseStatus, AiSceneResponse};
use playframe_runtime::RequestSettings;

pub(super) async fn cmd_run(
    config: &PlayConfig,
    message: String,
    settings: RequestSettings,
    json: bool,
) -> playframe_core::Result<()> {
    let manager = super::manager(config)?;
    let cancel = cancel_on_ctrl_c();

    let mut events = pin!(manager.execute_with(message, settings, cancel));
    while let Some(item) = events.next().await {
        let event = item?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }
    }
    Ok(())
}

/// A token cancelled by the first Ctrl+C.
pub(super) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling request");
            token.cancel();
        }
    });
    cancel
}

/// Progress goes to stderr, the final answer to stdout.
pub(super) fn print_event(event: &AiSceneResponse) {
    let scene = event.name.as_deref().unwrap_or("root");
    match event.status {
        AiResponseStatus::Starting => {
            if event.name.is_some() {
                eprintln!("\x1b[36m🎬 {scene}\x1b[0m");
            }
        }
        AiResponseStatus::Planning => {
            eprintln!("\x1b[90m🗺  {}\x1b[0m", event.message.as_deref().unwrap_or("planning"));
        }
        AiResponseStatus::Summarizing => {
            eprintln!("\x1b[90m📝 history summarized\x1b[0m");
        }
        AiResponseStatus::FunctionRequest => {
            let function = event.function_name.as_deref().unwrap_or("?");
            match event.error {
                Some(ref e) => eprintln!("\x1b[31m   🔧 {function} ❌ {}\x1b[0m", truncate(e, 200)),
                None => eprintln!(
                    "\x1b[33m   🔧 {function}\x1b[0m \x1b[90m{}\x1b[0m",
                    truncate(event.response.as_deref().unwrap_or_default(), 200)
                ),
            }
        }
        AiResponseStatus::ToolSkipped => {
            let function = event.function_name.as_deref().unwrap_or("?");
            eprintln!("\x1b[90m   ↺ {function} skipped\x1b[0m");
        }
        AiResponseStatus::Running => {
            if let Some(ref message) = event.message {
                eprintln!("\x1b[90m   {scene}: {}\x1b[0m", truncate(message, 200));
            }
        }
        AiResponseStatus::FinishedOk | AiResponseStatus::FinishedNoTool => {
            println!("{}", event.message.as_deref().unwrap_or_default());
            eprintln!(
                "\x1b[90m[key {} · ${:.4}]\x1b[0m",
                event.request_key, event.total_cost
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line\nbreak", 20), "line break");
        assert_eq!(truncate("héllo world", 5), "héllo...");
    }
}
