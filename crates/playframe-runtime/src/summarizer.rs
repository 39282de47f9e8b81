//! Condenses a long resumed history into a short summary.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use playframe_core::{AiResponseStatus, AiSceneResponse, PlayError, Result};

use crate::context::SceneContext;

/// Characters of rendered history kept when summarization falls back to truncation.
const FALLBACK_TAIL_CHARS: usize = 4000;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        ctx: &SceneContext,
        history: &[AiSceneResponse],
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Summarizes with a model client.
///
/// A failed summary call falls back to the tail of the rendered history.
pub struct LlmSummarizer {
    client: Option<String>,
}

impl LlmSummarizer {
    pub fn new(client: Option<String>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        ctx: &SceneContext,
        history: &[AiSceneResponse],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let rendered = render_history(history);
        let mut session = ctx.new_session(self.client.as_deref())?;
        session.add_system_message(
            "You are a precise conversation summarizer. Output only the summary, nothing else.",
        );
        session.add_user_message(format!(
            "Summarize this conversation between a user and an assistant that calls functions. \
             Preserve: facts the user gave, function results, and open questions. \
             Keep the summary under 300 words.\n\nConversation:\n{rendered}"
        ));

        match session.execute(cancel).await {
            Ok(result) => {
                info!(
                    key = %ctx.key(),
                    events = history.len(),
                    cost = result.cost(),
                    "history summarized"
                );
                let text = result.message.text_content();
                if text.trim().is_empty() {
                    Ok(truncate_tail(&rendered, FALLBACK_TAIL_CHARS))
                } else {
                    Ok(text)
                }
            }
            Err(PlayError::Cancelled) => Err(PlayError::Cancelled),
            Err(e) => {
                warn!(error = %e, "summarization failed, falling back to truncated history");
                Ok(truncate_tail(&rendered, FALLBACK_TAIL_CHARS))
            }
        }
    }
}

/// Plain-text transcript of a stored history.
pub fn render_history(history: &[AiSceneResponse]) -> String {
    let mut lines = Vec::new();
    for r in history {
        let scene = r.name.as_deref().unwrap_or("-");
        match r.status {
            AiResponseStatus::Starting if r.name.is_none() => {
                if let Some(ref input) = r.arguments {
                    lines.push(format!("User: {input}"));
                }
            }
            AiResponseStatus::FunctionRequest => {
                let function = r.function_name.as_deref().unwrap_or("?");
                let args = r.arguments.as_deref().unwrap_or("{}");
                let outcome = match (&r.error, &r.response) {
                    (Some(e), _) => format!("error: {e}"),
                    (None, Some(resp)) => resp.clone(),
                    (None, None) => String::new(),
                };
                lines.push(format!("Function {scene}.{function}({args}) -> {outcome}"));
            }
            AiResponseStatus::Running => {
                if let Some(ref m) = r.message {
                    lines.push(format!("Scene {scene}: {m}"));
                }
            }
            AiResponseStatus::FinishedOk | AiResponseStatus::FinishedNoTool => {
                if let Some(ref m) = r.message {
                    lines.push(format!("Assistant: {m}"));
                }
            }
            AiResponseStatus::Summarizing => {
                if let Some(ref m) = r.message {
                    lines.push(format!("Earlier summary: {m}"));
                }
            }
            _ => {}
        }
    }
    lines.join("\n")
}

fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_history() {
        let history = vec![
            AiSceneResponse::new("k", AiResponseStatus::Starting).with_arguments("weather in Rome?"),
            AiSceneResponse::new("k", AiResponseStatus::Starting).with_scene("Weather"),
            AiSceneResponse::new("k", AiResponseStatus::FunctionRequest)
                .with_scene("Weather")
                .with_function("Weather_Current")
                .with_arguments(r#"{"city":"Rome"}"#)
                .with_response("sunny"),
            AiSceneResponse::new("k", AiResponseStatus::FinishedOk).with_message("It is sunny."),
        ];
        let text = render_history(&history);
        assert_eq!(
            text,
            "User: weather in Rome?\n\
             Function Weather.Weather_Current({\"city\":\"Rome\"}) -> sunny\n\
             Assistant: It is sunny."
        );
    }

    #[test]
    fn test_truncate_tail() {
        assert_eq!(truncate_tail("abcdef", 10), "abcdef");
        assert_eq!(truncate_tail("abcdef", 3), "...def");
    }
}
