use async_trait::async_trait;
use playframe_core::{Message, PlayError, Result, Role, ToolCall, ToolChoice};
use tracing::info;

use crate::provider::*;

/// OpenAI-compatible chat completions provider (OpenAI, Azure, vLLM, Ollama, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL (for Azure, Together, vLLM, etc.)
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    fn build_body(&self, request: &LlmRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    // Tool results are fed back as system text by the orchestrator.
                    Role::Tool => "system",
                };
                serde_json::json!({
                    "role": role,
                    "content": msg.text_content(),
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": messages,
        });

        // Newer OpenAI models (o1, o3, gpt-5, …) require max_completion_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
            body["tool_choice"] = match &request.tool_choice {
                ToolChoice::Auto => serde_json::json!("auto"),
                ToolChoice::None => serde_json::json!("none"),
                ToolChoice::Function(name) => serde_json::json!({
                    "type": "function",
                    "function": { "name": name },
                }),
            };
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec![
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
            "o3".into(),
            "o3-mini".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_body(request);

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlayError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status.as_u16() == 429 {
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                return Err(PlayError::RateLimited { retry_after_secs });
            }
            let text = resp.text().await.unwrap_or_default();
            return Err(PlayError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PlayError::LlmProvider(e.to_string()))?;

        Ok(parse_completion(&request.model, &data))
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = self.provider_name, "checking API health");
        if self.api_key.is_empty() {
            return Err(PlayError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}

/// Map a chat-completions payload to an [`LlmResponse`]. Tool-call arguments stay raw.
fn parse_completion(model: &str, data: &serde_json::Value) -> LlmResponse {
    let choice = &data["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c["id"].as_str()?.to_string(),
                        tool_name: c["function"]["name"].as_str()?.to_string(),
                        arguments: c["function"]["arguments"]
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let has_tool_calls = !tool_calls.is_empty();

    let mut message = Message::text(Role::Assistant, content);
    message.tool_calls = tool_calls;

    let finish_reason = choice["finish_reason"].as_str().unwrap_or("");

    let usage_data = &data["usage"];
    let input_tokens = usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32;
    let output_tokens = usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32;
    let estimated_cost_usd = estimate_openai_cost(model, input_tokens, output_tokens);

    LlmResponse {
        message,
        usage: Usage {
            input_tokens,
            output_tokens,
            estimated_cost_usd,
        },
        has_tool_calls,
        stop_reason: match finish_reason {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ if has_tool_calls => StopReason::ToolUse,
            _ => StopReason::EndTurn,
        },
    }
}

/// Returns true for models that require `max_completion_tokens` instead of `max_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("gpt-5")
        || m.contains("gpt5")
}

fn estimate_openai_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input_per_m, output_per_m) = match model {
        m if m.starts_with("gpt-4o-mini") => (0.15, 0.60),
        m if m.starts_with("gpt-4o") => (2.50, 10.00),
        m if m.starts_with("gpt-4.1-mini") => (0.40, 1.60),
        m if m.starts_with("gpt-4.1") => (2.00, 8.00),
        m if m.starts_with("o3-mini") => (1.10, 4.40),
        m if m.starts_with("o3") => (10.00, 40.00),
        _ => (2.50, 10.00),
    };
    (input_tokens as f64 * input_per_m + output_tokens as f64 * output_per_m) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use playframe_core::Tool;

    #[test]
    fn test_forced_tool_choice_in_body() {
        let provider = OpenAiProvider::new("sk-test".into());
        let request = LlmRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::text(Role::User, "plan this")],
            tools: vec![Tool::new("create_plan", "plan", serde_json::json!({"type": "object"}))],
            tool_choice: ToolChoice::Function("create_plan".into()),
            max_tokens: 100,
            temperature: 0.1,
        };
        let body = provider.build_body(&request);
        assert_eq!(body["tool_choice"]["function"]["name"], "create_plan");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_parse_completion_keeps_raw_arguments() {
        let data = serde_json::json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "Weather", "arguments": "{\"city\":\"Milano\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 1000, "completion_tokens": 100 }
        });
        let resp = parse_completion("gpt-4o-mini", &data);
        assert!(resp.has_tool_calls);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.message.tool_calls[0].arguments, "{\"city\":\"Milano\"}");
        assert!(resp.usage.estimated_cost_usd > 0.0);
    }

    #[test]
    fn test_completion_tokens_switch() {
        assert!(uses_max_completion_tokens("o3-mini"));
        assert!(!uses_max_completion_tokens("gpt-4o"));
    }
}
