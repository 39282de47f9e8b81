use async_trait::async_trait;
use playframe_core::{Message, Result, Tool, ToolChoice};
use serde::{Deserialize, Serialize};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use (provider-specific name).
    pub model: String,
    /// Conversation so far, system messages included.
    pub messages: Vec<Message>,
    /// Available function tools.
    pub tools: Vec<Tool>,
    /// Whether the model may, must, or must not call tools.
    pub tool_choice: ToolChoice,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature.
    pub temperature: f32,
}

/// A complete response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Usage,
    /// Whether the model wants tools executed.
    pub has_tool_calls: bool,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    /// Cost of this turn in USD.
    pub fn cost(&self) -> f64 {
        self.usage.estimated_cost_usd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Estimated cost in USD (computed by the provider adapter).
    pub estimated_cost_usd: f64,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.estimated_cost_usd += other.estimated_cost_usd;
    }
}

/// Trait implemented by each LLM backend (OpenAI-compatible, mock, ...).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "openai".
    fn name(&self) -> &str;

    /// List known models.
    fn models(&self) -> Vec<String>;

    /// Send a non-streaming request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is configured / reachable.
    async fn health_check(&self) -> Result<()>;
}
