//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::provider::*;
use playframe_core::{Message, MessageContent, PlayError, Result, Role, ToolCall};

/// A mock LLM provider that returns pre-configured responses in FIFO order.
///
/// # Example
/// ```
/// use playframe_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
                estimated_cost_usd: 0.001,
            },
            error: None,
        }
    }
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Create an error response.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    /// Create a response calling every `(name, raw_arguments)` pair.
    pub fn tool_calls(calls: &[(&str, &str)]) -> Self {
        Self {
            tool_calls: calls
                .iter()
                .map(|(name, args)| ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4()),
                    tool_name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    /// Override the cost reported for this turn.
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.usage.estimated_cost_usd = cost_usd;
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.with_mock_response(MockResponse::text(text))
    }

    /// Queue a single tool call response with JSON arguments.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        let raw = args.to_string();
        self.with_mock_response(MockResponse::tool_calls(&[(name, raw.as_str())]))
    }

    /// Queue a single tool call whose arguments are sent verbatim (may be malformed JSON).
    pub fn with_raw_tool_call(self, name: &str, raw_args: &str) -> Self {
        self.with_mock_response(MockResponse::tool_calls(&[(name, raw_args)]))
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.with_mock_response(MockResponse::error(error))
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Queue a response directly (for mutable access patterns).
    pub fn queue_response(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Pop the next queued response, or return a default "no response queued" message.
    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(PlayError::LlmProvider(error));
        }

        let mut content = vec![];
        if !mock.text.is_empty() {
            content.push(MessageContent::Text { text: mock.text });
        }

        let has_tool_calls = !mock.tool_calls.is_empty();

        let mut msg = Message::text(Role::Assistant, "");
        msg.content = content;
        msg.tool_calls = mock.tool_calls;

        Ok(LlmResponse {
            message: msg,
            usage: mock.usage,
            has_tool_calls,
            stop_reason: mock.stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playframe_core::ToolChoice;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            messages: vec![],
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&request()).await.unwrap();
        assert_eq!(resp.message.text_content(), "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(!resp.has_tool_calls);
        assert!((resp.cost() - 0.001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let provider =
            MockProvider::new("mock").with_tool_call("weather", serde_json::json!({"city": "Milano"}));
        let resp = provider.complete(&request()).await.unwrap();
        assert!(resp.has_tool_calls);
        assert_eq!(resp.message.tool_calls[0].tool_name, "weather");
        assert_eq!(resp.message.tool_calls[0].arguments, r#"{"city":"Milano"}"#);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
    }

    #[tokio::test]
    async fn test_mock_raw_tool_call_kept_verbatim() {
        let provider = MockProvider::new("mock").with_raw_tool_call("weather", "{not json");
        let resp = provider.complete(&request()).await.unwrap();
        assert_eq!(resp.message.tool_calls[0].arguments, "{not json");
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        let result = provider.complete(&request()).await;
        assert!(matches!(result, Err(PlayError::LlmProvider(_))));
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        let r1 = provider.complete(&request()).await.unwrap();
        let r2 = provider.complete(&request()).await.unwrap();
        let r3 = provider.complete(&request()).await.unwrap();
        assert_eq!(r1.message.text_content(), "first");
        assert_eq!(r2.message.text_content(), "second");
        assert_eq!(r3.message.text_content(), "(mock: no more queued responses)");
        assert_eq!(provider.recorded_requests().lock().len(), 3);
    }
}
