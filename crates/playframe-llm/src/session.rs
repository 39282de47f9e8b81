use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use playframe_core::{Message, PlayError, Result, Role, Tool, ToolChoice};

use crate::client::ClientSettings;
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// The outcome of one model turn.
pub type ChatResult = LlmResponse;

/// A single conversation with one model client.
///
/// Messages and tools accumulate until [`ChatSession::execute`] runs a turn.
/// Tool-call turns are not appended to the transcript: their results are fed
/// back as system messages by the caller.
pub struct ChatSession {
    alias: String,
    provider: Arc<dyn LlmProvider>,
    settings: ClientSettings,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

impl ChatSession {
    pub fn new(
        alias: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            alias: alias.into(),
            provider,
            settings,
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    /// Alias of the client this session runs on.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn add_system_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::text(Role::System, text));
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::text(Role::User, text));
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::text(Role::Assistant, text));
    }

    /// Attach a function tool. A tool with the same name replaces the previous one.
    pub fn add_function_tool(&mut self, tool: Tool) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name == tool.name) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Remove every attached tool and reset the tool choice.
    pub fn clear_tools(&mut self) {
        self.tools.clear();
        self.tool_choice = ToolChoice::Auto;
    }

    pub fn set_tool_choice(&mut self, choice: ToolChoice) {
        self.tool_choice = choice;
    }

    /// Attach `tool` and require the model to call it on the next turn.
    pub fn force_tool(&mut self, tool: Tool) {
        let name = tool.name.clone();
        self.add_function_tool(tool);
        self.tool_choice = ToolChoice::Function(name);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Run one model turn. Aborts with [`PlayError::Cancelled`] when `cancel` fires first.
    pub async fn execute(&mut self, cancel: &CancellationToken) -> Result<ChatResult> {
        let request = LlmRequest {
            model: self.settings.model.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        debug!(
            client = %self.alias,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "executing chat turn"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlayError::Cancelled),
            result = self.provider.complete(&request) => result?,
        };

        if !response.has_tool_calls {
            let text = response.message.text_content();
            if !text.is_empty() {
                self.add_assistant_message(text);
            }
        }
        Ok(response)
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("alias", &self.alias)
            .field("provider", &self.provider.name())
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    fn session(provider: MockProvider) -> ChatSession {
        ChatSession::new("default", Arc::new(provider), ClientSettings::new("mock-model"))
    }

    #[tokio::test]
    async fn test_execute_records_plain_answer() {
        let mut chat = session(MockProvider::new("mock").with_response("Hi there"));
        chat.add_system_message("be brief");
        chat.add_user_message("hello");
        let result = chat.execute(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.message.text_content(), "Hi there");
        assert_eq!(chat.messages().len(), 3);
        assert_eq!(chat.messages()[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_tool_turn_not_appended() {
        let mut chat = session(
            MockProvider::new("mock").with_tool_call("lookup", serde_json::json!({"q": "x"})),
        );
        chat.add_user_message("find x");
        let result = chat.execute(&CancellationToken::new()).await.unwrap();
        assert!(result.has_tool_calls);
        assert_eq!(chat.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_add_function_tool_replaces_same_name() {
        let mut chat = session(MockProvider::new("mock"));
        chat.add_function_tool(Tool::new("a", "first", serde_json::json!({})));
        chat.add_function_tool(Tool::new("a", "second", serde_json::json!({})));
        chat.add_function_tool(Tool::new("b", "other", serde_json::json!({})));
        assert_eq!(chat.tools().len(), 2);
        assert_eq!(chat.tools()[0].description, "second");
        chat.clear_tools();
        assert!(chat.tools().is_empty());
    }

    #[tokio::test]
    async fn test_force_tool_sets_choice() {
        let provider = MockProvider::new("mock").with_response("ok");
        let recorded = provider.recorded_requests();
        let mut chat = session(provider);
        chat.force_tool(Tool::new("plan", "make a plan", serde_json::json!({})));
        chat.execute(&CancellationToken::new()).await.unwrap();
        let recorded = recorded.lock();
        assert_eq!(recorded[0].tool_choice, ToolChoice::Function("plan".into()));
    }

    #[tokio::test]
    async fn test_cancelled_before_turn() {
        let mut chat = session(MockProvider::new("mock").with_response("never"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chat.execute(&cancel).await.unwrap_err();
        assert!(matches!(err, PlayError::Cancelled));
    }
}
