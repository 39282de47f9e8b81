use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state carried by every [`AiSceneResponse`].
///
/// `Starting` opens the request and every scene entry. `FinishedOk` and
/// `FinishedNoTool` are terminal: nothing follows them within one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiResponseStatus {
    Starting,
    Planning,
    Summarizing,
    FunctionRequest,
    ToolSkipped,
    Running,
    FinishedOk,
    FinishedNoTool,
}

impl AiResponseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FinishedOk | Self::FinishedNoTool)
    }
}

impl std::fmt::Display for AiResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Planning => "planning",
            Self::Summarizing => "summarizing",
            Self::FunctionRequest => "function_request",
            Self::ToolSkipped => "tool_skipped",
            Self::Running => "running",
            Self::FinishedOk => "finished_ok",
            Self::FinishedNoTool => "finished_no_tool",
        };
        f.write_str(s)
    }
}

/// One append-only event of a conversation.
///
/// The ordered list of these records for a conversation key is its durable history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSceneResponse {
    pub request_key: String,
    /// Scene that produced the event (None for request-level events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub status: AiResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw JSON arguments of a function request, or the user input on the
    /// request-level `Starting` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Raw result of a function request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Set when a function request failed; the failure was reported back to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cost in USD of the model turn that produced this event.
    #[serde(default)]
    pub cost: Option<f64>,
    /// Running total for the conversation key, including resumed history.
    #[serde(default)]
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl AiSceneResponse {
    pub fn new(request_key: impl Into<String>, status: AiResponseStatus) -> Self {
        Self {
            request_key: request_key.into(),
            name: None,
            function_name: None,
            status,
            message: None,
            arguments: None,
            response: None,
            error: None,
            cost: None,
            total_cost: 0.0,
            created_at: Utc::now(),
        }
    }

    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.name = Some(scene.into());
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function_name = Some(function.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_cost(mut self, cost: Option<f64>) -> Self {
        self.cost = cost;
        self
    }
}

/// Sum of all non-null per-event costs.
pub fn total_cost(history: &[AiSceneResponse]) -> f64 {
    history.iter().filter_map(|r| r.cost).sum()
}
