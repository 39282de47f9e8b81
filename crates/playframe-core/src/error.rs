use thiserror::Error;

/// Unified error type for the entire PlayFrame runtime.
#[derive(Error, Debug)]
pub enum PlayError {
    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model client not found: {0}")]
    ClientNotFound(String),

    // ── Planning errors ────────────────────────────────────────
    #[error("planning failed: {0}")]
    Planning(String),

    // ── Scene errors ───────────────────────────────────────────
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    #[error("tool call depth exceeded in scene {scene}: limit {limit}")]
    RecursionLimit { scene: String, limit: usize },

    #[error("registration rejected: {0}")]
    Registration(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("http tool call failed: {tool}: {reason}")]
    Http { tool: String, reason: String },

    // ── Cache errors ───────────────────────────────────────────
    #[error("conversation store error: {0}")]
    Cache(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Control flow ───────────────────────────────────────────
    #[error("request cancelled")]
    Cancelled,

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PlayError {
    /// Argument failures are reported back to the model instead of aborting the request.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, PlayError::InvalidArguments { .. })
    }

    /// Handler failures of a single tool call; the scene continues.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            PlayError::InvalidArguments { .. } | PlayError::ToolExecution { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayError>;
