use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Root configuration; maps to `playframe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub llm: LlmConfig,
    pub orchestration: OrchestrationConfig,
    pub cache: CacheConfig,
    pub http_clients: HashMap<String, HttpClientConfig>,
    pub scenes: Vec<SceneConfig>,
    pub logging: LoggingConfig,
}

// ── LLM ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider backing the default client: "openai" or "mock".
    pub provider: String,
    /// Model of the default client, e.g. "gpt-4o-mini".
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// API key. Can also be set via OPENAI_API_KEY environment variable.
    pub api_key: Option<String>,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Additional named clients that scenes can select by alias.
    pub clients: HashMap<String, ClientConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: None,
            api_key: None,
            max_tokens: 4096,
            temperature: 0.2,
            clients: HashMap::new(),
        }
    }
}

/// A named model client. Unset fields inherit from `[llm]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

// ── Orchestration ──────────────────────────────────────────────

/// Which planner runs before scene execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// No planning: the model picks scenes directly.
    #[default]
    None,
    /// Plain prompt, plan parsed from JSON text.
    FreeForm,
    /// Plan read from a forced tool call.
    Schema,
}

/// Which director decides whether to run another pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorMode {
    /// Always stop after one pass.
    #[default]
    None,
    /// Ask the model through a forced review tool.
    Llm,
    /// Ask the schema planner's continuation check.
    Plan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub planner: PlannerMode,
    pub director: DirectorMode,
    /// Maximum consecutive tool-call turns inside one scene.
    pub max_tool_depth: usize,
    /// Maximum director passes per request.
    pub max_passes: usize,
    /// Summarize resumed history when it holds more than this many events. 0 disables.
    pub summarization_threshold: usize,
    /// Timeout for a single HTTP tool call.
    pub http_timeout_secs: u64,
    /// Capacity of the event channel between the orchestrator and its consumer.
    pub event_buffer: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            planner: PlannerMode::None,
            director: DirectorMode::None,
            max_tool_depth: 8,
            max_passes: 3,
            summarization_threshold: 50,
            http_timeout_secs: 30,
            event_buffer: 16,
        }
    }
}

// ── Cache ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist conversation history under the conversation key.
    pub enabled: bool,
    /// Seconds before a cached conversation expires. 0 = never.
    pub expiration_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_secs: 3600,
        }
    }
}

// ── HTTP clients ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Base address that endpoint paths are resolved against.
    pub base_url: String,
    /// Headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Overrides `orchestration.http_timeout_secs` for this client.
    pub timeout_secs: Option<u64>,
}

// ── Scenes ─────────────────────────────────────────────────────

/// A scene declared in config. Its tools are HTTP endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub name: String,
    pub description: String,
    /// Model client alias (see `[llm.clients]`).
    pub client: Option<String>,
    /// HTTP client alias (see `[http_clients]`).
    pub http_client: Option<String>,
    /// Only endpoints whose path starts with one of these are exposed.
    pub api_filters: Vec<String>,
    /// OpenAPI 3 document to import endpoints from.
    pub openapi: Option<PathBuf>,
    /// Endpoints listed inline.
    pub endpoints: Vec<EndpointConfig>,
    /// Static system prompt added when the scene runs.
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub name: String,
    pub description: String,
    pub method: String,
    pub path: String,
    pub params: Vec<EndpointParamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointParamConfig {
    pub name: String,
    /// "path", "query" or "body".
    #[serde(default = "default_location")]
    pub location: String,
    /// JSON schema type: "string", "integer", "number", "boolean", "array", "object".
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_location() -> String {
    "query".into()
}

fn default_param_type() -> String {
    "string".into()
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl PlayConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── LLM ───
        let valid_providers = ["openai", "mock"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            warnings.push(ConfigWarning {
                field: "llm.provider".into(),
                message: format!("unknown provider '{}'", self.llm.provider),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", valid_providers.join(", "))),
            });
        }

        if self.llm.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "llm.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'gpt-4o-mini'".into()),
            });
        }

        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "llm.temperature".into(),
                message: format!("temperature {} is out of range", self.llm.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        if self.llm.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "llm.max_tokens".into(),
                message: "max_tokens is 0: the model won't produce output".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4096".into()),
            });
        }

        for (alias, client) in &self.llm.clients {
            if client.model.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("llm.clients.{alias}.model"),
                    message: "model is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Orchestration ───
        if self.orchestration.max_tool_depth == 0 {
            warnings.push(ConfigWarning {
                field: "orchestration.max_tool_depth".into(),
                message: "max_tool_depth is 0: no tool could ever run".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 8".into()),
            });
        }

        if self.orchestration.max_passes == 0 {
            warnings.push(ConfigWarning {
                field: "orchestration.max_passes".into(),
                message: "max_passes is 0: no scene could ever run".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        }

        if self.orchestration.event_buffer == 0 {
            warnings.push(ConfigWarning {
                field: "orchestration.event_buffer".into(),
                message: "event_buffer must be at least 1".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        if self.orchestration.director != DirectorMode::None
            && self.orchestration.max_passes == 1
        {
            warnings.push(ConfigWarning {
                field: "orchestration.director".into(),
                message: "a director is configured but max_passes is 1".into(),
                severity: WarningSeverity::Info,
                hint: Some("The director can never request another pass".into()),
            });
        }

        // ── Scenes ───
        let mut seen = HashSet::new();
        for (i, scene) in self.scenes.iter().enumerate() {
            if scene.name.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("scenes[{i}].name"),
                    message: "scene name is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            } else if !seen.insert(scene.name.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("scenes[{i}].name"),
                    message: format!("duplicate scene '{}'", scene.name),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }

            if let Some(ref alias) = scene.http_client {
                if !self.http_clients.contains_key(alias) {
                    warnings.push(ConfigWarning {
                        field: format!("scenes[{i}].http_client"),
                        message: format!("unknown http client '{alias}'"),
                        severity: WarningSeverity::Error,
                        hint: Some(format!("Add an [http_clients.{alias}] section")),
                    });
                }
            } else if !scene.endpoints.is_empty() || scene.openapi.is_some() {
                warnings.push(ConfigWarning {
                    field: format!("scenes[{i}].http_client"),
                    message: "scene declares endpoints but no http client".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }

            if let Some(ref alias) = scene.client {
                if alias != "default" && !self.llm.clients.contains_key(alias) {
                    warnings.push(ConfigWarning {
                        field: format!("scenes[{i}].client"),
                        message: format!("unknown model client '{alias}', the default will be used"),
                        severity: WarningSeverity::Warning,
                        hint: Some(format!("Add an [llm.clients.{alias}] section")),
                    });
                }
            }
        }

        for (alias, client) in &self.http_clients {
            if client.base_url.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("http_clients.{alias}.base_url"),
                    message: "base_url is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Set to e.g. 'https://api.example.com'".into()),
                });
            }
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
