//! # playframe-config
//!
//! Configuration system for the PlayFrame runtime. Reads from `playframe.toml`
//! and environment variables, in that precedence order for explicit values
//! (API keys fall back to the environment).

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::PlayConfig;
pub use schema::{
    CacheConfig, ClientConfig, ConfigWarning, DirectorMode, EndpointConfig, EndpointParamConfig,
    HttpClientConfig, LlmConfig, LoggingConfig, OrchestrationConfig, PlannerMode, SceneConfig,
    WarningSeverity,
};
