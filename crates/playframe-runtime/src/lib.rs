//! # playframe-runtime
//!
//! The scene orchestrator. A request enters the [`SceneManager`], which lets
//! the model (or a planner) pick scenes, runs each scene's tool loop and
//! streams every step back as an [`AiSceneResponse`](playframe_core::AiSceneResponse).
//!
//! ## Architecture
//!
//! ```text
//!              ┌───────────────┐
//!              │ SceneManager  │  ← execute(message, configure, cancel)
//!              └──────┬────────┘
//!                     │ SceneContext (one per request)
//!                     ▼
//!              ┌───────────────┐
//!              │  Root pass    │
//!              │               │
//!              │  1. Resume    │  ← ConversationStore, Summarizer
//!              │  2. Actors    │  ← system prompts
//!              │  3. Choose    │  ← Planner or scene trigger tools
//!              │  4. Scenes    │  ← SceneExecutor tool loop
//!              │  5. Direct    │  ← Director: another pass?
//!              │  6. Finish    │  ← terminal event, history stored
//!              └───────────────┘
//!                     │
//!         ┌───────────┼───────────┐
//!         ▼           ▼           ▼
//!    ┌─────────┐ ┌─────────┐ ┌─────────┐
//!    │ Service │ │  HTTP   │ │  Model  │
//!    │ handlers│ │endpoints│ │ clients │
//!    └─────────┘ └─────────┘ └─────────┘
//! ```

pub mod actor;
pub mod builder;
pub mod cache;
pub mod context;
pub mod director;
pub mod dispatch;
pub mod executor;
pub mod function;
pub mod http;
pub mod manager;
pub mod openapi;
pub mod params;
pub mod planner;
pub mod registry;
pub mod settings;
pub mod summarizer;

pub use actor::{Actor, ActorInput, async_actor, fn_actor, static_actor};
pub use builder::{build_clients, build_registry};
pub use cache::{ConversationStore, InMemoryConversationStore};
pub use context::SceneContext;
pub use director::{Director, DirectorVerdict, LlmDirector, PlanDirector, StopDirector};
pub use function::FunctionRegistration;
pub use http::{HttpClientSpec, HttpEndpoint, HttpInvoker, HttpParam, ParamLocation};
pub use manager::{ManagerOptions, SceneManager, SceneManagerBuilder};
pub use params::{IntoToolOutput, Json, ToolOutput, ToolParam};
pub use planner::{ExecutionPlan, FreeFormPlanner, PlanStep, Planner, SchemaPlanner};
pub use registry::{RegistryBuilder, Scene, SceneBuilder, SceneRegistry};
pub use settings::RequestSettings;
pub use summarizer::{LlmSummarizer, Summarizer};
