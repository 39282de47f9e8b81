//! # playframe-llm
//!
//! The chat-session collaborator the orchestrator talks to. A [`ChatSession`]
//! accumulates system/user messages and function tools and executes one model
//! turn at a time against an [`LlmProvider`]. Providers are looked up by alias
//! in a [`ClientRegistry`], so individual scenes can run on a dedicated model.

pub mod client;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod session;

pub use client::{ClientRegistry, ClientSettings};
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
pub use session::{ChatResult, ChatSession};
