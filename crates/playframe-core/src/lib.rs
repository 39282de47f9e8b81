//! # playframe-core
//!
//! Core types and primitives for the PlayFrame scene orchestrator.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! chat messages, tool schemas and calls, the `AiSceneResponse` event record and
//! the unified error type.

pub mod error;
pub mod message;
pub mod response;
pub mod tool;

pub use error::{PlayError, Result};
pub use message::{Message, MessageContent, Role};
pub use response::{AiResponseStatus, AiSceneResponse, total_cost};
pub use tool::{Tool, ToolCall, ToolChoice};

/// Identifier under which a conversation's history is cached and resumed.
pub type ConversationKey = String;

/// Caller-supplied properties forwarded to actors and tool handlers.
pub type ContextProperties = serde_json::Map<String, serde_json::Value>;
