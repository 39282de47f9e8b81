use std::collections::HashSet;

use playframe_core::{ContextProperties, ConversationKey};

/// Per-request options, set by the caller through the configurator passed to
/// [`SceneManager::execute`](crate::SceneManager::execute).
#[derive(Debug, Clone, Default)]
pub struct RequestSettings {
    /// Resume this conversation. A fresh key is generated when absent.
    pub key: Option<ConversationKey>,
    /// Scenes the model may not enter. Grows when a director asks for another pass.
    pub avoid_scenes: HashSet<String>,
    /// Neither read nor write the conversation store.
    pub bypass_cache: bool,
    /// Caller context handed to actors.
    pub properties: ContextProperties,
    /// Forwarded as `Authorization: Bearer` on HTTP tool calls.
    pub bearer_token: Option<String>,
}

impl RequestSettings {
    pub fn with_key(mut self, key: impl Into<ConversationKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn avoid(mut self, scene: impl Into<String>) -> Self {
        self.avoid_scenes.insert(scene.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn is_avoided(&self, scene: &str) -> bool {
        self.avoid_scenes.contains(scene)
    }
}
