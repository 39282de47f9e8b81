use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use playframe_core::{PlayError, Result};

use crate::provider::LlmProvider;
use crate::session::ChatSession;

/// Per-client model parameters.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ClientSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

struct ClientEntry {
    provider: Arc<dyn LlmProvider>,
    settings: ClientSettings,
}

/// Named model clients. Scenes refer to a client by alias; everything else
/// runs on the default alias.
///
/// Built once at startup and shared read-only.
pub struct ClientRegistry {
    default_alias: String,
    clients: HashMap<String, ClientEntry>,
}

impl ClientRegistry {
    pub fn new(default_alias: impl Into<String>) -> Self {
        Self {
            default_alias: default_alias.into(),
            clients: HashMap::new(),
        }
    }

    /// Shortcut for a registry holding a single default client.
    pub fn single(provider: Arc<dyn LlmProvider>, settings: ClientSettings) -> Self {
        let mut registry = Self::new("default");
        registry.register("default", provider, settings);
        registry
    }

    /// Register a client under `alias`.
    pub fn register(
        &mut self,
        alias: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        settings: ClientSettings,
    ) {
        let alias = alias.into();
        info!(client = %alias, provider = provider.name(), model = %settings.model, "registered model client");
        self.clients.insert(alias, ClientEntry { provider, settings });
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.clients.contains_key(alias)
    }

    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.clients.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Open a fresh chat session on `alias`, falling back to the default client
    /// when no alias is given or the alias is unknown.
    pub fn create_session(&self, alias: Option<&str>) -> Result<ChatSession> {
        let resolved = match alias {
            Some(a) if self.clients.contains_key(a) => a,
            Some(a) => {
                warn!(client = a, fallback = %self.default_alias, "unknown model client, using default");
                self.default_alias.as_str()
            }
            None => self.default_alias.as_str(),
        };

        let entry = self
            .clients
            .get(resolved)
            .ok_or_else(|| PlayError::ClientNotFound(resolved.to_string()))?;

        Ok(ChatSession::new(
            resolved,
            Arc::clone(&entry.provider),
            entry.settings.clone(),
        ))
    }

    /// Health-check every registered provider.
    pub async fn health_check(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.clients.len());
        for alias in self.aliases() {
            if let Some(entry) = self.clients.get(&alias) {
                results.push((alias, entry.provider.health_check().await));
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn test_create_session_falls_back_to_default() {
        let mut registry = ClientRegistry::new("default");
        registry.register(
            "default",
            Arc::new(MockProvider::new("a")),
            ClientSettings::new("m1"),
        );
        registry.register(
            "fast",
            Arc::new(MockProvider::new("b")),
            ClientSettings::new("m2"),
        );

        assert_eq!(registry.create_session(None).unwrap().alias(), "default");
        assert_eq!(registry.create_session(Some("fast")).unwrap().alias(), "fast");
        assert_eq!(
            registry.create_session(Some("missing")).unwrap().alias(),
            "default"
        );
    }

    #[test]
    fn test_missing_default_is_error() {
        let registry = ClientRegistry::new("default");
        let err = registry.create_session(None).unwrap_err();
        assert!(matches!(err, PlayError::ClientNotFound(_)));
    }
}
