//! Conversation store: the durable history of each conversation key.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use playframe_core::{AiSceneResponse, PlayError, Result};

/// Persists the ordered response history under a conversation key.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<AiSceneResponse>>>;

    /// Replace the history of `key`. `expiration` of `None` uses the store default.
    async fn put(
        &self,
        key: &str,
        history: Vec<AiSceneResponse>,
        expiration: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

struct Entry {
    history: Vec<AiSceneResponse>,
    expires_at: Option<Instant>,
}

/// Process-local store with per-entry expiration.
pub struct InMemoryConversationStore {
    entries: DashMap<String, Entry>,
    default_expiration: Option<Duration>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InMemoryConversationStore {
    /// `default_expiration` of `None` keeps entries until overwritten.
    pub fn new(default_expiration: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            default_expiration,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        before - self.entries.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<AiSceneResponse>>> {
        if cancel.is_cancelled() {
            return Err(PlayError::Cancelled);
        }
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.expires_at {
                Some(at) if at <= Instant::now() => true,
                _ => return Ok(Some(entry.history.clone())),
            },
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        history: Vec<AiSceneResponse>,
        expiration: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PlayError::Cancelled);
        }
        let expires_at = expiration
            .or(self.default_expiration)
            .map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { history, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playframe_core::AiResponseStatus;

    fn history(key: &str) -> Vec<AiSceneResponse> {
        vec![AiSceneResponse::new(key, AiResponseStatus::FinishedNoTool).with_message("hi")]
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryConversationStore::default();
        let cancel = CancellationToken::new();
        store.put("k1", history("k1"), None, &cancel).await.unwrap();
        let got = store.get("k1", &cancel).await.unwrap().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message.as_deref(), Some("hi"));
        assert!(store.get("k2", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_vanish() {
        let store = InMemoryConversationStore::default();
        let cancel = CancellationToken::new();
        store
            .put("k1", history("k1"), Some(Duration::ZERO), &cancel)
            .await
            .unwrap();
        assert!(store.get("k1", &cancel).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryConversationStore::new(Some(Duration::from_secs(3600)));
        let cancel = CancellationToken::new();
        store.put("keep", history("keep"), None, &cancel).await.unwrap();
        store
            .put("drop", history("drop"), Some(Duration::ZERO), &cancel)
            .await
            .unwrap();
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_put_writes_nothing() {
        let store = InMemoryConversationStore::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = store.put("k1", history("k1"), None, &cancel).await;
        assert!(matches!(result, Err(PlayError::Cancelled)));
        assert!(store.is_empty());
    }
}
