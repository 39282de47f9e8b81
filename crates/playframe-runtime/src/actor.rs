//! Actors contribute system prompts before a model turn.
//!
//! Each actor yields zero or one system message. Actors play sequentially in
//! registration order.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use playframe_core::{ContextProperties, Result};

/// What an actor gets to look at when it plays.
#[derive(Debug, Clone)]
pub struct ActorInput {
    pub message: String,
    /// Scene being entered, `None` at request level.
    pub scene: Option<String>,
    pub properties: ContextProperties,
}

#[async_trait]
pub trait Actor: Send + Sync {
    async fn play(&self, input: &ActorInput) -> Result<Option<String>>;
}

/// Always contributes the same text.
pub struct StaticActor(pub String);

#[async_trait]
impl Actor for StaticActor {
    async fn play(&self, _input: &ActorInput) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Synchronous closure actor.
pub struct FnActor<F>(pub F);

#[async_trait]
impl<F> Actor for FnActor<F>
where
    F: Fn(&ActorInput) -> Option<String> + Send + Sync,
{
    async fn play(&self, input: &ActorInput) -> Result<Option<String>> {
        Ok((self.0)(input))
    }
}

/// Asynchronous closure actor. Receives an owned copy of the input.
pub struct AsyncActor<F>(pub F);

#[async_trait]
impl<F, Fut> Actor for AsyncActor<F>
where
    F: Fn(ActorInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>>> + Send,
{
    async fn play(&self, input: &ActorInput) -> Result<Option<String>> {
        (self.0)(input.clone()).await
    }
}

pub fn static_actor(text: impl Into<String>) -> Arc<dyn Actor> {
    Arc::new(StaticActor(text.into()))
}

pub fn fn_actor<F>(f: F) -> Arc<dyn Actor>
where
    F: Fn(&ActorInput) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(FnActor(f))
}

pub fn async_actor<F, Fut>(f: F) -> Arc<dyn Actor>
where
    F: Fn(ActorInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    Arc::new(AsyncActor(f))
}

/// Play `actors` in order and collect the messages they produce.
pub async fn play_all(actors: &[Arc<dyn Actor>], input: &ActorInput) -> Result<Vec<String>> {
    let mut messages = Vec::new();
    for actor in actors {
        if let Some(text) = actor.play(input).await? {
            if !text.trim().is_empty() {
                messages.push(text);
            }
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ActorInput {
        let mut properties = ContextProperties::new();
        properties.insert("user".into(), serde_json::json!("ada"));
        ActorInput {
            message: "hello".into(),
            scene: Some("Weather".into()),
            properties,
        }
    }

    #[tokio::test]
    async fn test_actors_play_in_order() {
        let actors = vec![
            static_actor("You are helpful."),
            fn_actor(|i: &ActorInput| i.scene.as_ref().map(|s| format!("Scene: {s}"))),
            fn_actor(|_: &ActorInput| None),
            async_actor(|i: ActorInput| async move {
                let user = i.properties.get("user").and_then(|u| u.as_str());
                Ok::<_, playframe_core::PlayError>(user.map(|u| format!("User: {u}")))
            }),
        ];
        let messages = play_all(&actors, &input()).await.unwrap();
        assert_eq!(messages, vec!["You are helpful.", "Scene: Weather", "User: ada"]);
    }

    #[tokio::test]
    async fn test_blank_messages_dropped() {
        let messages = play_all(&[static_actor("  ")], &input()).await.unwrap();
        assert!(messages.is_empty());
    }
}
