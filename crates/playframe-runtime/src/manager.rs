//! The scene manager: entry point of every request.
//!
//! A request is driven by a spawned task that owns its [`SceneContext`] and
//! pushes events into a bounded channel; the caller sees them as a stream.
//! Dropping the stream cancels the request at its next suspension point.

use dashmap::DashMap;
use futures::Stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use playframe_core::{AiResponseStatus, AiSceneResponse, PlayError, Result};
use playframe_llm::ClientRegistry;

use crate::actor::play_all;
use crate::cache::{ConversationStore, InMemoryConversationStore};
use crate::context::{EventSender, SceneContext};
use crate::director::{Director, StopDirector};
use crate::executor::SceneExecutor;
use crate::planner::Planner;
use crate::registry::{Scene, SceneRegistry};
use crate::settings::RequestSettings;
use crate::summarizer::Summarizer;

/// Scene name reported when the root tool loop runs too deep.
const ROOT_SCENE: &str = "root";

/// Limits and tuning shared by every request.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Tool-call rounds allowed per session before giving up.
    pub max_tool_depth: usize,
    /// Passes allowed per request when a director asks for more.
    pub max_passes: usize,
    /// Resumed histories longer than this are summarized. 0 disables.
    pub summarization_threshold: usize,
    /// Capacity of the per-request event channel.
    pub event_buffer: usize,
    /// Lifetime of stored conversations. `None` uses the store default.
    pub cache_expiration: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_tool_depth: 8,
            max_passes: 3,
            summarization_threshold: 50,
            event_buffer: 16,
            cache_expiration: Some(Duration::from_secs(3600)),
        }
    }
}

enum PassOutcome {
    /// The root model answered directly.
    Answered(String),
    /// Scenes ran; their answers in order.
    ScenesRan(Vec<String>),
}

struct ManagerInner {
    registry: Arc<SceneRegistry>,
    clients: Arc<ClientRegistry>,
    executor: SceneExecutor,
    store: Option<Arc<dyn ConversationStore>>,
    planner: Option<Arc<dyn Planner>>,
    director: Arc<dyn Director>,
    summarizer: Option<Arc<dyn Summarizer>>,
    options: ManagerOptions,
    key_locks: DashMap<String, Arc<TokioMutex<()>>>,
}

/// Shared handle to the orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct SceneManager {
    inner: Arc<ManagerInner>,
}

pub struct SceneManagerBuilder {
    registry: Arc<SceneRegistry>,
    clients: Arc<ClientRegistry>,
    store: Option<Arc<dyn ConversationStore>>,
    use_default_store: bool,
    planner: Option<Arc<dyn Planner>>,
    director: Arc<dyn Director>,
    summarizer: Option<Arc<dyn Summarizer>>,
    options: ManagerOptions,
}

impl SceneManagerBuilder {
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run without any conversation store; every request starts fresh.
    pub fn without_store(mut self) -> Self {
        self.store = None;
        self.use_default_store = false;
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn director(mut self, director: Arc<dyn Director>) -> Self {
        self.director = director;
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> SceneManager {
        let mut options = self.options;
        options.max_passes = options.max_passes.max(1);
        options.event_buffer = options.event_buffer.max(1);

        let store = match self.store {
            Some(store) => Some(store),
            None if self.use_default_store => Some(Arc::new(InMemoryConversationStore::new(
                options.cache_expiration,
            )) as Arc<dyn ConversationStore>),
            None => None,
        };

        info!(
            scenes = self.registry.len(),
            functions = self.registry.function_count(),
            planner = self.planner.is_some(),
            store = store.is_some(),
            "scene manager ready"
        );

        SceneManager {
            inner: Arc::new(ManagerInner {
                executor: SceneExecutor::new(Arc::clone(&self.registry), options.max_tool_depth),
                registry: self.registry,
                clients: self.clients,
                store,
                planner: self.planner,
                director: self.director,
                summarizer: self.summarizer,
                options,
                key_locks: DashMap::new(),
            }),
        }
    }
}

impl SceneManager {
    /// Start building a manager. Without further configuration it keeps
    /// conversations in memory, runs a single pass and never plans.
    pub fn builder(registry: Arc<SceneRegistry>, clients: Arc<ClientRegistry>) -> SceneManagerBuilder {
        SceneManagerBuilder {
            registry,
            clients,
            store: None,
            use_default_store: true,
            planner: None,
            director: Arc::new(StopDirector),
            summarizer: None,
            options: ManagerOptions::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SceneRegistry> {
        &self.inner.registry
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.inner.clients
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    pub fn store(&self) -> Option<&Arc<dyn ConversationStore>> {
        self.inner.store.as_ref()
    }

    /// Run `message` and stream its events.
    ///
    /// `configure` adjusts the request settings before anything runs. Nothing
    /// happens until the stream is first polled. A fatal error arrives as the
    /// last item.
    pub fn execute<F>(
        &self,
        message: impl Into<String>,
        configure: F,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<AiSceneResponse>> + Send + 'static
    where
        F: FnOnce(&mut RequestSettings),
    {
        let mut settings = RequestSettings::default();
        configure(&mut settings);
        self.execute_with(message, settings, cancel)
    }

    /// Like [`execute`](Self::execute) with ready-made settings.
    pub fn execute_with(
        &self,
        message: impl Into<String>,
        settings: RequestSettings,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<AiSceneResponse>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let message = message.into();

        async_stream::stream! {
            let request_cancel = cancel.child_token();
            let _abort_on_drop = request_cancel.clone().drop_guard();
            let (tx, mut rx) = mpsc::channel(inner.options.event_buffer);
            let driver = tokio::spawn(inner.drive(message, settings, tx, request_cancel));

            while let Some(item) = rx.recv().await {
                yield item;
            }
            if let Err(e) = driver.await {
                error!(error = %e, "request driver failed");
                yield Err(PlayError::Other(anyhow::anyhow!("request driver failed: {e}")));
            }
        }
    }
}

/// Drops the per-key lock entry when no other turn holds or awaits it.
struct KeyLockRelease<'a> {
    locks: &'a DashMap<String, Arc<TokioMutex<()>>>,
    key: String,
}

impl Drop for KeyLockRelease<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 1);
    }
}

impl ManagerInner {
    async fn drive(
        self: Arc<Self>,
        message: String,
        settings: RequestSettings,
        tx: EventSender,
        cancel: CancellationToken,
    ) {
        let resuming = settings.key.is_some();
        let key = settings
            .key
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // One turn at a time per conversation key. Declared before the lock so
        // it drops last, once this turn's clone and guard are gone.
        let _release = KeyLockRelease {
            locks: &self.key_locks,
            key: key.clone(),
        };
        let lock = Arc::clone(&*self.key_locks.entry(key.clone()).or_default());
        let turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.send(Err(PlayError::Cancelled)).await;
                return;
            }
            guard = lock.lock() => guard,
        };

        let caching = self.store.is_some() && !settings.bypass_cache;
        let history = if caching && resuming {
            self.load_history(&key, &cancel).await
        } else {
            Vec::new()
        };

        let session = match self.clients.create_session(None) {
            Ok(session) => session,
            Err(e) => {
                error!(key = %key, error = %e, "no default model client");
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let mut ctx = SceneContext::new(
            key.clone(),
            message,
            settings,
            history,
            session,
            Arc::clone(&self.registry),
            Arc::clone(&self.clients),
            tx,
        );

        match self.run(&mut ctx, &cancel).await {
            Ok(()) => {
                if caching {
                    self.save_history(&ctx, &cancel).await;
                }
                info!(key = %key, total_cost = ctx.total_cost(), "request finished");
            }
            Err(PlayError::Cancelled) => {
                info!(key = %key, "request cancelled, history not written");
                ctx.fail(PlayError::Cancelled).await;
            }
            Err(e) => {
                error!(key = %key, error = %e, "request failed");
                ctx.settle_cost(&e).await;
                if caching {
                    self.save_history(&ctx, &cancel).await;
                }
                ctx.fail(e).await;
            }
        }

        drop(turn);
    }

    async fn load_history(&self, key: &str, cancel: &CancellationToken) -> Vec<AiSceneResponse> {
        let Some(ref store) = self.store else {
            return Vec::new();
        };
        match store.get(key, cancel).await {
            Ok(Some(history)) => {
                debug!(key, events = history.len(), "resuming conversation");
                history
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "failed to load conversation, starting fresh");
                Vec::new()
            }
        }
    }

    async fn save_history(&self, ctx: &SceneContext, cancel: &CancellationToken) {
        let Some(ref store) = self.store else {
            return;
        };
        let history = ctx.full_history();
        let events = history.len();
        match store
            .put(ctx.key(), history, self.options.cache_expiration, cancel)
            .await
        {
            Ok(()) => debug!(key = %ctx.key(), events, "conversation stored"),
            Err(e) => warn!(key = %ctx.key(), error = %e, "failed to store conversation"),
        }
    }

    async fn run(&self, ctx: &mut SceneContext, cancel: &CancellationToken) -> Result<()> {
        let start = ctx
            .event(AiResponseStatus::Starting)
            .with_message("request received")
            .with_arguments(ctx.message());
        ctx.emit(start).await?;
        info!(
            key = %ctx.key(),
            scenes = self.registry.len(),
            resumed_events = ctx.history().len(),
            "request started"
        );

        let input = ctx.actor_input();
        for text in play_all(self.registry.global_actors(), &input).await? {
            ctx.session.add_system_message(text);
        }
        for text in play_all(self.registry.request_actors(), &input).await? {
            ctx.session.add_system_message(text);
        }

        if !ctx.history().is_empty() {
            self.summarize_if_needed(ctx, cancel).await?;
            if let Some(prior) = ctx.prior_context() {
                ctx.session
                    .add_system_message(format!("Conversation so far:\n{prior}"));
            }
        }
        let message = ctx.message().to_string();
        ctx.session.add_user_message(message);

        if self.registry.is_empty() {
            let answer = self.plain_turn(ctx, cancel).await?;
            return self.finish(ctx, answer).await;
        }

        let mut answers = Vec::new();
        for pass in 1..=self.options.max_passes {
            debug!(key = %ctx.key(), pass, "starting pass");
            let outcome = match self.planner {
                Some(ref planner) => self.planned_pass(planner.as_ref(), ctx, cancel).await?,
                None => self.model_pass(ctx, cancel).await?,
            };
            match outcome {
                PassOutcome::Answered(text) => return self.finish(ctx, text).await,
                PassOutcome::ScenesRan(texts) => answers = texts,
            }

            if pass == self.options.max_passes {
                debug!(key = %ctx.key(), pass, "pass limit reached");
                break;
            }
            let verdict = self.director.direct(ctx, cancel).await?;
            if !verdict.execute_again {
                break;
            }
            info!(
                key = %ctx.key(),
                pass,
                cut = ?verdict.cut_scenes,
                reasoning = %verdict.reasoning,
                "running another pass"
            );
            ctx.settings.avoid_scenes.extend(verdict.cut_scenes);
        }

        self.finish(ctx, answers.join("\n\n")).await
    }

    async fn summarize_if_needed(&self, ctx: &mut SceneContext, cancel: &CancellationToken) -> Result<()> {
        let threshold = self.options.summarization_threshold;
        let Some(ref summarizer) = self.summarizer else {
            return Ok(());
        };
        if threshold == 0 || ctx.history().len() <= threshold {
            return Ok(());
        }

        let history = ctx.history().to_vec();
        let summary = summarizer.summarize(ctx, &history, cancel).await?;
        ctx.set_summary(summary.clone());
        let event = ctx
            .event(AiResponseStatus::Summarizing)
            .with_message(summary);
        ctx.emit(event).await
    }

    /// One root turn without tools.
    async fn plain_turn(&self, ctx: &mut SceneContext, cancel: &CancellationToken) -> Result<String> {
        ctx.session.clear_tools();
        let turn = ctx.session.execute(cancel).await?;
        ctx.defer_cost(turn.cost());
        Ok(turn.message.text_content())
    }

    async fn finish(&self, ctx: &mut SceneContext, answer: String) -> Result<()> {
        let status = if ctx.scenes_run() == 0 {
            AiResponseStatus::FinishedNoTool
        } else {
            AiResponseStatus::FinishedOk
        };
        let event = ctx.event(status).with_message(answer);
        ctx.emit(event).await
    }

    fn available_scenes(&self, ctx: &SceneContext) -> Vec<Arc<Scene>> {
        self.registry
            .scenes()
            .filter(|s| !ctx.settings().is_avoided(s.name()))
            .cloned()
            .collect()
    }

    /// The root model picks scenes through their trigger tools.
    async fn model_pass(&self, ctx: &mut SceneContext, cancel: &CancellationToken) -> Result<PassOutcome> {
        let available = self.available_scenes(ctx);
        if available.is_empty() {
            return Ok(PassOutcome::Answered(self.plain_turn(ctx, cancel).await?));
        }

        ctx.session.clear_tools();
        for scene in &available {
            ctx.session.add_function_tool(scene.trigger_tool());
        }

        for _ in 0..self.options.max_tool_depth {
            let turn = ctx.session.execute(cancel).await?;
            ctx.defer_cost(turn.cost());
            if !turn.has_tool_calls {
                return Ok(PassOutcome::Answered(turn.message.text_content()));
            }

            let mut answers = Vec::new();
            let mut entered = HashSet::new();
            for call in &turn.message.tool_calls {
                let scene = match self.registry.scene_by_trigger(&call.tool_name) {
                    Some(scene) if !ctx.settings().is_avoided(scene.name()) => Arc::clone(scene),
                    _ => {
                        warn!(key = %ctx.key(), tool = %call.tool_name, "model called an unavailable scene");
                        ctx.session
                            .add_system_message(format!("Function {} is not available.", call.tool_name));
                        continue;
                    }
                };
                if !entered.insert(scene.name().to_string()) {
                    let skipped = ctx
                        .event(AiResponseStatus::ToolSkipped)
                        .with_scene(scene.name())
                        .with_function(scene.trigger_name())
                        .with_message(format!(
                            "scene {} was already entered in this turn; duplicate call skipped at no cost",
                            scene.name()
                        ));
                    ctx.emit(skipped).await?;
                    continue;
                }

                let answer = self.executor.run_scene(&scene, None, ctx, cancel).await?;
                ctx.session.add_system_message(format!(
                    "Response for function {}: {answer}",
                    scene.trigger_name()
                ));
                answers.push(answer);
            }

            if !answers.is_empty() {
                return Ok(PassOutcome::ScenesRan(answers));
            }
        }

        warn!(key = %ctx.key(), limit = self.options.max_tool_depth, "root tool loop exceeded depth");
        Err(PlayError::RecursionLimit {
            scene: ROOT_SCENE.to_string(),
            limit: self.options.max_tool_depth,
        })
    }

    /// A planner picks scenes; an unusable plan falls back to [`Self::model_pass`].
    async fn planned_pass(
        &self,
        planner: &dyn Planner,
        ctx: &mut SceneContext,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome> {
        let plan = planner.create_plan(ctx, cancel).await?;
        ctx.defer_cost(plan.cost);

        let summary = if plan.is_valid {
            plan.reasoning.clone()
        } else {
            format!("plan rejected: {}", plan.reasoning)
        };
        let planning = ctx
            .event(AiResponseStatus::Planning)
            .with_message(summary)
            .with_response(serde_json::to_string(&plan)?);
        ctx.emit(planning).await?;

        if !plan.is_valid {
            info!(key = %ctx.key(), reason = %plan.reasoning, "plan unusable, letting the model choose scenes");
            return self.model_pass(ctx, cancel).await;
        }
        if plan.steps.is_empty() {
            debug!(key = %ctx.key(), "plan needs no scenes");
            return Ok(PassOutcome::Answered(self.plain_turn(ctx, cancel).await?));
        }

        let mut answers = Vec::new();
        let mut entered = HashSet::new();
        for step in &plan.steps {
            let Some(scene) = self.registry.scene(&step.scene_name).cloned() else {
                continue;
            };
            if ctx.settings().is_avoided(scene.name()) || !entered.insert(scene.name().to_string()) {
                continue;
            }
            let answer = self.executor.run_scene(&scene, Some(step), ctx, cancel).await?;
            ctx.session.add_system_message(format!(
                "Response for function {}: {answer}",
                scene.trigger_name()
            ));
            answers.push(answer);
        }

        if answers.is_empty() {
            return self.model_pass(ctx, cancel).await;
        }
        Ok(PassOutcome::ScenesRan(answers))
    }
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("registry", &self.inner.registry)
            .field("options", &self.inner.options)
            .field("planner", &self.inner.planner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use playframe_llm::{ClientSettings, MockProvider};

    use crate::registry::RegistryBuilder;

    fn manager(clients: ClientRegistry) -> SceneManager {
        let registry = Arc::new(RegistryBuilder::new().build().unwrap());
        SceneManager::builder(registry, Arc::new(clients)).build()
    }

    #[tokio::test]
    async fn test_key_lock_released_when_session_fails() {
        // No default client, so every request fails before it starts.
        let m = manager(ClientRegistry::new("default"));
        for key in [None, Some("fixed")] {
            let items: Vec<_> = m
                .execute("hi", |s| s.key = key.map(str::to_string), CancellationToken::new())
                .collect()
                .await;
            assert!(matches!(items.as_slice(), [Err(PlayError::ClientNotFound(_))]));
        }
        assert!(m.inner.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_key_lock_released_after_cancel_and_success() {
        let provider = Arc::new(MockProvider::new("mock").with_response("hello"));
        let m = manager(ClientRegistry::single(provider, ClientSettings::new("mock-model")));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let items: Vec<_> = m.execute("hi", |_| {}, cancel).collect().await;
        assert!(matches!(items.as_slice(), [Err(PlayError::Cancelled)]));

        let items: Vec<_> = m
            .execute("hi", |s| s.key = Some("k".into()), CancellationToken::new())
            .collect()
            .await;
        assert!(items.iter().all(Result::is_ok));
        assert!(m.inner.key_locks.is_empty());
    }
}
