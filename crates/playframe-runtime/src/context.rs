use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use playframe_core::{AiResponseStatus, AiSceneResponse, ConversationKey, PlayError, Result, total_cost};
use playframe_llm::{ChatSession, ClientRegistry};

use crate::actor::ActorInput;
use crate::registry::SceneRegistry;
use crate::settings::RequestSettings;
use crate::summarizer::render_history;

pub(crate) type EventSender = mpsc::Sender<Result<AiSceneResponse>>;

/// Mutable state of one in-flight request.
///
/// Fully built before the first event is emitted and owned by the driver
/// task of that request.
pub struct SceneContext {
    key: ConversationKey,
    message: String,
    pub(crate) settings: RequestSettings,
    history: Vec<AiSceneResponse>,
    responses: Vec<AiSceneResponse>,
    pub(crate) session: ChatSession,
    current_scene: Option<String>,
    summary: Option<String>,
    registry: Arc<SceneRegistry>,
    clients: Arc<ClientRegistry>,
    events: EventSender,
    total_cost: f64,
    pending_cost: f64,
    invoked: HashMap<(String, String), String>,
    scenes_run: usize,
}

impl SceneContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: ConversationKey,
        message: String,
        settings: RequestSettings,
        history: Vec<AiSceneResponse>,
        session: ChatSession,
        registry: Arc<SceneRegistry>,
        clients: Arc<ClientRegistry>,
        events: EventSender,
    ) -> Self {
        let total_cost = total_cost(&history);
        Self {
            key,
            message,
            settings,
            history,
            responses: Vec::new(),
            session,
            current_scene: None,
            summary: None,
            registry,
            clients,
            events,
            total_cost,
            pending_cost: 0.0,
            invoked: HashMap::new(),
            scenes_run: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The user's input for this request.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// History loaded from the store when resuming.
    pub fn history(&self) -> &[AiSceneResponse] {
        &self.history
    }

    /// Events emitted so far by this request.
    pub fn responses(&self) -> &[AiSceneResponse] {
        &self.responses
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn current_scene(&self) -> Option<&str> {
        self.current_scene.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Earlier conversation for a new session: the summary when one was made,
    /// otherwise the rendered resumed history.
    pub fn prior_context(&self) -> Option<String> {
        match self.summary {
            Some(ref summary) => Some(summary.clone()),
            None if self.history.is_empty() => None,
            None => Some(render_history(&self.history)),
        }
    }

    pub fn registry(&self) -> &Arc<SceneRegistry> {
        &self.registry
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Open a fresh chat session on `alias` (default client when `None`).
    pub fn new_session(&self, alias: Option<&str>) -> Result<ChatSession> {
        self.clients.create_session(alias)
    }

    pub(crate) fn set_current_scene(&mut self, scene: Option<String>) {
        self.current_scene = scene;
    }

    pub(crate) fn set_summary(&mut self, summary: String) {
        self.summary = Some(summary);
    }

    pub(crate) fn actor_input(&self) -> ActorInput {
        ActorInput {
            message: self.message.clone(),
            scene: self.current_scene.clone(),
            properties: self.settings.properties.clone(),
        }
    }

    /// Record a model turn's cost; it lands on the next costed event.
    pub(crate) fn defer_cost(&mut self, cost: f64) {
        self.pending_cost += cost;
    }

    pub(crate) fn record_scene_run(&mut self) {
        self.scenes_run += 1;
    }

    pub(crate) fn scenes_run(&self) -> usize {
        self.scenes_run
    }

    /// Earlier successful result of `function` in `scene`, if any.
    pub(crate) fn prior_result(&self, scene: &str, function: &str) -> Option<&str> {
        self.invoked
            .get(&(scene.to_string(), function.to_string()))
            .map(String::as_str)
    }

    pub(crate) fn mark_invoked(&mut self, scene: &str, function: &str, response: String) {
        self.invoked
            .insert((scene.to_string(), function.to_string()), response);
    }

    /// Complete history for the store: resumed events followed by this request's.
    pub(crate) fn full_history(&self) -> Vec<AiSceneResponse> {
        let mut all = self.history.clone();
        all.extend(self.responses.iter().cloned());
        all
    }

    /// Start an event for this request.
    pub(crate) fn event(&self, status: AiResponseStatus) -> AiSceneResponse {
        AiSceneResponse::new(&self.key, status)
    }

    /// Stamp costs and deliver an event to the consumer.
    ///
    /// Skipped calls never carry cost. Every other event absorbs the pending
    /// turn cost. Fails with [`PlayError::Cancelled`] once the consumer is gone.
    pub(crate) async fn emit(&mut self, mut response: AiSceneResponse) -> Result<()> {
        response.request_key = self.key.clone();
        if response.status == AiResponseStatus::ToolSkipped {
            response.cost = None;
        } else if self.pending_cost > 0.0 {
            response.cost = Some(response.cost.unwrap_or(0.0) + self.pending_cost);
            self.pending_cost = 0.0;
        }
        self.total_cost += response.cost.unwrap_or(0.0);
        response.total_cost = self.total_cost;

        debug!(
            key = %self.key,
            status = %response.status,
            scene = response.name.as_deref().unwrap_or("-"),
            function = response.function_name.as_deref().unwrap_or("-"),
            cost = response.cost.unwrap_or(0.0),
            total = response.total_cost,
            "event"
        );

        self.responses.push(response.clone());
        self.events
            .send(Ok(response))
            .await
            .map_err(|_| PlayError::Cancelled)
    }

    /// Put cost still pending on a closing `Running` record carrying `error`,
    /// so the stored history accounts for every billed turn of a failed request.
    pub(crate) async fn settle_cost(&mut self, error: &PlayError) {
        if self.pending_cost <= 0.0 {
            return;
        }
        let record = self
            .event(AiResponseStatus::Running)
            .with_message("request failed after a billed model turn")
            .with_error(error.to_string());
        // Recorded even when the consumer is already gone.
        let _ = self.emit(record).await;
    }

    /// Deliver a fatal error as the last stream item.
    pub(crate) async fn fail(&self, error: PlayError) {
        let _ = self.events.send(Err(error)).await;
    }
}

impl std::fmt::Debug for SceneContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneContext")
            .field("key", &self.key)
            .field("current_scene", &self.current_scene)
            .field("history", &self.history.len())
            .field("responses", &self.responses.len())
            .field("total_cost", &self.total_cost)
            .finish()
    }
}
