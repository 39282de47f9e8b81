//! Runs one scene: a fresh chat session, the scene's tools, and the tool loop
//! until the model answers in plain text.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playframe_core::{AiResponseStatus, PlayError, Result, ToolCall};

use crate::actor::play_all;
use crate::context::SceneContext;
use crate::dispatch::{DispatchOutcome, ToolDispatcher};
use crate::planner::PlanStep;
use crate::registry::{Scene, SceneRegistry};

pub struct SceneExecutor {
    registry: Arc<SceneRegistry>,
    dispatcher: ToolDispatcher,
    max_tool_depth: usize,
}

impl SceneExecutor {
    pub fn new(registry: Arc<SceneRegistry>, max_tool_depth: usize) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(Arc::clone(&registry)),
            registry,
            max_tool_depth,
        }
    }

    pub fn max_tool_depth(&self) -> usize {
        self.max_tool_depth
    }

    /// Run `scene` for the request in `ctx` and return its final answer.
    ///
    /// The request's root session is set aside while the scene runs and
    /// restored afterwards, whatever the outcome.
    pub async fn run_scene(
        &self,
        scene: &Scene,
        step: Option<&PlanStep>,
        ctx: &mut SceneContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        info!(key = %ctx.key(), scene = %scene.name(), "entering scene");
        ctx.set_current_scene(Some(scene.name().to_string()));
        ctx.record_scene_run();

        let started = ctx
            .event(AiResponseStatus::Starting)
            .with_scene(scene.name())
            .with_message(format!("entering scene {}", scene.name()));
        ctx.emit(started).await?;

        let session = ctx.new_session(scene.client())?;
        let root = std::mem::replace(&mut ctx.session, session);
        let result = self.drive(scene, step, ctx, cancel).await;
        ctx.session = root;
        ctx.set_current_scene(None);
        result
    }

    async fn drive(
        &self,
        scene: &Scene,
        step: Option<&PlanStep>,
        ctx: &mut SceneContext,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let input = ctx.actor_input();
        for text in play_all(self.registry.global_actors(), &input).await? {
            ctx.session.add_system_message(text);
        }
        if let Some(prior) = ctx.prior_context() {
            ctx.session
                .add_system_message(format!("Conversation so far:\n{prior}"));
        }
        if let Some(step) = step {
            let mut note = format!(
                "You are running step {} of a plan: {}",
                step.step_number, step.purpose
            );
            if !step.expected_tools.is_empty() {
                note.push_str(&format!(
                    "\nFunctions expected for this step: {}",
                    step.expected_tools.join(", ")
                ));
            }
            ctx.session.add_system_message(note);
        }
        for text in play_all(scene.actors(), &input).await? {
            ctx.session.add_system_message(text);
        }
        for tool in self.registry.tools_of(scene.name()) {
            ctx.session.add_function_tool(tool);
        }
        let message = ctx.message().to_string();
        ctx.session.add_user_message(message);

        let mut depth = 0;
        loop {
            let turn = ctx.session.execute(cancel).await?;
            ctx.defer_cost(turn.cost());

            if !turn.has_tool_calls {
                let answer = turn.message.text_content();
                let running = ctx
                    .event(AiResponseStatus::Running)
                    .with_scene(scene.name())
                    .with_message(answer.clone());
                ctx.emit(running).await?;
                info!(key = %ctx.key(), scene = %scene.name(), depth, "scene answered");
                return Ok(answer);
            }

            depth += 1;
            if depth > self.max_tool_depth {
                warn!(
                    key = %ctx.key(),
                    scene = %scene.name(),
                    limit = self.max_tool_depth,
                    "scene exceeded tool-call depth"
                );
                return Err(PlayError::RecursionLimit {
                    scene: scene.name().to_string(),
                    limit: self.max_tool_depth,
                });
            }

            for call in &turn.message.tool_calls {
                self.handle_call(scene, call, ctx, cancel).await?;
            }
        }
    }

    async fn handle_call(
        &self,
        scene: &Scene,
        call: &ToolCall,
        ctx: &mut SceneContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(prior) = ctx
            .prior_result(scene.name(), &call.tool_name)
            .map(str::to_string)
        {
            debug!(scene = %scene.name(), function = %call.tool_name, "skipping repeated call");
            let skipped = ctx
                .event(AiResponseStatus::ToolSkipped)
                .with_scene(scene.name())
                .with_function(&call.tool_name)
                .with_arguments(&call.arguments)
                .with_message(format!(
                    "{} already ran in this request; its earlier result was reused at no cost",
                    call.tool_name
                ));
            ctx.emit(skipped).await?;
            ctx.session.add_system_message(format!(
                "Function {} was already called in this request. Response for function {}: {}",
                call.tool_name,
                call.tool_name,
                shown(&prior)
            ));
            return Ok(());
        }

        let bearer = ctx.settings().bearer_token.clone();
        let outcome = self
            .dispatcher
            .invoke(
                scene.name(),
                &call.tool_name,
                &call.arguments,
                bearer.as_deref(),
                cancel,
            )
            .await?;

        match outcome {
            DispatchOutcome::Completed { function, response } => {
                let event = ctx
                    .event(AiResponseStatus::FunctionRequest)
                    .with_scene(scene.name())
                    .with_function(&function)
                    .with_arguments(&call.arguments)
                    .with_response(&response);
                ctx.emit(event).await?;
                ctx.session.add_system_message(format!(
                    "Response for function {function}: {}",
                    shown(&response)
                ));
                ctx.mark_invoked(scene.name(), &function, response);
            }
            DispatchOutcome::Failed { function, error } => {
                let event = ctx
                    .event(AiResponseStatus::FunctionRequest)
                    .with_scene(scene.name())
                    .with_function(&function)
                    .with_arguments(&call.arguments)
                    .with_error(&error);
                ctx.emit(event).await?;
                ctx.session.add_system_message(format!(
                    "Response for function {function}: Error: {error}. \
                     Correct the arguments and call the function again if needed."
                ));
            }
            DispatchOutcome::Unavailable { function } => {
                ctx.session.add_system_message(format!(
                    "Function {function} is not available in scene {}.",
                    scene.name()
                ));
            }
        }
        Ok(())
    }
}

fn shown(response: &str) -> &str {
    if response.is_empty() { "(done, no result)" } else { response }
}
