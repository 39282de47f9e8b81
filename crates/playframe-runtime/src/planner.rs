//! Planners propose which scenes to run, and in what order, before execution.
//!
//! Both planners tolerate "nothing to do": a plan with no steps declared with
//! `needs_execution: false` is a valid plan. Anything unparseable degrades to
//! an invalid empty plan rather than an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playframe_core::{Result, Tool};

use crate::context::SceneContext;
use crate::registry::SceneRegistry;
use crate::summarizer::render_history;

/// Name of the forced tool carrying a plan.
pub const PLAN_TOOL: &str = "create_execution_plan";
/// Name of the forced tool carrying a continuation assessment.
pub const ASSESS_TOOL: &str = "assess_progress";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_number: u32,
    pub scene_name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub expected_tools: Vec<String>,
    /// Step this one needs results from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<u32>,
    #[serde(default)]
    pub completed: bool,
}

/// An ordered list of scene steps, produced fresh per planning call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    pub is_valid: bool,
    pub reasoning: String,
    /// Model cost of producing the plan.
    #[serde(skip)]
    pub cost: f64,
}

impl ExecutionPlan {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            is_valid: false,
            reasoning: reason.into(),
            cost: 0.0,
        }
    }

    /// Valid and nothing to run.
    pub fn no_execution(reasoning: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            is_valid: true,
            reasoning: reasoning.into(),
            cost: 0.0,
        }
    }

    pub fn needs_execution(&self) -> bool {
        self.is_valid && !self.steps.is_empty()
    }

    pub fn scene_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.scene_name.as_str()).collect()
    }
}

/// The plan exactly as the model proposed it.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanProposal {
    #[serde(default = "default_true")]
    pub needs_execution: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

fn default_true() -> bool {
    true
}

impl PlanProposal {
    /// Validate against the registry: unknown or avoided scenes are dropped
    /// and the rest are ordered by step number (ties keep their order).
    pub fn into_plan(self, registry: &SceneRegistry, avoid: &HashSet<String>) -> ExecutionPlan {
        if registry.is_empty() {
            return ExecutionPlan::invalid("no scenes are registered");
        }
        if self.steps.is_empty() {
            return if self.needs_execution {
                ExecutionPlan::invalid("plan has no steps")
            } else {
                ExecutionPlan::no_execution(self.reasoning)
            };
        }

        let proposed = self.steps.len();
        let mut steps: Vec<PlanStep> = self
            .steps
            .into_iter()
            .filter_map(|mut step| {
                let scene = registry
                    .scene(&step.scene_name)
                    .or_else(|| registry.scene_by_trigger(&step.scene_name));
                match scene {
                    Some(scene) if !avoid.contains(scene.name()) => {
                        step.scene_name = scene.name().to_string();
                        Some(step)
                    }
                    _ => {
                        debug!(scene = %step.scene_name, "dropping plan step for unavailable scene");
                        None
                    }
                }
            })
            .collect();

        if steps.is_empty() {
            return ExecutionPlan::invalid(format!(
                "none of the {proposed} proposed steps names an available scene"
            ));
        }
        steps.sort_by_key(|s| s.step_number);

        ExecutionPlan {
            steps,
            is_valid: true,
            reasoning: self.reasoning,
            cost: 0.0,
        }
    }
}

/// Parse a plan out of free text: a bare object, a fenced block, or an
/// object embedded in prose.
pub fn parse_plan_text(text: &str) -> std::result::Result<PlanProposal, String> {
    let candidate = extract_json_fence(text)
        .or_else(|| extract_json(text))
        .ok_or_else(|| "reply contains no JSON object".to_string())?;
    serde_json::from_str(&candidate).map_err(|e| format!("reply is not a valid plan: {e}"))
}

fn extract_json_fence(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let start = trimmed.find("```")?;
    let after_start = &trimmed[start + 3..];
    let after_lang = &after_start[after_start.find('\n')? + 1..];
    let end = after_lang.rfind("```")?;
    let candidate = after_lang[..end].trim();
    candidate.starts_with('{').then(|| candidate.to_string())
}

fn extract_json(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Produces an [`ExecutionPlan`] for the request in `ctx`.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(
        &self,
        ctx: &SceneContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionPlan>;
}

fn planning_prompt(ctx: &SceneContext) -> String {
    let mut prompt = String::from(
        "You plan how to answer a user request with the scenes below. \
         Each scene groups functions the assistant can call.\n\nScenes:\n",
    );
    prompt.push_str(&ctx.registry().describe(&ctx.settings().avoid_scenes));
    if let Some(summary) = ctx.summary() {
        prompt.push_str(&format!("\nSummary of the conversation so far:\n{summary}\n"));
    }
    prompt.push_str(
        "\nList only the scenes needed, in the order they must run. \
         If the request can be answered without any scene, set needs_execution to false \
         and return no steps.",
    );
    prompt
}

/// Asks for the plan as JSON in a plain reply.
pub struct FreeFormPlanner {
    client: Option<String>,
}

impl FreeFormPlanner {
    pub fn new(client: Option<String>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Planner for FreeFormPlanner {
    async fn create_plan(
        &self,
        ctx: &SceneContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionPlan> {
        if ctx.registry().is_empty() {
            return Ok(ExecutionPlan::invalid("no scenes are registered"));
        }

        let mut session = ctx.new_session(self.client.as_deref())?;
        session.add_system_message(format!(
            "{}\n\nReply with a single JSON object of the form \
             {{\"needs_execution\": bool, \"reasoning\": string, \"steps\": \
             [{{\"step_number\": int, \"scene_name\": string, \"purpose\": string, \
             \"expected_tools\": [string], \"depends_on\": int or null}}]}}",
            planning_prompt(ctx)
        ));
        session.add_user_message(ctx.message());

        let result = session.execute(cancel).await?;
        let text = result.message.text_content();
        let mut plan = match parse_plan_text(&text) {
            Ok(proposal) => proposal.into_plan(ctx.registry(), &ctx.settings().avoid_scenes),
            Err(reason) => {
                warn!(key = %ctx.key(), reason = %reason, "free-form plan could not be parsed");
                ExecutionPlan::invalid(reason)
            }
        };
        plan.cost = result.cost();
        info!(key = %ctx.key(), valid = plan.is_valid, steps = plan.steps.len(), "plan created");
        Ok(plan)
    }
}

/// Forces the model to call a tool whose parameters are the plan.
pub struct SchemaPlanner {
    client: Option<String>,
}

/// Whether another pass is worthwhile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuationAssessment {
    #[serde(default)]
    pub should_continue: bool,
    #[serde(default)]
    pub can_answer_now: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(skip)]
    pub cost: f64,
}

impl SchemaPlanner {
    pub fn new(client: Option<String>) -> Self {
        Self { client }
    }

    /// Tool schema with the plan shape, restricted to the available scenes.
    pub fn plan_tool(registry: &SceneRegistry, avoid: &HashSet<String>) -> Tool {
        let scenes: Vec<Value> = registry
            .scenes()
            .filter(|s| !avoid.contains(s.name()))
            .map(|s| Value::String(s.name().to_string()))
            .collect();
        Tool::new(
            PLAN_TOOL,
            "Record the execution plan for the user request.",
            json!({
                "type": "object",
                "properties": {
                    "needs_execution": {
                        "type": "boolean",
                        "description": "false when the request can be answered without running any scene"
                    },
                    "reasoning": { "type": "string" },
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "step_number": { "type": "integer" },
                                "scene_name": { "type": "string", "enum": scenes },
                                "purpose": { "type": "string" },
                                "expected_tools": { "type": "array", "items": { "type": "string" } },
                                "depends_on": { "type": ["integer", "null"] }
                            },
                            "required": ["step_number", "scene_name", "purpose"]
                        }
                    }
                },
                "required": ["needs_execution", "reasoning", "steps"]
            }),
        )
    }

    pub fn assess_tool() -> Tool {
        Tool::new(
            ASSESS_TOOL,
            "Assess whether the request needs another round of scene execution.",
            json!({
                "type": "object",
                "properties": {
                    "should_continue": { "type": "boolean" },
                    "can_answer_now": { "type": "boolean" },
                    "reasoning": { "type": "string" },
                    "missing_information": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["should_continue", "can_answer_now", "reasoning"]
            }),
        )
    }

    /// Decide whether the results so far answer the request.
    ///
    /// An unreadable assessment counts as "stop".
    pub async fn should_continue(
        &self,
        ctx: &SceneContext,
        cancel: &CancellationToken,
    ) -> Result<ContinuationAssessment> {
        let mut session = ctx.new_session(self.client.as_deref())?;
        session.add_system_message(format!(
            "You review the progress on a user request.\n\nScenes still available:\n{}\n\
             Progress so far:\n{}",
            ctx.registry().describe(&ctx.settings().avoid_scenes),
            render_history(ctx.responses()),
        ));
        session.add_user_message(ctx.message());
        session.force_tool(Self::assess_tool());

        let result = session.execute(cancel).await?;
        let mut assessment = forced_arguments(&result.message.tool_calls, ASSESS_TOOL)
            .and_then(|raw| serde_json::from_str::<ContinuationAssessment>(raw).ok())
            .unwrap_or_else(|| {
                warn!(key = %ctx.key(), "continuation assessment unreadable, stopping");
                ContinuationAssessment {
                    reasoning: "assessment unreadable".into(),
                    ..Default::default()
                }
            });
        assessment.cost = result.cost();
        Ok(assessment)
    }
}

#[async_trait]
impl Planner for SchemaPlanner {
    async fn create_plan(
        &self,
        ctx: &SceneContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionPlan> {
        if ctx.registry().is_empty() {
            return Ok(ExecutionPlan::invalid("no scenes are registered"));
        }

        let avoid = &ctx.settings().avoid_scenes;
        let mut session = ctx.new_session(self.client.as_deref())?;
        session.add_system_message(planning_prompt(ctx));
        session.add_user_message(ctx.message());
        session.force_tool(Self::plan_tool(ctx.registry(), avoid));

        let result = session.execute(cancel).await?;
        let proposal = match forced_arguments(&result.message.tool_calls, PLAN_TOOL) {
            Some(raw) => serde_json::from_str::<PlanProposal>(raw)
                .map_err(|e| format!("plan arguments are invalid: {e}")),
            None => parse_plan_text(&result.message.text_content()),
        };
        let mut plan = match proposal {
            Ok(p) => p.into_plan(ctx.registry(), avoid),
            Err(reason) => {
                warn!(key = %ctx.key(), reason = %reason, "schema plan could not be read");
                ExecutionPlan::invalid(reason)
            }
        };
        plan.cost = result.cost();
        info!(key = %ctx.key(), valid = plan.is_valid, steps = plan.steps.len(), "plan created");
        Ok(plan)
    }
}

fn forced_arguments<'a>(calls: &'a [playframe_core::ToolCall], tool: &str) -> Option<&'a str> {
    calls
        .iter()
        .find(|c| c.tool_name == tool)
        .map(|c| c.arguments.as_str())
}
