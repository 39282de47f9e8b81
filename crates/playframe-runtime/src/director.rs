//! Directors decide, after each pass, whether the request needs another one.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use playframe_core::{AiResponseStatus, Result, Tool};

use crate::context::SceneContext;
use crate::planner::SchemaPlanner;
use crate::summarizer::render_history;

pub const DIRECT_TOOL: &str = "direct_next_pass";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectorVerdict {
    pub execute_again: bool,
    /// Scenes excluded from the remaining passes.
    pub cut_scenes: Vec<String>,
    pub reasoning: String,
}

impl DirectorVerdict {
    pub fn stop(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Director: Send + Sync {
    async fn direct(&self, ctx: &SceneContext, cancel: &CancellationToken) -> Result<DirectorVerdict>;
}

/// Never asks for another pass.
pub struct StopDirector;

#[async_trait]
impl Director for StopDirector {
    async fn direct(&self, _ctx: &SceneContext, _cancel: &CancellationToken) -> Result<DirectorVerdict> {
        Ok(DirectorVerdict::stop("single pass"))
    }
}

/// Scenes entered by the current request, in first-entry order.
pub fn scenes_entered(ctx: &SceneContext) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for r in ctx.responses() {
        if r.status != AiResponseStatus::Starting {
            continue;
        }
        if let Some(ref name) = r.name {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

#[derive(Deserialize)]
struct DirectArgs {
    #[serde(default)]
    execute_again: bool,
    #[serde(default)]
    cut_scenes: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// Asks a model, through a forced tool call, whether to run another pass.
pub struct LlmDirector {
    client: Option<String>,
}

impl LlmDirector {
    pub fn new(client: Option<String>) -> Self {
        Self { client }
    }

    fn tool() -> Tool {
        Tool::new(
            DIRECT_TOOL,
            "Decide whether the request needs another round of scenes.",
            json!({
                "type": "object",
                "properties": {
                    "execute_again": {
                        "type": "boolean",
                        "description": "true only when information is still missing and another scene can provide it"
                    },
                    "cut_scenes": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "scenes that must not run again"
                    },
                    "reasoning": { "type": "string" }
                },
                "required": ["execute_again", "cut_scenes", "reasoning"]
            }),
        )
    }
}

#[async_trait]
impl Director for LlmDirector {
    async fn direct(&self, ctx: &SceneContext, cancel: &CancellationToken) -> Result<DirectorVerdict> {
        let mut session = ctx.new_session(self.client.as_deref())?;
        session.add_system_message(format!(
            "You direct a multi-scene assistant. Decide whether the work done so far \
             answers the user request or another round is needed.\n\nScenes:\n{}\n\
             Work done in this request:\n{}",
            ctx.registry().describe(&ctx.settings().avoid_scenes),
            render_history(ctx.responses()),
        ));
        session.add_user_message(ctx.message());
        session.force_tool(Self::tool());

        let result = session.execute(cancel).await?;
        let args = result
            .message
            .tool_calls
            .iter()
            .find(|c| c.tool_name == DIRECT_TOOL)
            .and_then(|c| serde_json::from_str::<DirectArgs>(&c.arguments).ok());

        let Some(args) = args else {
            warn!(key = %ctx.key(), "director reply unreadable, stopping");
            return Ok(DirectorVerdict::stop("director reply unreadable"));
        };

        let mut cut_scenes: Vec<String> = args
            .cut_scenes
            .into_iter()
            .filter(|name| ctx.registry().scene(name).is_some())
            .collect();
        if args.execute_again && cut_scenes.is_empty() {
            cut_scenes = scenes_entered(ctx);
        }

        info!(
            key = %ctx.key(),
            execute_again = args.execute_again,
            cut = cut_scenes.len(),
            cost = result.cost(),
            "director verdict"
        );
        Ok(DirectorVerdict {
            execute_again: args.execute_again,
            cut_scenes,
            reasoning: args.reasoning,
        })
    }
}

/// Uses the schema planner's progress assessment; scenes already run are cut.
pub struct PlanDirector {
    planner: SchemaPlanner,
}

impl PlanDirector {
    pub fn new(client: Option<String>) -> Self {
        Self {
            planner: SchemaPlanner::new(client),
        }
    }
}

#[async_trait]
impl Director for PlanDirector {
    async fn direct(&self, ctx: &SceneContext, cancel: &CancellationToken) -> Result<DirectorVerdict> {
        let assessment = self.planner.should_continue(ctx, cancel).await?;
        let execute_again = assessment.should_continue && !assessment.can_answer_now;
        info!(
            key = %ctx.key(),
            execute_again,
            missing = assessment.missing_information.len(),
            cost = assessment.cost,
            "progress assessed"
        );
        Ok(DirectorVerdict {
            execute_again,
            cut_scenes: if execute_again { scenes_entered(ctx) } else { Vec::new() },
            reasoning: assessment.reasoning,
        })
    }
}
