// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Builtin actions and the base metadata trees the CLI ships with.
//!
//! The actions are deliberately small: they lean on whatever answers the
//! completion provider (the terminal, for `arbor run`) instead of a model.
//!
//! - `swarm/reasoning/decompose` asks for a plan, one subtask per line, and
//!   spawns a child per subtask. Lines starting with `ask:` become questions
//!   for the user. It terminates itself once every child has concluded.
//! - `swarm/reasoning/answer` asks for an answer and reports it.
//! - `swarm/communication/ask_user` asks the user and reports the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use arbor_core::application::{ActionRegistration, ActionRegistry};
use arbor_core::domain::action::{Action, ActionContext, ActionError, Continuation, SubtreeConcluded};
use arbor_core::domain::metadata::{MetadataNode, MetadataNodeType, MetadataTreeKind};
use arbor_core::domain::node::{BlockingType, NodeEmbryo};
use arbor_core::domain::operation::{
    BlockingOperation, OperationOutput, SpawnOperation, SwarmOperation, TerminationOperation,
    UserCommunicationOperation,
};
use arbor_core::domain::repository::NodeRepository;

pub const DECOMPOSE: &str = "swarm/reasoning/decompose";
pub const ANSWER: &str = "swarm/reasoning/answer";
pub const ASK_USER: &str = "swarm/communication/ask_user";

const ASK_PREFIX: &str = "ask:";

/// Registry with every builtin action.
pub fn builtin_registry(nodes: Arc<dyn NodeRepository>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry
        .register(ActionRegistration::new(DECOMPOSE, Arc::new(Decompose { nodes })))
        .register(ActionRegistration::new(ANSWER, Arc::new(Answer)))
        .register(ActionRegistration::new(ASK_USER, Arc::new(AskUser)));
    registry
}

/// Base tree for `kind`. Both trees hang off a `root` portal; the action tree
/// also exposes a `custom` portal for per-swarm tools.
pub fn base_tree(kind: MetadataTreeKind) -> Vec<MetadataNode> {
    match kind {
        MetadataTreeKind::Action => vec![
            MetadataNode::new("root", MetadataNodeType::Portal, "actions")
                .with_children(["reasoning", "communication", "custom"]),
            MetadataNode::new("reasoning", MetadataNodeType::Folder, "reasoning")
                .with_parent("root")
                .with_children(["decompose", "answer"]),
            action_node("decompose", "reasoning", DECOMPOSE, "Split a goal into subtasks"),
            action_node("answer", "reasoning", ANSWER, "Answer a single question"),
            MetadataNode::new("communication", MetadataNodeType::Folder, "communication")
                .with_parent("root")
                .with_children(["ask_user"]),
            action_node("ask_user", "communication", ASK_USER, "Ask the user a question"),
            MetadataNode::new("custom", MetadataNodeType::Portal, "custom")
                .with_parent("root")
                .with_description("Swarm-local actions"),
        ],
        MetadataTreeKind::Memory => vec![MetadataNode::new("root", MetadataNodeType::Portal, "memories")],
    }
}

fn action_node(id: &str, parent: &str, action_id: &str, description: &str) -> MetadataNode {
    MetadataNode::new(id, MetadataNodeType::Action, id)
        .with_parent(parent)
        .with_description(description)
        .with_extra("action_id", json!(action_id))
}

/// Split a plan into trimmed, non-empty subtask lines.
pub fn parse_plan(plan: &str) -> Vec<String> {
    plan.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanContext {
    goal: String,
    result: Value,
}

struct Decompose {
    nodes: Arc<dyn NodeRepository>,
}

#[async_trait]
impl Action for Decompose {
    async fn entry(&self, ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(BlockingOperation::new(ctx.node_id, BlockingType::Completion, "handle_plan")
            .with_args(json!({
                "prompt": format!("Split into subtasks, one per line (prefix questions with '{}'): {}", ASK_PREFIX, ctx.message),
            }))
            .with_context(json!({ "goal": ctx.message }))
            .into())
    }

    async fn call(
        &self,
        function: &str,
        ctx: &ActionContext,
        continuation: Continuation,
    ) -> Result<OperationOutput, ActionError> {
        if function != "handle_plan" {
            return Err(ActionError::UnknownFunction {
                function: function.to_string(),
            });
        }

        let plan: PlanContext = continuation.decode()?;
        let text = plan
            .result
            .as_str()
            .ok_or_else(|| ActionError::InvalidPayload("plan must be a string".to_string()))?;
        let subtasks = parse_plan(text);

        if subtasks.is_empty() {
            return Ok(TerminationOperation::of_self(ctx.node_id)
                .with_report(format!("nothing to do for: {}", plan.goal))
                .into());
        }

        let spawns: Vec<SwarmOperation> = subtasks
            .into_iter()
            .map(|task| {
                let embryo = match task.strip_prefix(ASK_PREFIX) {
                    Some(question) => NodeEmbryo::new(ASK_USER, question.trim()),
                    None => NodeEmbryo::new(ANSWER, task),
                };
                SpawnOperation::child(ctx.node_id, embryo).into()
            })
            .collect();
        Ok(spawns.into())
    }

    async fn on_subtree_concluded(
        &self,
        ctx: &ActionContext,
        _concluded: SubtreeConcluded,
    ) -> Result<OperationOutput, ActionError> {
        let node = self
            .nodes
            .find_by_id(ctx.node_id)
            .await
            .map_err(|e| ActionError::Failed(e.to_string()))?
            .ok_or_else(|| ActionError::Failed(format!("node {} vanished", ctx.node_id)))?;

        let mut reports = Vec::new();
        for child_id in node.children_ids() {
            let child = self
                .nodes
                .find_by_id(*child_id)
                .await
                .map_err(|e| ActionError::Failed(e.to_string()))?;
            match child {
                Some(child) if child.is_alive() => return Ok(OperationOutput::None),
                Some(child) => reports.push(format!(
                    "{}: {}",
                    child.message,
                    child.report().unwrap_or(if child.is_failed() { "failed" } else { "-" })
                )),
                None => {}
            }
        }

        Ok(TerminationOperation::of_self(ctx.node_id)
            .with_report(reports.join("\n"))
            .into())
    }
}

struct Answer;

#[async_trait]
impl Action for Answer {
    async fn entry(&self, ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(BlockingOperation::new(ctx.node_id, BlockingType::Completion, "handle_answer")
            .with_args(json!({ "prompt": ctx.message }))
            .into())
    }

    async fn call(
        &self,
        function: &str,
        ctx: &ActionContext,
        continuation: Continuation,
    ) -> Result<OperationOutput, ActionError> {
        match function {
            "handle_answer" => Ok(conclude(ctx, &continuation)),
            other => Err(ActionError::UnknownFunction {
                function: other.to_string(),
            }),
        }
    }
}

struct AskUser;

#[async_trait]
impl Action for AskUser {
    async fn entry(&self, ctx: &ActionContext) -> Result<OperationOutput, ActionError> {
        Ok(UserCommunicationOperation::new(ctx.node_id, ctx.message.clone(), "handle_reply").into())
    }

    async fn call(
        &self,
        function: &str,
        ctx: &ActionContext,
        continuation: Continuation,
    ) -> Result<OperationOutput, ActionError> {
        match function {
            "handle_reply" => Ok(conclude(ctx, &continuation)),
            other => Err(ActionError::UnknownFunction {
                function: other.to_string(),
            }),
        }
    }
}

fn conclude(ctx: &ActionContext, continuation: &Continuation) -> OperationOutput {
    let report = match continuation.result_str() {
        Some(text) => text.to_string(),
        None => continuation.result.to_string(),
    };
    TerminationOperation::of_self(ctx.node_id).with_report(report).into()
}
