// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Aggregate
//!
//! A [`Node`] is one unit of work in the swarm tree, bound to a single action.
//! Nodes are never deleted: termination and failure only flip `alive`, so the
//! full tree stays available for audit and reporting.
//!
//! ## Invariants
//!
//! - A dead node has no blocking context.
//! - `children_ids` only grows, and only while the node is alive.
//! - `alive` goes from `true` to `false` exactly once.
//! - At most one blocking context is outstanding at any time.
//!
//! State-changing methods enforce these; fields that carry them are private and
//! exposed through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How terminating a node affects its descendants. Fixed at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Only the target dies; descendants must be terminated explicitly.
    #[default]
    Simple,
    /// The whole subtree below the target dies with it.
    Cascading,
}

impl FromStr for TerminationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(TerminationPolicy::Simple),
            "cascading" => Ok(TerminationPolicy::Cascading),
            other => Err(format!("unknown termination policy '{other}'")),
        }
    }
}

/// Kind of external result a blocked node is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingType {
    /// Free-text completion.
    Completion,
    /// Completion constrained to a structured (JSON) shape.
    StructuredCompletion,
    /// A reply from the human user.
    UserInput,
}

impl BlockingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockingType::Completion => "completion",
            BlockingType::StructuredCompletion => "structured_completion",
            BlockingType::UserInput => "user_input",
        }
    }
}

impl fmt::Display for BlockingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The minimal description needed to instantiate a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEmbryo {
    pub action_id: String,
    pub message: String,
}

impl NodeEmbryo {
    pub fn new(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            message: message.into(),
        }
    }
}

/// Persisted suspension state. Present on a node iff it awaits an external result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingContext {
    pub blocking_type: BlockingType,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub context: serde_json::Value,
    pub next_function_to_call: String,
}

/// Coarse lifecycle state, derived from the node's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Blocked,
    Terminated,
    Failed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Running => "running",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Terminated => "terminated",
            NodeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("node {0} is not alive")]
    NotAlive(NodeId),
    #[error("node {0} already has an outstanding blocking context")]
    AlreadyBlocked(NodeId),
    #[error("node {0} has no blocking context")]
    NotBlocked(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    children_ids: Vec<NodeId>,
    pub action_id: String,
    pub message: String,
    alive: bool,
    #[serde(default)]
    failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    #[serde(default)]
    blocking_context: Option<BlockingContext>,
    #[serde(default)]
    pub termination_policy: TerminationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency revision, bumped by the repository on every update.
    #[serde(default)]
    pub version: u64,
}

impl Node {
    /// Create a root node (no parent).
    pub fn new_root(embryo: NodeEmbryo, termination_policy: TerminationPolicy) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            children_ids: Vec::new(),
            action_id: embryo.action_id,
            message: embryo.message,
            alive: true,
            failed: false,
            failure_reason: None,
            blocking_context: None,
            termination_policy,
            report: None,
            created_at: Utc::now(),
            ended_at: None,
            version: 0,
        }
    }

    /// Create a child of `parent`. The parent must still be alive.
    pub fn new_child(
        embryo: NodeEmbryo,
        termination_policy: TerminationPolicy,
        parent: &Node,
    ) -> Result<Self, NodeError> {
        if !parent.alive {
            return Err(NodeError::NotAlive(parent.id));
        }
        let mut node = Self::new_root(embryo, termination_policy);
        node.parent_id = Some(parent.id);
        Ok(node)
    }

    /// Replace the generated id with a caller-assigned one.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    pub fn blocking_context(&self) -> Option<&BlockingContext> {
        self.blocking_context.as_ref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn status(&self) -> NodeStatus {
        match (self.alive, self.failed, self.blocking_context.is_some()) {
            (true, _, true) => NodeStatus::Blocked,
            (true, _, false) => NodeStatus::Running,
            (false, true, _) => NodeStatus::Failed,
            (false, false, _) => NodeStatus::Terminated,
        }
    }

    /// Append a child id. Re-adding an existing child is a no-op.
    pub fn add_child(&mut self, child_id: NodeId) -> Result<(), NodeError> {
        if !self.alive {
            return Err(NodeError::NotAlive(self.id));
        }
        if !self.children_ids.contains(&child_id) {
            self.children_ids.push(child_id);
        }
        Ok(())
    }

    /// Suspend the node until an external result arrives.
    pub fn block(&mut self, context: BlockingContext) -> Result<(), NodeError> {
        if !self.alive {
            return Err(NodeError::NotAlive(self.id));
        }
        if self.blocking_context.is_some() {
            return Err(NodeError::AlreadyBlocked(self.id));
        }
        self.blocking_context = Some(context);
        Ok(())
    }

    /// Remove and return the blocking context, claiming the continuation.
    pub fn take_blocking_context(&mut self) -> Result<BlockingContext, NodeError> {
        if !self.alive {
            return Err(NodeError::NotAlive(self.id));
        }
        self.blocking_context
            .take()
            .ok_or(NodeError::NotBlocked(self.id))
    }

    pub fn set_report(&mut self, report: impl Into<String>) {
        self.report = Some(report.into());
    }

    /// Mark the node dead. Returns `false` if it was already dead.
    pub fn terminate(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.blocking_context = None;
        self.ended_at = Some(Utc::now());
        true
    }

    /// Mark the node dead and failed. Returns `false` if it was already dead.
    pub fn fail(&mut self, reason: Option<String>) -> bool {
        if !self.terminate() {
            return false;
        }
        self.failed = true;
        self.failure_reason = reason;
        true
    }
}
