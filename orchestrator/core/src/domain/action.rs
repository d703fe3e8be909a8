// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Action Contract
//!
//! An [`Action`] is the pluggable behaviour bound to a node. The engine calls
//! it at three points:
//!
//! - [`Action::entry`] right after the node is spawned,
//! - [`Action::call`] when a suspended node is resumed (the function named by
//!   its blocking context) or when an `action` operation targets the node,
//! - [`Action::on_subtree_concluded`] when a node it terminated, or one of its
//!   children, has concluded.
//!
//! Each returns an [`OperationOutput`] the dispatcher hands back to the driver.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::node::NodeId;
use crate::domain::operation::OperationOutput;
use crate::domain::swarm::{Platform, SwarmId};

/// Function name the engine uses to deliver subtree conclusions.
pub const SUBTREE_CONCLUDED: &str = "on_subtree_concluded";

/// Everything an action knows about the node it runs for.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub node_id: NodeId,
    pub parent_id: Option<NodeId>,
    pub swarm_id: SwarmId,
    pub action_id: String,
    pub message: String,
    pub platform: Platform,
    /// Required configuration values, injected at resolve time.
    pub configs: HashMap<String, String>,
    /// Context attached by the spawning operation. Only set for `entry`.
    pub context: Option<Value>,
}

impl ActionContext {
    pub fn config(&self, key: &str) -> Option<&str> {
        self.configs.get(key).map(String::as_str)
    }
}

/// Input to a resumed function: the context persisted when the node blocked,
/// plus the result that fulfilled it.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub context: Value,
    pub result: Value,
}

impl Continuation {
    pub fn new(context: Value, result: Value) -> Self {
        Self { context, result }
    }

    /// Arguments of a direct `action` operation; there is no blocking result.
    pub fn from_args(args: Value) -> Self {
        Self::new(args, Value::Null)
    }

    /// The context with `result` merged in. An object context gains a
    /// `result` key; any other context is wrapped as `{context, result}`.
    pub fn merged(&self) -> Value {
        match &self.context {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert("result".to_string(), self.result.clone());
                Value::Object(map)
            }
            Value::Null => json!({ "result": self.result }),
            other => json!({ "context": other, "result": self.result }),
        }
    }

    /// Decode the merged continuation into the action's own type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        Ok(serde_json::from_value(self.merged())?)
    }

    pub fn result_str(&self) -> Option<&str> {
        self.result.as_str()
    }
}

/// Notification that a node in the receiver's subtree has concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtreeConcluded {
    pub concluded_node_id: NodeId,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action has no function named '{function}'")]
    UnknownFunction { function: String },

    #[error("invalid action payload: {0}")]
    InvalidPayload(String),

    #[error("action failed: {0}")]
    Failed(String),
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        ActionError::InvalidPayload(err.to_string())
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    /// Entry point, invoked once with the node's message.
    async fn entry(&self, ctx: &ActionContext) -> Result<OperationOutput, ActionError>;

    /// Named continuation function.
    async fn call(
        &self,
        function: &str,
        _ctx: &ActionContext,
        _continuation: Continuation,
    ) -> Result<OperationOutput, ActionError> {
        Err(ActionError::UnknownFunction {
            function: function.to_string(),
        })
    }

    async fn on_subtree_concluded(
        &self,
        _ctx: &ActionContext,
        _concluded: SubtreeConcluded,
    ) -> Result<OperationOutput, ActionError> {
        Ok(OperationOutput::None)
    }
}
