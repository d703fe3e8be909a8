// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Operations
//!
//! [`SwarmOperation`] is the tagged instruction that flows between actions,
//! the dispatcher and the driving loop. On the wire it is a JSON object
//! discriminated by `operation_type`:
//!
//! | `operation_type` | Variant | Produced by |
//! |------------------|---------|-------------|
//! | `spawn` | [`SpawnOperation`] | swarm bootstrap, actions |
//! | `blocking` | [`BlockingOperation`] | actions needing an external result |
//! | `terminate` | [`TerminationOperation`] | actions |
//! | `node_failure` | [`FailureOperation`] | actions |
//! | `user_communication` | [`UserCommunicationOperation`] | actions talking to the user |
//! | `action` | [`ActionOperation`] | termination handler (subtree notifications) |
//!
//! Operations are ephemeral. Only a blocking operation's context outlives the
//! dispatch pass, persisted on the node it suspends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::node::{BlockingType, NodeEmbryo, NodeId, TerminationPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminant of [`SwarmOperation`], matching the `operation_type` wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Spawn,
    Blocking,
    Terminate,
    NodeFailure,
    UserCommunication,
    Action,
}

impl OperationType {
    pub const ALL: [OperationType; 6] = [
        OperationType::Spawn,
        OperationType::Blocking,
        OperationType::Terminate,
        OperationType::NodeFailure,
        OperationType::UserCommunication,
        OperationType::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Spawn => "spawn",
            OperationType::Blocking => "blocking",
            OperationType::Terminate => "terminate",
            OperationType::NodeFailure => "node_failure",
            OperationType::UserCommunication => "user_communication",
            OperationType::Action => "action",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = OperationDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OperationDecodeError::UnknownType(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum OperationDecodeError {
    #[error("operation is missing the 'operation_type' field")]
    MissingType,
    #[error("unknown swarm operation type: {0}")]
    UnknownType(String),
    #[error("malformed {operation_type} operation: {source}")]
    Malformed {
        operation_type: OperationType,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "snake_case")]
pub enum SwarmOperation {
    Spawn(SpawnOperation),
    Blocking(BlockingOperation),
    Terminate(TerminationOperation),
    NodeFailure(FailureOperation),
    UserCommunication(UserCommunicationOperation),
    Action(ActionOperation),
}

impl SwarmOperation {
    /// Decode an operation received as JSON, rejecting unknown operation types
    /// before attempting to read variant fields.
    pub fn from_value(value: Value) -> Result<Self, OperationDecodeError> {
        let operation_type: OperationType = value
            .get("operation_type")
            .and_then(Value::as_str)
            .ok_or(OperationDecodeError::MissingType)?
            .parse()?;

        serde_json::from_value(value).map_err(|source| OperationDecodeError::Malformed {
            operation_type,
            source,
        })
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            SwarmOperation::Spawn(_) => OperationType::Spawn,
            SwarmOperation::Blocking(_) => OperationType::Blocking,
            SwarmOperation::Terminate(_) => OperationType::Terminate,
            SwarmOperation::NodeFailure(_) => OperationType::NodeFailure,
            SwarmOperation::UserCommunication(_) => OperationType::UserCommunication,
            SwarmOperation::Action(_) => OperationType::Action,
        }
    }

    pub fn id(&self) -> OperationId {
        match self {
            SwarmOperation::Spawn(op) => op.id,
            SwarmOperation::Blocking(op) => op.id,
            SwarmOperation::Terminate(op) => op.id,
            SwarmOperation::NodeFailure(op) => op.id,
            SwarmOperation::UserCommunication(op) => op.id,
            SwarmOperation::Action(op) => op.id,
        }
    }

    /// The node this operation acts on, if it names one.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            SwarmOperation::Spawn(op) => op.node_id,
            SwarmOperation::Blocking(op) => Some(op.node_id),
            SwarmOperation::Terminate(op) => Some(op.target_node_id),
            SwarmOperation::NodeFailure(op) => Some(op.node_id),
            SwarmOperation::UserCommunication(op) => Some(op.node_id),
            SwarmOperation::Action(op) => Some(op.node_id),
        }
    }

    /// Attach a parentless spawn to `parent`. Other operations are returned as-is.
    pub fn bind_to_parent(self, parent: NodeId) -> Self {
        match self {
            SwarmOperation::Spawn(mut op) if op.node_id.is_none() => {
                op.node_id = Some(parent);
                SwarmOperation::Spawn(op)
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnOperation {
    #[serde(default)]
    pub id: OperationId,
    pub node_embryo: NodeEmbryo,
    /// Parent of the node to create. `None` creates a root.
    #[serde(default)]
    pub node_id: Option<NodeId>,
    /// Pre-assigned id for the node to create.
    #[serde(default)]
    pub child_node_id: Option<NodeId>,
    #[serde(default)]
    pub termination_policy: Option<TerminationPolicy>,
    #[serde(default)]
    pub context: Option<Value>,
}

impl SpawnOperation {
    pub fn root(node_embryo: NodeEmbryo) -> Self {
        Self {
            id: OperationId::new(),
            node_embryo,
            node_id: None,
            child_node_id: None,
            termination_policy: None,
            context: None,
        }
    }

    pub fn child(parent: NodeId, node_embryo: NodeEmbryo) -> Self {
        Self {
            node_id: Some(parent),
            ..Self::root(node_embryo)
        }
    }

    pub fn with_child_node_id(mut self, child_node_id: NodeId) -> Self {
        self.child_node_id = Some(child_node_id);
        self
    }

    pub fn with_termination_policy(mut self, policy: TerminationPolicy) -> Self {
        self.termination_policy = Some(policy);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingOperation {
    #[serde(default)]
    pub id: OperationId,
    pub node_id: NodeId,
    pub blocking_type: BlockingType,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub context: Value,
    pub next_function_to_call: String,
}

impl BlockingOperation {
    pub fn new(
        node_id: NodeId,
        blocking_type: BlockingType,
        next_function_to_call: impl Into<String>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            node_id,
            blocking_type,
            args: Value::Null,
            context: Value::Null,
            next_function_to_call: next_function_to_call.into(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationOperation {
    #[serde(default)]
    pub id: OperationId,
    pub terminator_node_id: NodeId,
    pub target_node_id: NodeId,
    /// Final report recorded on the target before it dies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

impl TerminationOperation {
    pub fn new(terminator_node_id: NodeId, target_node_id: NodeId) -> Self {
        Self {
            id: OperationId::new(),
            terminator_node_id,
            target_node_id,
            report: None,
            context: None,
        }
    }

    /// A node concluding its own work.
    pub fn of_self(node_id: NodeId) -> Self {
        Self::new(node_id, node_id)
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureOperation {
    #[serde(default)]
    pub id: OperationId,
    pub node_id: NodeId,
    #[serde(default)]
    pub reason: Option<String>,
}

impl FailureOperation {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            id: OperationId::new(),
            node_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCommunicationOperation {
    #[serde(default)]
    pub id: OperationId,
    pub node_id: NodeId,
    pub message: String,
    #[serde(default)]
    pub context: Value,
    pub next_function_to_call: String,
}

impl UserCommunicationOperation {
    pub fn new(
        node_id: NodeId,
        message: impl Into<String>,
        next_function_to_call: impl Into<String>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            node_id,
            message: message.into(),
            context: Value::Null,
            next_function_to_call: next_function_to_call.into(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOperation {
    #[serde(default)]
    pub id: OperationId,
    pub node_id: NodeId,
    pub function_to_call: String,
    #[serde(default)]
    pub args: Value,
}

impl ActionOperation {
    pub fn new(node_id: NodeId, function_to_call: impl Into<String>) -> Self {
        Self {
            id: OperationId::new(),
            node_id,
            function_to_call: function_to_call.into(),
            args: Value::Null,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// What a handler or action hands back to the dispatcher: nothing, one
/// operation, or several. The dispatcher flattens it into a list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OperationOutput {
    #[default]
    None,
    Single(Box<SwarmOperation>),
    Many(Vec<SwarmOperation>),
}

impl OperationOutput {
    pub fn into_operations(self) -> Vec<SwarmOperation> {
        match self {
            OperationOutput::None => Vec::new(),
            OperationOutput::Single(op) => vec![*op],
            OperationOutput::Many(ops) => ops,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OperationOutput::None => true,
            OperationOutput::Single(_) => false,
            OperationOutput::Many(ops) => ops.is_empty(),
        }
    }
}

impl From<SwarmOperation> for OperationOutput {
    fn from(op: SwarmOperation) -> Self {
        OperationOutput::Single(Box::new(op))
    }
}

impl From<Vec<SwarmOperation>> for OperationOutput {
    fn from(ops: Vec<SwarmOperation>) -> Self {
        OperationOutput::Many(ops)
    }
}

impl From<Option<SwarmOperation>> for OperationOutput {
    fn from(op: Option<SwarmOperation>) -> Self {
        op.map_or(OperationOutput::None, OperationOutput::from)
    }
}

macro_rules! impl_operation_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SwarmOperation {
                fn from(op: $ty) -> Self {
                    SwarmOperation::$variant(op)
                }
            }

            impl From<$ty> for OperationOutput {
                fn from(op: $ty) -> Self {
                    OperationOutput::from(SwarmOperation::$variant(op))
                }
            }
        )*
    };
}

impl_operation_variant! {
    Spawn => SpawnOperation,
    Blocking => BlockingOperation,
    Terminate => TerminationOperation,
    NodeFailure => FailureOperation,
    UserCommunication => UserCommunicationOperation,
    Action => ActionOperation,
}
