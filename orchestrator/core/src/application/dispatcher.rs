// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operation Dispatcher
//!
//! Routes one [`SwarmOperation`] to its handler and returns the follow-up
//! operations the handler (usually an action) produced. Nothing runs in the
//! background: the caller, typically [`SwarmDriver`](super::swarm_driver::SwarmDriver),
//! feeds the returned operations back in until none remain.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Node lifecycle state transitions
//! - **Collaborators:**
//!   - Domain: Node aggregate, Action port, CompletionProvider port
//!   - Infrastructure: NodeRepository, EventBus
//!
//! Handlers live next to this file (`spawn`, `blocking`, `termination`,
//! `failure`, `continuation`) as further `impl OperationDispatcher` blocks.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use crate::application::action_registry::{ActionRegistry, ResolveError};
use crate::domain::action::{ActionContext, ActionError, Continuation, SubtreeConcluded};
use crate::domain::completion::{CompletionError, CompletionProvider};
use crate::domain::node::{Node, NodeError, NodeId};
use crate::domain::operation::{OperationDecodeError, OperationOutput, SwarmOperation};
use crate::domain::repository::{NodeRepository, RepositoryError};
use crate::domain::swarm::{Platform, SwarmId};
use crate::domain::swarm_config::SwarmConfig;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown swarm operation type: {0}")]
    UnknownOperationType(String),

    #[error("malformed swarm operation: {0}")]
    MalformedOperation(String),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node {node_id} references missing parent {parent_id}")]
    DanglingParent { node_id: NodeId, parent_id: NodeId },

    #[error("parent node {0} not found")]
    MissingParent(NodeId),

    #[error("parent node {0} is not alive")]
    ParentNotAlive(NodeId),

    #[error("node {0} already has an outstanding blocking context")]
    AlreadyBlocked(NodeId),

    #[error("stale resume for node {0}: nothing to resume")]
    StaleResume(NodeId),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("action '{action_id}' failed on node {node_id}: {source}")]
    Action {
        node_id: NodeId,
        action_id: String,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<OperationDecodeError> for DispatchError {
    fn from(err: OperationDecodeError) -> Self {
        match err {
            OperationDecodeError::UnknownType(name) => DispatchError::UnknownOperationType(name),
            other => DispatchError::MalformedOperation(other.to_string()),
        }
    }
}

/// Swarm-wide values every handler needs.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub swarm_id: SwarmId,
    pub platform: Platform,
    pub configs: HashMap<String, String>,
    pub max_update_attempts: u32,
}

impl DispatchSettings {
    pub fn new(swarm_id: SwarmId) -> Self {
        Self {
            swarm_id,
            platform: Platform::default(),
            configs: HashMap::new(),
            max_update_attempts: 3,
        }
    }

    pub fn from_config(swarm_id: SwarmId, config: &SwarmConfig) -> Self {
        Self {
            swarm_id,
            platform: config.spec.platform,
            configs: config.spec.configs.clone(),
            max_update_attempts: config.spec.dispatch.max_update_attempts.max(1),
        }
    }
}

/// How an action is entered.
pub(crate) enum Invocation {
    Entry { context: Option<Value> },
    Call { function: String, continuation: Continuation },
    SubtreeConcluded(SubtreeConcluded),
}

impl Invocation {
    fn label(&self) -> &str {
        match self {
            Invocation::Entry { .. } => "entry",
            Invocation::Call { function, .. } => function,
            Invocation::SubtreeConcluded(_) => crate::domain::action::SUBTREE_CONCLUDED,
        }
    }
}

pub struct OperationDispatcher {
    pub(crate) nodes: Arc<dyn NodeRepository>,
    pub(crate) registry: Arc<ActionRegistry>,
    pub(crate) completion: Arc<dyn CompletionProvider>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) settings: DispatchSettings,
}

impl OperationDispatcher {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        registry: Arc<ActionRegistry>,
        completion: Arc<dyn CompletionProvider>,
        event_bus: Arc<EventBus>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            nodes,
            registry,
            completion,
            event_bus,
            settings,
        }
    }

    /// Process one operation and return the operations it produced.
    pub async fn dispatch(&self, operation: SwarmOperation) -> Result<Vec<SwarmOperation>, DispatchError> {
        let operation_type = operation.operation_type();
        let span = info_span!(
            "dispatch",
            operation_type = %operation_type,
            operation_id = %operation.id(),
            node_id = ?operation.node_id(),
        );
        metrics::counter!("arbor_operations_dispatched_total", "operation_type" => operation_type.as_str())
            .increment(1);

        let result = async {
            match operation {
                SwarmOperation::Spawn(op) => self.handle_spawn(op).await,
                SwarmOperation::Blocking(op) => self.handle_blocking(op).await,
                SwarmOperation::UserCommunication(op) => self.handle_user_communication(op).await,
                SwarmOperation::Terminate(op) => self.handle_termination(op).await,
                SwarmOperation::NodeFailure(op) => self.handle_failure(op).await,
                SwarmOperation::Action(op) => self.handle_action(op).await,
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok(output) => {
                let produced = output.into_operations();
                debug!(operation_type = %operation_type, produced = produced.len(), "Operation dispatched");
                Ok(produced)
            }
            Err(e) => {
                metrics::counter!("arbor_operations_failed_total", "operation_type" => operation_type.as_str())
                    .increment(1);
                warn!(operation_type = %operation_type, error = %e, "Operation failed");
                Err(e)
            }
        }
    }

    /// Decode a JSON operation and dispatch it. Unknown `operation_type`s are
    /// rejected before any handler runs.
    pub async fn dispatch_value(&self, value: Value) -> Result<Vec<SwarmOperation>, DispatchError> {
        let operation = SwarmOperation::from_value(value)?;
        self.dispatch(operation).await
    }

    pub(crate) async fn load_node(&self, node_id: NodeId) -> Result<Node, DispatchError> {
        self.nodes
            .find_by_id(node_id)
            .await?
            .ok_or(DispatchError::NodeNotFound(node_id))
    }

    /// Read-modify-write a node under the repository's compare-and-set.
    ///
    /// `apply` returns `Some(outcome)` to persist its changes or `None` to
    /// leave the node untouched. It is re-run against a fresh read after a
    /// version conflict, up to `max_update_attempts` times. Returns the node
    /// as stored (or as read, when nothing was written).
    pub(crate) async fn modify_node<T, F>(
        &self,
        node_id: NodeId,
        mut apply: F,
    ) -> Result<(Node, Option<T>), DispatchError>
    where
        F: FnMut(&mut Node) -> Result<Option<T>, DispatchError> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut node = self.load_node(node_id).await?;
            let Some(outcome) = apply(&mut node)? else {
                return Ok((node, None));
            };

            match self.nodes.update(&node).await {
                Ok(stored) => return Ok((stored, Some(outcome))),
                Err(RepositoryError::Conflict { expected, actual, .. })
                    if attempt < self.settings.max_update_attempts =>
                {
                    debug!(
                        node_id = %node_id,
                        attempt,
                        expected,
                        actual,
                        "Version conflict, re-reading node"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn action_context(&self, node: &Node, configs: HashMap<String, String>, context: Option<Value>) -> ActionContext {
        ActionContext {
            node_id: node.id,
            parent_id: node.parent_id,
            swarm_id: self.settings.swarm_id,
            action_id: node.action_id.clone(),
            message: node.message.clone(),
            platform: self.settings.platform,
            configs,
            context,
        }
    }

    /// Resolve the node's action and run it. Resolution and action errors
    /// fail the node before being returned. Produced spawns without a parent
    /// are attached to `node`.
    pub(crate) async fn run_action(&self, node: &Node, invocation: Invocation) -> Result<OperationOutput, DispatchError> {
        let resolved = match self
            .registry
            .resolve(&node.action_id, self.settings.platform, &self.settings.configs)
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.mark_failed(node.id, Some(e.to_string())).await?;
                return Err(e.into());
            }
        };

        let label = invocation.label().to_string();
        debug!(node_id = %node.id, action_id = %node.action_id, function = %label, "Invoking action");

        let result = match invocation {
            Invocation::Entry { context } => {
                let ctx = self.action_context(node, resolved.configs, context);
                resolved.action.entry(&ctx).await
            }
            Invocation::Call { function, continuation } => {
                let ctx = self.action_context(node, resolved.configs, None);
                resolved.action.call(&function, &ctx, continuation).await
            }
            Invocation::SubtreeConcluded(concluded) => {
                let ctx = self.action_context(node, resolved.configs, None);
                resolved.action.on_subtree_concluded(&ctx, concluded).await
            }
        };

        match result {
            Ok(output) => {
                let bound: Vec<SwarmOperation> = output
                    .into_operations()
                    .into_iter()
                    .map(|op| op.bind_to_parent(node.id))
                    .collect();
                Ok(OperationOutput::from(bound))
            }
            Err(source) => {
                warn!(node_id = %node.id, action_id = %node.action_id, function = %label, error = %source, "Action failed");
                self.mark_failed(node.id, Some(source.to_string())).await?;
                Err(DispatchError::Action {
                    node_id: node.id,
                    action_id: node.action_id.clone(),
                    source,
                })
            }
        }
    }
}
