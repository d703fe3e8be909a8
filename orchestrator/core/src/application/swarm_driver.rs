// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Driver
//!
//! The loop around the dispatcher: a FIFO queue of pending operations,
//! processed until it is empty. A suspended node contributes nothing to the
//! queue until its completion arrives through [`SwarmDriver::resume`].
//!
//! An operation that fails is recorded and the loop moves on; handlers have
//! already failed the affected node where that applies. Repository errors
//! abort the run, since the store is then in an unknown state.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::dispatcher::{DispatchError, OperationDispatcher};
use crate::domain::node::NodeId;
use crate::domain::operation::{OperationType, SwarmOperation};

/// An operation the driver could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub operation_type: OperationType,
    pub node_id: Option<NodeId>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub dispatched: usize,
    /// Nodes created by spawn operations, in creation order
    pub spawned: Vec<NodeId>,
    pub failures: Vec<DispatchFailure>,
}

impl DriveSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SwarmDriver {
    dispatcher: Arc<OperationDispatcher>,
}

impl SwarmDriver {
    pub fn new(dispatcher: Arc<OperationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Dispatch `operations` and everything they produce, oldest first.
    pub async fn run(
        &self,
        operations: impl IntoIterator<Item = SwarmOperation>,
    ) -> Result<DriveSummary, DispatchError> {
        let mut queue: VecDeque<SwarmOperation> = operations.into_iter().collect();
        let mut summary = DriveSummary::default();

        while let Some(operation) = queue.pop_front() {
            let operation = assign_spawn_id(operation);
            let operation_type = operation.operation_type();
            let spawned = match &operation {
                SwarmOperation::Spawn(spawn) => spawn.child_node_id,
                _ => None,
            };
            let node_id = spawned.or_else(|| operation.node_id());

            summary.dispatched += 1;
            match self.dispatcher.dispatch(operation).await {
                Ok(produced) => {
                    summary.spawned.extend(spawned);
                    queue.extend(produced);
                }
                Err(DispatchError::Repository(e)) => return Err(DispatchError::Repository(e)),
                Err(e) => {
                    if let (Some(id), DispatchError::Resolve(_) | DispatchError::Action { .. }) = (spawned, &e) {
                        // The node exists; it was failed by the handler.
                        summary.spawned.push(id);
                    }
                    summary.failures.push(DispatchFailure {
                        operation_type,
                        node_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            dispatched = summary.dispatched,
            spawned = summary.spawned.len(),
            failures = summary.failures.len(),
            "Operation queue drained"
        );
        Ok(summary)
    }

    /// Resume a blocked node and drive whatever its continuation produced.
    pub async fn resume(&self, node_id: NodeId, result: Value) -> Result<DriveSummary, DispatchError> {
        let produced = match self.dispatcher.resume(node_id, result).await {
            Ok(produced) => produced,
            Err(e @ DispatchError::Action { .. })
            | Err(e @ DispatchError::Resolve(_))
            | Err(e @ DispatchError::StaleResume(_)) => {
                warn!(node_id = %node_id, error = %e, "Resume failed");
                return Ok(DriveSummary {
                    dispatched: 0,
                    spawned: Vec::new(),
                    failures: vec![DispatchFailure {
                        operation_type: OperationType::Blocking,
                        node_id: Some(node_id),
                        error: e.to_string(),
                    }],
                });
            }
            Err(e) => return Err(e),
        };

        self.run(produced).await
    }
}

/// Give spawns a node id up front so the driver can report what it created.
fn assign_spawn_id(operation: SwarmOperation) -> SwarmOperation {
    match operation {
        SwarmOperation::Spawn(mut spawn) if spawn.child_node_id.is_none() => {
            spawn.child_node_id = Some(NodeId::new());
            SwarmOperation::Spawn(spawn)
        }
        other => other,
    }
}
