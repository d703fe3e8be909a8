// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Failure handler. Failing a node never cascades and notifies nobody.

use chrono::Utc;
use tracing::{debug, warn};

use crate::application::dispatcher::{DispatchError, OperationDispatcher};
use crate::domain::events::NodeEvent;
use crate::domain::node::NodeId;
use crate::domain::operation::{FailureOperation, OperationOutput};

impl OperationDispatcher {
    pub(crate) async fn handle_failure(&self, op: FailureOperation) -> Result<OperationOutput, DispatchError> {
        self.mark_failed(op.node_id, op.reason).await?;
        Ok(OperationOutput::None)
    }

    /// Mark a node dead and failed. Returns `false` if it was already dead.
    pub(crate) async fn mark_failed(&self, node_id: NodeId, reason: Option<String>) -> Result<bool, DispatchError> {
        let (_, failed) = self
            .modify_node(node_id, |node| Ok(node.fail(reason.clone()).then_some(())))
            .await?;

        if failed.is_none() {
            debug!(node_id = %node_id, "Failure target already dead");
            return Ok(false);
        }

        warn!(node_id = %node_id, reason = ?reason, "Node failed");
        metrics::counter!("arbor_nodes_failed_total").increment(1);
        self.event_bus.publish(NodeEvent::NodeFailed {
            node_id,
            reason,
            failed_at: Utc::now(),
        });
        Ok(true)
    }
}
