// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Termination handler
//!
//! Kills the target (idempotently), cascades through its subtree when the
//! target's policy is `cascading`, and tells whoever is waiting on the target
//! that it concluded:
//!
//! - an external terminator gets an `on_subtree_concluded` action operation,
//! - a node terminating itself notifies its live parent the same way.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{DispatchError, OperationDispatcher};
use crate::domain::action::{SubtreeConcluded, SUBTREE_CONCLUDED};
use crate::domain::events::NodeEvent;
use crate::domain::node::{Node, NodeId, TerminationPolicy};
use crate::domain::operation::{ActionOperation, OperationOutput, TerminationOperation};

impl OperationDispatcher {
    pub(crate) async fn handle_termination(&self, op: TerminationOperation) -> Result<OperationOutput, DispatchError> {
        let target_id = op.target_node_id;
        let report = op.report.clone();

        let (target, terminated) = self
            .modify_node(target_id, |node| {
                if !node.is_alive() {
                    return Ok(None);
                }
                if let Some(report) = &report {
                    node.set_report(report.clone());
                }
                node.terminate();
                Ok(Some(()))
            })
            .await?;

        if terminated.is_none() {
            debug!(node_id = %target_id, "Termination target already dead");
            return Ok(OperationOutput::None);
        }

        info!(
            node_id = %target_id,
            terminator_node_id = %op.terminator_node_id,
            termination_policy = ?target.termination_policy,
            "Node terminated"
        );
        self.event_bus.publish(NodeEvent::NodeTerminated {
            node_id: target_id,
            terminator_node_id: op.terminator_node_id,
            cascaded: false,
            terminated_at: Utc::now(),
        });

        if target.termination_policy == TerminationPolicy::Cascading {
            let killed = self.cascade_termination(&target, op.terminator_node_id).await?;
            debug!(node_id = %target_id, descendants_killed = killed, "Cascading termination finished");
        }

        self.conclusion_notice(&target, op).await
    }

    /// Terminate every descendant of `root`, depth-first, descending through
    /// nodes that were already dead. Returns how many nodes were killed.
    async fn cascade_termination(&self, root: &Node, terminator: NodeId) -> Result<usize, DispatchError> {
        let mut stack: Vec<NodeId> = root.children_ids().iter().rev().copied().collect();
        let mut visited: HashSet<NodeId> = HashSet::from([root.id]);
        let mut killed = 0;

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }

            let (node, terminated) = self
                .modify_node(node_id, |node| Ok(node.terminate().then_some(())))
                .await?;

            if terminated.is_some() {
                killed += 1;
                self.event_bus.publish(NodeEvent::NodeTerminated {
                    node_id,
                    terminator_node_id: terminator,
                    cascaded: true,
                    terminated_at: Utc::now(),
                });
            }

            stack.extend(node.children_ids().iter().rev().copied());
        }

        Ok(killed)
    }

    async fn conclusion_notice(
        &self,
        target: &Node,
        op: TerminationOperation,
    ) -> Result<OperationOutput, DispatchError> {
        let self_terminated = op.terminator_node_id == target.id;
        let receiver_id = if self_terminated {
            match target.parent_id {
                Some(parent_id) => parent_id,
                None => return Ok(OperationOutput::None),
            }
        } else {
            op.terminator_node_id
        };

        let receiver = match self.nodes.find_by_id(receiver_id).await? {
            Some(receiver) => receiver,
            None if self_terminated => {
                return Err(DispatchError::DanglingParent {
                    node_id: target.id,
                    parent_id: receiver_id,
                })
            }
            None => {
                warn!(node_id = %target.id, terminator_node_id = %receiver_id, "Terminator no longer exists");
                return Ok(OperationOutput::None);
            }
        };

        if !receiver.is_alive() {
            return Ok(OperationOutput::None);
        }

        let concluded = SubtreeConcluded {
            concluded_node_id: target.id,
            report: target.report().map(str::to_string),
            failed: target.is_failed(),
            context: op.context,
        };

        Ok(ActionOperation::new(receiver_id, SUBTREE_CONCLUDED)
            .with_args(serde_json::to_value(&concluded)?)
            .into())
    }
}
