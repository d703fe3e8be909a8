// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Continuations
//!
//! [`OperationDispatcher::resume`] is the second entry point of the engine:
//! the completion provider calls it, possibly long after the node blocked and
//! from another process, with the result the node was waiting for.
//!
//! Claiming the continuation clears the blocking context with a
//! compare-and-set write, so a node is resumed at most once per suspension. A
//! resume that loses against a termination (or arrives twice) fails with
//! `StaleResume` and leaves the node untouched.
//!
//! The `action` operation handler lives here too: it calls a named function
//! of a live node's action directly.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument};

use crate::application::dispatcher::{DispatchError, Invocation, OperationDispatcher};
use crate::domain::action::{ActionError, Continuation, SubtreeConcluded, SUBTREE_CONCLUDED};
use crate::domain::events::NodeEvent;
use crate::domain::node::NodeId;
use crate::domain::operation::{ActionOperation, OperationOutput, SwarmOperation};

impl OperationDispatcher {
    /// Deliver `result` to a blocked node and run its continuation function.
    pub async fn resume(&self, node_id: NodeId, result: Value) -> Result<Vec<SwarmOperation>, DispatchError> {
        let span = info_span!("resume", node_id = %node_id);
        metrics::counter!("arbor_resumes_total").increment(1);

        async {
            let (node, claimed) = self
                .modify_node(node_id, |node| {
                    if !node.is_alive() || node.blocking_context().is_none() {
                        return Ok(None);
                    }
                    Ok(Some(node.take_blocking_context()?))
                })
                .await?;

            let Some(blocking_context) = claimed else {
                metrics::counter!("arbor_stale_resumes_total").increment(1);
                debug!(node_id = %node_id, alive = node.is_alive(), "Stale resume rejected");
                return Err(DispatchError::StaleResume(node_id));
            };

            info!(
                node_id = %node_id,
                function = %blocking_context.next_function_to_call,
                "Node resumed"
            );
            self.event_bus.publish(NodeEvent::NodeResumed {
                node_id,
                function: blocking_context.next_function_to_call.clone(),
                resumed_at: Utc::now(),
            });

            let output = self
                .run_action(
                    &node,
                    Invocation::Call {
                        function: blocking_context.next_function_to_call,
                        continuation: Continuation::new(blocking_context.context, result),
                    },
                )
                .await?;
            Ok(output.into_operations())
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn handle_action(&self, op: ActionOperation) -> Result<OperationOutput, DispatchError> {
        let node = self.load_node(op.node_id).await?;
        if !node.is_alive() {
            debug!(node_id = %node.id, function = %op.function_to_call, "Action target is dead");
            return Ok(OperationOutput::None);
        }

        let invocation = if op.function_to_call == SUBTREE_CONCLUDED {
            let concluded: SubtreeConcluded =
                serde_json::from_value(op.args).map_err(|e| DispatchError::Action {
                    node_id: node.id,
                    action_id: node.action_id.clone(),
                    source: ActionError::from(e),
                })?;
            Invocation::SubtreeConcluded(concluded)
        } else {
            Invocation::Call {
                function: op.function_to_call,
                continuation: Continuation::from_args(op.args),
            }
        };

        self.run_action(&node, invocation).await
    }
}
