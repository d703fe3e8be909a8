// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Spawn handler: creates a node, links it under its parent and enters its action.

use chrono::Utc;
use tracing::{info, warn};

use crate::application::dispatcher::{DispatchError, Invocation, OperationDispatcher};
use crate::domain::events::NodeEvent;
use crate::domain::node::Node;
use crate::domain::operation::{OperationOutput, SpawnOperation};

impl OperationDispatcher {
    pub(crate) async fn handle_spawn(&self, op: SpawnOperation) -> Result<OperationOutput, DispatchError> {
        let policy = op.termination_policy.unwrap_or_default();

        let mut node = match op.node_id {
            Some(parent_id) => {
                let parent = self
                    .nodes
                    .find_by_id(parent_id)
                    .await?
                    .ok_or(DispatchError::MissingParent(parent_id))?;
                Node::new_child(op.node_embryo, policy, &parent)
                    .map_err(|_| DispatchError::ParentNotAlive(parent_id))?
            }
            None => Node::new_root(op.node_embryo, policy),
        };
        if let Some(child_node_id) = op.child_node_id {
            node = node.with_id(child_node_id);
        }

        // Child first, so a parent never lists an id that cannot be loaded.
        self.nodes.insert(&node).await?;

        if let Some(parent_id) = node.parent_id {
            let child_id = node.id;
            let linked = self
                .modify_node(parent_id, |parent| {
                    if !parent.is_alive() {
                        return Err(DispatchError::ParentNotAlive(parent_id));
                    }
                    parent.add_child(child_id)?;
                    Ok(Some(()))
                })
                .await;

            if let Err(e) = linked {
                warn!(node_id = %child_id, parent_id = %parent_id, error = %e, "Parent died while spawning child");
                self.mark_failed(child_id, Some(e.to_string())).await?;
                return Err(e);
            }
        }

        info!(
            node_id = %node.id,
            parent_id = ?node.parent_id,
            action_id = %node.action_id,
            termination_policy = ?node.termination_policy,
            "Node spawned"
        );
        self.event_bus.publish(NodeEvent::NodeSpawned {
            node_id: node.id,
            parent_id: node.parent_id,
            action_id: node.action_id.clone(),
            termination_policy: node.termination_policy,
            spawned_at: Utc::now(),
        });

        self.run_action(&node, Invocation::Entry { context: op.context }).await
    }
}
