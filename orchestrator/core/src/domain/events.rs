// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::metadata::MetadataTreeKind;
use crate::domain::node::{BlockingType, NodeId, TerminationPolicy};
use crate::domain::swarm::SwarmId;

/// Node lifecycle events, published on the event bus as handlers change state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeEvent {
    NodeSpawned {
        node_id: NodeId,
        parent_id: Option<NodeId>,
        action_id: String,
        termination_policy: TerminationPolicy,
        spawned_at: DateTime<Utc>,
    },
    NodeBlocked {
        node_id: NodeId,
        blocking_type: BlockingType,
        next_function_to_call: String,
        blocked_at: DateTime<Utc>,
    },
    NodeResumed {
        node_id: NodeId,
        function: String,
        resumed_at: DateTime<Utc>,
    },
    NodeTerminated {
        node_id: NodeId,
        terminator_node_id: NodeId,
        cascaded: bool, // killed as a descendant of the target
        terminated_at: DateTime<Utc>,
    },
    NodeFailed {
        node_id: NodeId,
        reason: Option<String>,
        failed_at: DateTime<Utc>,
    },
    PortalCloned {
        swarm_id: SwarmId,
        tree: MetadataTreeKind,
        copied: usize,
        skipped: usize,
        cloned_at: DateTime<Utc>,
    },
}

impl NodeEvent {
    /// The node this event is about. Portal clones concern a swarm, not a node.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            NodeEvent::NodeSpawned { node_id, .. }
            | NodeEvent::NodeBlocked { node_id, .. }
            | NodeEvent::NodeResumed { node_id, .. }
            | NodeEvent::NodeTerminated { node_id, .. }
            | NodeEvent::NodeFailed { node_id, .. } => Some(*node_id),
            NodeEvent::PortalCloned { .. } => None,
        }
    }
}
