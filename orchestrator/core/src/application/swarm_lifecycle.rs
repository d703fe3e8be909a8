// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Lifecycle Use Case
//!
//! Bootstraps a swarm instance: gives it its own action and memory namespaces
//! (portal clone) and builds the spawn operation for the root node, bound to
//! the configured root action and carrying the user's goal as its message.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Collaborators:** PortalCloner, SwarmConfig

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::portal_clone::{PortalCloneError, PortalCloneReport, PortalCloner};
use crate::domain::metadata::MetadataTreeKind;
use crate::domain::node::{NodeEmbryo, NodeId};
use crate::domain::operation::SpawnOperation;
use crate::domain::swarm::SwarmId;
use crate::domain::swarm_config::SwarmConfig;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("swarm goal cannot be empty")]
    EmptyGoal,

    #[error("failed to prepare {tree} namespace: {source}")]
    Namespace {
        tree: MetadataTreeKind,
        #[source]
        source: PortalCloneError,
    },
}

/// A swarm ready to be driven.
#[derive(Debug, Clone)]
pub struct SwarmLaunch {
    pub swarm_id: SwarmId,
    pub root_node_id: NodeId,
    pub root_operation: SpawnOperation,
    pub action_space: PortalCloneReport,
    pub memory_space: PortalCloneReport,
}

pub struct SwarmLifecycle {
    cloner: PortalCloner,
    config: Arc<SwarmConfig>,
}

impl SwarmLifecycle {
    pub fn new(cloner: PortalCloner, config: Arc<SwarmConfig>) -> Self {
        Self { cloner, config }
    }

    pub async fn create_swarm(&self, swarm_id: SwarmId, goal: &str) -> Result<SwarmLaunch, LifecycleError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(LifecycleError::EmptyGoal);
        }

        let action_space = self.clone_tree(&swarm_id, MetadataTreeKind::Action).await?;
        let memory_space = self.clone_tree(&swarm_id, MetadataTreeKind::Memory).await?;

        let root_node_id = NodeId::new();
        let root_operation = SpawnOperation::root(NodeEmbryo::new(self.config.spec.root_action_id.clone(), goal))
            .with_child_node_id(root_node_id)
            .with_termination_policy(self.config.spec.root_termination_policy);

        info!(
            swarm_id = %swarm_id,
            root_node_id = %root_node_id,
            root_action_id = %self.config.spec.root_action_id,
            "Swarm created"
        );

        Ok(SwarmLaunch {
            swarm_id,
            root_node_id,
            root_operation,
            action_space,
            memory_space,
        })
    }

    async fn clone_tree(&self, swarm_id: &SwarmId, tree: MetadataTreeKind) -> Result<PortalCloneReport, LifecycleError> {
        self.cloner
            .clone_portals(swarm_id, tree)
            .await
            .map_err(|source| LifecycleError::Namespace { tree, source })
    }
}
