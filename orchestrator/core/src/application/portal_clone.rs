// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Portal Clone
//!
//! Gives a swarm instance its own view of a shared, immutable metadata tree
//! without copying the tree. Only `portal` nodes, the attachment points where
//! an instance may hang its own actions or memories, are copied into the
//! instance-local store under `{swarm_id}_{node_id}`. Everything else is read
//! through from the shared store.
//!
//! # Algorithm
//!
//! Depth-first walk from `root` with an explicit stack. Every node's
//! `children_ids` are followed whether or not the node is a portal, so
//! portals nested below plain folders are found. A visited set makes cyclic
//! trees terminate. Shadow copies are written insert-if-absent: re-cloning an
//! instance leaves existing copies (and anything attached to them) alone and
//! reports them as skipped.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::events::NodeEvent;
use crate::domain::metadata::{shadow_id, MetadataNode, MetadataTreeKind, METADATA_ROOT_ID};
use crate::domain::repository::{MetadataRepository, RepositoryError};
use crate::domain::swarm::SwarmId;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum PortalCloneError {
    #[error("{kind} tree has no node '{id}'")]
    MissingNode { kind: MetadataTreeKind, id: String },

    #[error("'{0}' is not a portal node")]
    NotAPortal(String),

    #[error("portal '{0}' has not been cloned for this swarm")]
    NotCloned(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalCloneReport {
    /// Base-tree nodes walked
    pub visited: usize,
    /// Portal ids copied in this pass
    pub copied: Vec<String>,
    /// Portal ids whose shadow copy already existed
    pub skipped: Vec<String>,
}

pub struct PortalCloner {
    shared: Arc<dyn MetadataRepository>,
    local: Arc<dyn MetadataRepository>,
    event_bus: Arc<EventBus>,
}

impl PortalCloner {
    pub fn new(
        shared: Arc<dyn MetadataRepository>,
        local: Arc<dyn MetadataRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            shared,
            local,
            event_bus,
        }
    }

    pub async fn clone_portals(
        &self,
        swarm_id: &SwarmId,
        kind: MetadataTreeKind,
    ) -> Result<PortalCloneReport, PortalCloneError> {
        let mut report = PortalCloneReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = vec![METADATA_ROOT_ID.to_string()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }

            let node = self
                .shared
                .find(kind, &id)
                .await?
                .ok_or_else(|| PortalCloneError::MissingNode { kind, id: id.clone() })?;
            report.visited += 1;

            if node.is_portal() {
                let local_id = shadow_id(swarm_id, &node.id);
                if self.local.insert_if_absent(kind, &local_id, &node).await? {
                    debug!(swarm_id = %swarm_id, tree = %kind, portal = %node.id, "Portal cloned");
                    report.copied.push(node.id.clone());
                } else {
                    report.skipped.push(node.id.clone());
                }
            }

            stack.extend(node.children_ids.iter().rev().cloned());
        }

        info!(
            swarm_id = %swarm_id,
            tree = %kind,
            visited = report.visited,
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            "Portal clone complete"
        );
        self.event_bus.publish(NodeEvent::PortalCloned {
            swarm_id: *swarm_id,
            tree: kind,
            copied: report.copied.len(),
            skipped: report.skipped.len(),
            cloned_at: Utc::now(),
        });

        Ok(report)
    }
}

/// One swarm instance's view of a metadata tree.
pub struct PortalTree {
    swarm_id: SwarmId,
    kind: MetadataTreeKind,
    shared: Arc<dyn MetadataRepository>,
    local: Arc<dyn MetadataRepository>,
}

impl PortalTree {
    pub fn new(
        swarm_id: SwarmId,
        kind: MetadataTreeKind,
        shared: Arc<dyn MetadataRepository>,
        local: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            swarm_id,
            kind,
            shared,
            local,
        }
    }

    /// The instance's copy of `id` if it has one, otherwise the shared node.
    pub async fn resolve(&self, id: &str) -> Result<Option<MetadataNode>, PortalCloneError> {
        if let Some(node) = self.local.find(self.kind, &shadow_id(&self.swarm_id, id)).await? {
            return Ok(Some(node));
        }
        Ok(self.shared.find(self.kind, id).await?)
    }

    /// Children of `id` as this instance sees them.
    pub async fn children(&self, id: &str) -> Result<Vec<MetadataNode>, PortalCloneError> {
        let Some(parent) = self.resolve(id).await? else {
            return Err(PortalCloneError::MissingNode {
                kind: self.kind,
                id: id.to_string(),
            });
        };

        let mut children = Vec::with_capacity(parent.children_ids.len());
        for child_id in &parent.children_ids {
            if let Some(child) = self.resolve(child_id).await? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Hang `node` below a cloned portal. Both the node and the updated portal
    /// are written to the instance-local store only.
    pub async fn attach(&self, portal_id: &str, mut node: MetadataNode) -> Result<(), PortalCloneError> {
        let portal_key = shadow_id(&self.swarm_id, portal_id);
        let mut portal = self
            .local
            .find(self.kind, &portal_key)
            .await?
            .ok_or_else(|| PortalCloneError::NotCloned(portal_id.to_string()))?;
        if !portal.is_portal() {
            return Err(PortalCloneError::NotAPortal(portal_id.to_string()));
        }

        node.parent_id = Some(portal_id.to_string());
        let node_key = shadow_id(&self.swarm_id, &node.id);
        self.local.save(self.kind, &node_key, &node).await?;

        portal.attach_child(node.id.clone());
        self.local.save(self.kind, &portal_key, &portal).await?;

        debug!(swarm_id = %self.swarm_id, tree = %self.kind, portal = %portal_id, node = %node.id, "Attached to portal");
        Ok(())
    }
}
