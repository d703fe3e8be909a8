// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve swarm nodes and metadata trees
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresNodeRepository** - Node records as JSONB with a version column
//! - **PostgresMetadataRepository** - Metadata trees keyed by (collection, id)
//!
//! ## In-Memory Repositories
//!
//! - **InMemoryNodeRepository** - HashMap-backed, used by tests and `arbor run`
//! - **InMemoryMetadataRepository** - HashMap-backed shared or shadow store
//!
//! Both node repositories implement `update` as a compare-and-set on
//! `Node::version`.

pub mod postgres_metadata;
pub mod postgres_node;

pub use postgres_metadata::PostgresMetadataRepository;
pub use postgres_node::PostgresNodeRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::metadata::{MetadataNode, MetadataTreeKind};
use crate::domain::node::{Node, NodeId};
use crate::domain::repository::{MetadataRepository, NodeRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryNodeRepository {
    nodes: Arc<RwLock<HashMap<NodeId, Node>>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return Err(RepositoryError::AlreadyExists(node.id.to_string()));
        }
        nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn update(&self, node: &Node) -> Result<Node, RepositoryError> {
        let mut nodes = self.nodes.write();
        let stored = nodes
            .get_mut(&node.id)
            .ok_or_else(|| RepositoryError::NotFound(node.id.to_string()))?;

        if stored.version != node.version {
            return Err(RepositoryError::Conflict {
                id: node.id.to_string(),
                expected: node.version,
                actual: stored.version,
            });
        }

        let mut updated = node.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        Ok(self.nodes.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        let mut nodes: Vec<Node> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(nodes)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMetadataRepository {
    nodes: Arc<RwLock<HashMap<(MetadataTreeKind, String), MetadataNode>>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with one tree.
    pub fn with_tree(kind: MetadataTreeKind, nodes: impl IntoIterator<Item = MetadataNode>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.nodes.write();
            for node in nodes {
                map.insert((kind, node.id.clone()), node);
            }
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn find(&self, kind: MetadataTreeKind, id: &str) -> Result<Option<MetadataNode>, RepositoryError> {
        Ok(self.nodes.read().get(&(kind, id.to_string())).cloned())
    }

    async fn insert_if_absent(
        &self,
        kind: MetadataTreeKind,
        id: &str,
        node: &MetadataNode,
    ) -> Result<bool, RepositoryError> {
        let mut nodes = self.nodes.write();
        let key = (kind, id.to_string());
        if nodes.contains_key(&key) {
            return Ok(false);
        }
        nodes.insert(key, node.clone());
        Ok(true)
    }

    async fn save(&self, kind: MetadataTreeKind, id: &str, node: &MetadataNode) -> Result<(), RepositoryError> {
        self.nodes.write().insert((kind, id.to_string()), node.clone());
        Ok(())
    }
}
