// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the swarm's two stores, defined in the domain
//! layer and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Records | Implementations |
//! |-------|---------|-----------------|
//! | `NodeRepository` | `Node` | `InMemoryNodeRepository`, `PostgresNodeRepository` |
//! | `MetadataRepository` | `MetadataNode` | `InMemoryMetadataRepository`, `PostgresMetadataRepository` |
//!
//! ## Concurrency
//!
//! `NodeRepository::update` is a compare-and-set on `Node::version`. The
//! caller passes the node as it last read it; the write succeeds only if the
//! stored version still matches, and the returned node carries the bumped
//! version. Callers re-read and re-validate on `RepositoryError::Conflict`.

use async_trait::async_trait;

use crate::domain::metadata::{MetadataNode, MetadataTreeKind};
use crate::domain::node::{Node, NodeId};

/// Storage backend selected at start-up from `SwarmConfig`.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Persist a new node. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError>;

    /// Compare-and-set write. Returns the stored node with its new version.
    async fn update(&self, node: &Node) -> Result<Node, RepositoryError>;

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError>;
}

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn find(&self, kind: MetadataTreeKind, id: &str) -> Result<Option<MetadataNode>, RepositoryError>;

    /// Store `node` under `id` unless something is already there.
    /// Returns `true` if it was written.
    async fn insert_if_absent(
        &self,
        kind: MetadataTreeKind,
        id: &str,
        node: &MetadataNode,
    ) -> Result<bool, RepositoryError>;

    /// Create or overwrite.
    async fn save(&self, kind: MetadataTreeKind, id: &str, node: &MetadataNode) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
