// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations for the storage backend named
//! in `SwarmConfig`, keeping the domain layer free of infrastructure choices.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire NodeRepository / MetadataRepository implementations

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::domain::metadata::{MetadataNode, MetadataTreeKind};
use crate::domain::repository::{MetadataRepository, NodeRepository, RepositoryError, StorageBackend};
use crate::domain::swarm_config::SwarmConfig;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryMetadataRepository, InMemoryNodeRepository, PostgresMetadataRepository, PostgresNodeRepository,
};

/// Repositories one swarm process works against.
#[derive(Clone)]
pub struct SwarmRepositories {
    pub nodes: Arc<dyn NodeRepository>,
    /// Base metadata trees, shared by every swarm instance
    pub shared_metadata: Arc<dyn MetadataRepository>,
    /// Instance-local shadow copies
    pub local_metadata: Arc<dyn MetadataRepository>,
}

impl SwarmRepositories {
    pub fn in_memory() -> Self {
        Self {
            nodes: Arc::new(InMemoryNodeRepository::new()),
            shared_metadata: Arc::new(InMemoryMetadataRepository::new()),
            local_metadata: Arc::new(InMemoryMetadataRepository::new()),
        }
    }

    /// Write base-tree nodes missing from the shared store. Returns how many
    /// were written.
    pub async fn seed_shared(
        &self,
        kind: MetadataTreeKind,
        nodes: impl IntoIterator<Item = MetadataNode>,
    ) -> Result<usize, RepositoryError> {
        let mut written = 0;
        for node in nodes {
            if self.shared_metadata.insert_if_absent(kind, &node.id, &node).await? {
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Build repositories for the configured backend. With PostgreSQL, shared and
/// local metadata live in the same table, told apart by the shadow-id prefix.
pub async fn create_repositories(config: &SwarmConfig) -> Result<SwarmRepositories> {
    match config.storage_backend() {
        StorageBackend::InMemory => Ok(SwarmRepositories::in_memory()),
        StorageBackend::PostgreSQL(pg) => {
            let database = Database::new(&pg.connection_string, config.spec.storage.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            database
                .ensure_schema()
                .await
                .context("Failed to create database schema")?;

            let pool = database.get_pool().clone();
            let metadata: Arc<dyn MetadataRepository> = Arc::new(PostgresMetadataRepository::new(pool.clone()));
            Ok(SwarmRepositories {
                nodes: Arc::new(PostgresNodeRepository::new(pool)),
                shared_metadata: metadata.clone(),
                local_metadata: metadata,
            })
        }
    }
}
