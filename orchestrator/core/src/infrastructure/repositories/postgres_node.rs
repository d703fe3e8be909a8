// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Node Repository
//!
//! `NodeRepository` backed by the `swarm_nodes` table. The full node record is
//! stored as a JSONB `document`; `parent_id`, `alive` and `version` are kept
//! in their own columns for lookups and for the compare-and-set update.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::node::{Node, NodeId};
use crate::domain::repository::{NodeRepository, RepositoryError};

pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<Node, RepositoryError> {
        let document: serde_json::Value = row.get("document");
        let version: i64 = row.get("version");
        let mut node: Node = serde_json::from_value(document)
            .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize node: {}", e)))?;
        node.version = version as u64;
        Ok(node)
    }
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(node)?;

        let result = sqlx::query(
            r#"
            INSERT INTO swarm_nodes (id, parent_id, alive, version, document, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(node.id.0)
        .bind(node.parent_id.map(|p| p.0))
        .bind(node.is_alive())
        .bind(node.version as i64)
        .bind(document)
        .bind(node.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert node: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists(node.id.to_string()));
        }
        Ok(())
    }

    async fn update(&self, node: &Node) -> Result<Node, RepositoryError> {
        let mut updated = node.clone();
        updated.version = node.version + 1;
        let document = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE swarm_nodes
            SET alive = $3, version = $4, document = $5
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(node.id.0)
        .bind(node.version as i64)
        .bind(updated.is_alive())
        .bind(updated.version as i64)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update node: {}", e)))?;

        if result.rows_affected() == 1 {
            return Ok(updated);
        }

        let current: Option<i64> = sqlx::query_scalar("SELECT version FROM swarm_nodes WHERE id = $1")
            .bind(node.id.0)
            .fetch_optional(&self.pool)
            .await?;

        match current {
            Some(actual) => Err(RepositoryError::Conflict {
                id: node.id.to_string(),
                expected: node.version,
                actual: actual as u64,
            }),
            None => Err(RepositoryError::NotFound(node.id.to_string())),
        }
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        let row = sqlx::query("SELECT document, version FROM swarm_nodes WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepositoryError> {
        let rows = sqlx::query("SELECT document, version FROM swarm_nodes ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::decode).collect()
    }
}
