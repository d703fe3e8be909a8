// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Metadata
//!
//! `MetadataRepository` backed by the `metadata_nodes` table, one row per
//! (collection, id). The collection is the tree kind (`action_space`,
//! `memory_space`).

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::metadata::{MetadataNode, MetadataTreeKind};
use crate::domain::repository::{MetadataRepository, RepositoryError};

pub struct PostgresMetadataRepository {
    pool: PgPool,
}

impl PostgresMetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataRepository for PostgresMetadataRepository {
    async fn find(&self, kind: MetadataTreeKind, id: &str) -> Result<Option<MetadataNode>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM metadata_nodes WHERE collection = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let document: serde_json::Value = row.get("document");
                Ok(Some(serde_json::from_value(document)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_if_absent(
        &self,
        kind: MetadataTreeKind,
        id: &str,
        node: &MetadataNode,
    ) -> Result<bool, RepositoryError> {
        let document = serde_json::to_value(node)?;

        let result = sqlx::query(
            r#"
            INSERT INTO metadata_nodes (collection, id, document)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert metadata node: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, kind: MetadataTreeKind, id: &str, node: &MetadataNode) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(node)?;

        sqlx::query(
            r#"
            INSERT INTO metadata_nodes (collection, id, document)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET document = EXCLUDED.document
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save metadata node: {}", e)))?;

        Ok(())
    }
}
