// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype injected into
//! the PostgreSQL repositories. Only needed when `spec.storage.backend` is
//! `postgres`.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Tables backing the PostgreSQL repositories. Each row stores the record as
/// a JSONB document next to the columns used for lookups.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS swarm_nodes (
        id UUID PRIMARY KEY,
        parent_id UUID,
        alive BOOLEAN NOT NULL,
        version BIGINT NOT NULL,
        document JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metadata_nodes (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        document JSONB NOT NULL,
        PRIMARY KEY (collection, id)
    )
    "#,
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
