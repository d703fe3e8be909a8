// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Completion provider port.
//!
//! A blocked node's request is handed to a [`CompletionProvider`]; the answer
//! comes back later, possibly from another process, through the dispatcher's
//! `resume` entry point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::node::{BlockingType, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub node_id: NodeId,
    pub blocking_type: BlockingType,
    pub args: Value,
    pub requested_at: DateTime<Utc>,
}

impl CompletionRequest {
    pub fn new(node_id: NodeId, blocking_type: BlockingType, args: Value) -> Self {
        Self {
            node_id,
            blocking_type,
            args,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request rejected: {0}")]
    Rejected(String),

    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Accept a request for later fulfilment. Must not block on the answer.
    async fn submit(&self, request: CompletionRequest) -> Result<(), CompletionError>;
}
