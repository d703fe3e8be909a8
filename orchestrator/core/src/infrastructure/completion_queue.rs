// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pending Completion Queue - in-process completion provider
//!
//! Holds submitted completion requests until something (the CLI prompting a
//! human, a test, a worker calling a model) answers them through
//! `OperationDispatcher::resume`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::completion::{CompletionError, CompletionProvider, CompletionRequest};
use crate::domain::node::NodeId;

#[derive(Clone, Default)]
pub struct PendingCompletionQueue {
    /// Requests in submission order
    pending: Arc<RwLock<VecDeque<CompletionRequest>>>,
}

impl PendingCompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of outstanding requests, oldest first
    pub async fn list_pending(&self) -> Vec<CompletionRequest> {
        self.pending.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }

    /// Remove and return the oldest request
    pub async fn pop_next(&self) -> Option<CompletionRequest> {
        self.pending.write().await.pop_front()
    }

    /// Remove and return the request for `node_id`, if any
    pub async fn take(&self, node_id: NodeId) -> Option<CompletionRequest> {
        let mut pending = self.pending.write().await;
        let index = pending.iter().position(|r| r.node_id == node_id)?;
        pending.remove(index)
    }
}

#[async_trait]
impl CompletionProvider for PendingCompletionQueue {
    async fn submit(&self, request: CompletionRequest) -> Result<(), CompletionError> {
        let mut pending = self.pending.write().await;

        // A node holds one blocking context, so an older request for it is stale.
        if let Some(index) = pending.iter().position(|r| r.node_id == request.node_id) {
            pending.remove(index);
            debug!(node_id = %request.node_id, "Superseded stale completion request");
        }

        info!(
            node_id = %request.node_id,
            blocking_type = %request.blocking_type,
            "Completion requested"
        );
        pending.push_back(request);
        debug!(pending = pending.len(), "Completion queue depth");
        Ok(())
    }
}
