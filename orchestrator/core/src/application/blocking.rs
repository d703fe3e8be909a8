// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Blocking and user-communication handlers: suspend a node and hand its
//! request to the completion provider.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::application::dispatcher::{DispatchError, OperationDispatcher};
use crate::domain::completion::CompletionRequest;
use crate::domain::events::NodeEvent;
use crate::domain::node::{BlockingContext, BlockingType, NodeError, NodeId};
use crate::domain::operation::{BlockingOperation, OperationOutput, UserCommunicationOperation};

impl OperationDispatcher {
    pub(crate) async fn handle_blocking(&self, op: BlockingOperation) -> Result<OperationOutput, DispatchError> {
        let context = BlockingContext {
            blocking_type: op.blocking_type,
            args: op.args,
            context: op.context,
            next_function_to_call: op.next_function_to_call,
        };
        self.suspend(op.node_id, context).await
    }

    pub(crate) async fn handle_user_communication(
        &self,
        op: UserCommunicationOperation,
    ) -> Result<OperationOutput, DispatchError> {
        let context = BlockingContext {
            blocking_type: BlockingType::UserInput,
            args: json!({ "message": op.message }),
            context: op.context,
            next_function_to_call: op.next_function_to_call,
        };
        self.suspend(op.node_id, context).await
    }

    async fn suspend(&self, node_id: NodeId, context: BlockingContext) -> Result<OperationOutput, DispatchError> {
        self.modify_node(node_id, |node| {
            node.block(context.clone()).map_err(|e| match e {
                NodeError::AlreadyBlocked(id) => DispatchError::AlreadyBlocked(id),
                other => other.into(),
            })?;
            Ok(Some(()))
        })
        .await?;

        info!(
            node_id = %node_id,
            blocking_type = %context.blocking_type,
            next_function = %context.next_function_to_call,
            "Node blocked"
        );
        self.event_bus.publish(NodeEvent::NodeBlocked {
            node_id,
            blocking_type: context.blocking_type,
            next_function_to_call: context.next_function_to_call.clone(),
            blocked_at: Utc::now(),
        });

        let request = CompletionRequest::new(node_id, context.blocking_type, context.args.clone());
        if let Err(e) = self.completion.submit(request).await {
            warn!(node_id = %node_id, error = %e, "Completion submit failed, unblocking node");
            self.unblock(node_id, &context).await?;
            return Err(e.into());
        }

        Ok(OperationOutput::None)
    }

    /// Take `context` back off the node. A node that has since been
    /// terminated or resumed is left alone.
    async fn unblock(&self, node_id: NodeId, context: &BlockingContext) -> Result<(), DispatchError> {
        self.modify_node(node_id, |node| {
            let ours = node.is_alive() && node.blocking_context() == Some(context);
            if !ours {
                return Ok(None);
            }
            node.take_blocking_context()?;
            Ok(Some(()))
        })
        .await?;
        Ok(())
    }
}
