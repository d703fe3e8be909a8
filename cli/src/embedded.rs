// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded engine
//!
//! Builds the dispatcher, driver and portal cloner in-process from a
//! `SwarmConfig` and a set of repositories.

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use arbor_core::application::{
    create_repositories, DispatchSettings, OperationDispatcher, PortalCloner, SwarmDriver, SwarmLifecycle,
    SwarmRepositories,
};
use arbor_core::domain::events::NodeEvent;
use arbor_core::domain::metadata::MetadataTreeKind;
use arbor_core::domain::swarm::SwarmId;
use arbor_core::domain::swarm_config::SwarmConfig;
use arbor_core::infrastructure::event_bus::EventBusError;
use arbor_core::infrastructure::{EventBus, PendingCompletionQueue};

use crate::actions;

pub struct EmbeddedEngine {
    pub config: Arc<SwarmConfig>,
    pub repositories: SwarmRepositories,
    pub event_bus: Arc<EventBus>,
    pub completions: PendingCompletionQueue,
    pub driver: SwarmDriver,
}

impl EmbeddedEngine {
    /// Engine over the configured storage backend.
    pub async fn from_config(config: SwarmConfig, swarm_id: SwarmId) -> Result<Self> {
        let repositories = create_repositories(&config)
            .await
            .context("Failed to initialize repositories")?;
        Self::new(config, repositories, swarm_id).await
    }

    /// Engine over `repositories`, with the builtin base trees seeded into
    /// the shared metadata store.
    pub async fn new(config: SwarmConfig, repositories: SwarmRepositories, swarm_id: SwarmId) -> Result<Self> {
        for kind in [MetadataTreeKind::Action, MetadataTreeKind::Memory] {
            repositories
                .seed_shared(kind, actions::base_tree(kind))
                .await
                .with_context(|| format!("Failed to seed {} tree", kind))?;
        }

        let event_bus = Arc::new(EventBus::with_default_capacity());
        let completions = PendingCompletionQueue::new();
        let registry = actions::builtin_registry(repositories.nodes.clone());

        let dispatcher = Arc::new(OperationDispatcher::new(
            repositories.nodes.clone(),
            Arc::new(registry),
            Arc::new(completions.clone()),
            event_bus.clone(),
            DispatchSettings::from_config(swarm_id, &config),
        ));

        Ok(Self {
            config: Arc::new(config),
            repositories,
            event_bus,
            completions,
            driver: SwarmDriver::new(dispatcher),
        })
    }

    pub fn lifecycle(&self) -> SwarmLifecycle {
        let cloner = PortalCloner::new(
            self.repositories.shared_metadata.clone(),
            self.repositories.local_metadata.clone(),
            self.event_bus.clone(),
        );
        SwarmLifecycle::new(cloner, self.config.clone())
    }

    /// Print node events to stderr as they are published.
    pub fn follow_events(&self) -> JoinHandle<()> {
        let mut receiver = self.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => eprintln!("{}", describe_event(&event).dimmed()),
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        })
    }
}

pub fn describe_event(event: &NodeEvent) -> String {
    match event {
        NodeEvent::NodeSpawned {
            node_id, action_id, ..
        } => format!("spawned   {} ({})", node_id, action_id),
        NodeEvent::NodeBlocked {
            node_id, blocking_type, ..
        } => format!("blocked   {} on {}", node_id, blocking_type.as_str()),
        NodeEvent::NodeResumed { node_id, function, .. } => format!("resumed   {} -> {}", node_id, function),
        NodeEvent::NodeTerminated { node_id, cascaded, .. } => {
            if *cascaded {
                format!("cascaded  {}", node_id)
            } else {
                format!("concluded {}", node_id)
            }
        }
        NodeEvent::NodeFailed { node_id, reason, .. } => {
            format!("failed    {}: {}", node_id, reason.as_deref().unwrap_or("no reason given"))
        }
        NodeEvent::PortalCloned {
            tree, copied, skipped, ..
        } => format!("cloned    {} ({} copied, {} skipped)", tree, copied, skipped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::domain::node::{BlockingType, NodeStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_swarm_runs_to_completion() {
        let swarm_id = SwarmId::new();
        let engine = EmbeddedEngine::new(SwarmConfig::default(), SwarmRepositories::in_memory(), swarm_id)
            .await
            .unwrap();

        let launch = engine.lifecycle().create_swarm(swarm_id, "research browsers").await.unwrap();
        assert_eq!(launch.action_space.copied.len(), 2);

        let summary = engine.driver.run([launch.root_operation.into()]).await.unwrap();
        assert!(summary.is_clean());

        let plan = engine.completions.pop_next().await.unwrap();
        assert_eq!(plan.node_id, launch.root_node_id);
        engine
            .driver
            .resume(plan.node_id, json!("- list engines\n- ask: which OS?"))
            .await
            .unwrap();

        let mut answered = 0;
        while let Some(request) = engine.completions.pop_next().await {
            let answer = match request.blocking_type {
                BlockingType::UserInput => "linux",
                _ => "gecko, blink, webkit",
            };
            let summary = engine.driver.resume(request.node_id, json!(answer)).await.unwrap();
            assert!(summary.is_clean());
            answered += 1;
        }
        assert_eq!(answered, 2);

        let nodes = engine.repositories.nodes.list_all().await.unwrap();
        assert_eq!(nodes.len(), 3);
        let root = nodes.iter().find(|n| n.id == launch.root_node_id).unwrap();
        assert_eq!(root.status(), NodeStatus::Terminated);
        let report = root.report().unwrap();
        assert!(report.contains("list engines: gecko, blink, webkit"));
        assert!(report.contains("which OS?: linux"));
    }

    #[test]
    fn test_describe_event() {
        let event = NodeEvent::NodeFailed {
            node_id: arbor_core::domain::node::NodeId::new(),
            reason: None,
            failed_at: chrono::Utc::now(),
        };
        assert!(describe_event(&event).ends_with("no reason given"));
    }
}
