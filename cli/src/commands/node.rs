// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node inspection and control commands
//!
//! Commands: node show|tree, resume, terminate. They work against the
//! configured store; with the in-memory backend there is nothing to inspect
//! outside of a running `arbor run`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use arbor_core::application::DriveSummary;
use arbor_core::domain::node::{Node, NodeId, NodeStatus};
use arbor_core::domain::operation::TerminationOperation;
use arbor_core::domain::repository::StorageBackend;
use arbor_core::domain::swarm::SwarmId;
use arbor_core::domain::swarm_config::SwarmConfig;

use crate::embedded::EmbeddedEngine;

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Show one node as JSON
    Show {
        #[arg(value_name = "NODE_ID", value_parser = parse_node_id)]
        node_id: NodeId,
    },

    /// Print node trees
    Tree {
        /// Only the subtree below this node
        #[arg(long, value_parser = parse_node_id)]
        root: Option<NodeId>,
    },
}

pub fn parse_node_id(value: &str) -> Result<NodeId, String> {
    NodeId::from_string(value).map_err(|e| format!("invalid node id '{}': {}", value, e))
}

pub async fn handle_command(command: NodeCommand, config_path: Option<PathBuf>) -> Result<()> {
    let engine = persistent_engine(config_path, None).await?;
    let nodes = engine.repositories.nodes.list_all().await?;

    match command {
        NodeCommand::Show { node_id } => {
            let Some(node) = nodes.iter().find(|n| n.id == node_id) else {
                bail!("Node {} not found", node_id);
            };
            println!("{}", serde_json::to_string_pretty(node)?);
        }
        NodeCommand::Tree { root } => {
            if nodes.is_empty() {
                println!("{}", "No nodes found".yellow());
                return Ok(());
            }
            print_forest(&nodes, root);
        }
    }
    Ok(())
}

/// Deliver a completion result to a blocked node and drive what follows.
pub async fn resume(
    node_id: NodeId,
    result: String,
    swarm_id: Option<SwarmId>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let engine = persistent_engine(config_path, swarm_id).await?;
    // Accept JSON, fall back to a plain string.
    let result = serde_json::from_str::<Value>(&result).unwrap_or(Value::String(result));

    let summary = engine
        .driver
        .resume(node_id, result)
        .await
        .with_context(|| format!("Failed to resume node {}", node_id))?;

    println!("{}", format!("✓ Node {} resumed", node_id).green());
    print_summary(&summary);
    print_pending(&engine).await;
    Ok(())
}

pub async fn terminate(
    node_id: NodeId,
    by: Option<NodeId>,
    report: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let engine = persistent_engine(config_path, None).await?;

    let mut op = TerminationOperation::new(by.unwrap_or(node_id), node_id);
    if let Some(report) = report {
        op = op.with_report(report);
    }

    let summary = engine
        .driver
        .run([op.into()])
        .await
        .with_context(|| format!("Failed to terminate node {}", node_id))?;

    println!("{}", format!("✓ Node {} terminated", node_id).green());
    print_summary(&summary);
    print_pending(&engine).await;
    Ok(())
}

async fn persistent_engine(config_path: Option<PathBuf>, swarm_id: Option<SwarmId>) -> Result<EmbeddedEngine> {
    let config = SwarmConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    if matches!(config.storage_backend(), StorageBackend::InMemory) {
        bail!("This command needs a persistent store. Set spec.storage.backend to postgres or ARBOR_DATABASE_URL.");
    }
    EmbeddedEngine::from_config(config, swarm_id.unwrap_or_default()).await
}

pub fn print_summary(summary: &DriveSummary) {
    println!(
        "  {} operations dispatched, {} nodes spawned",
        summary.dispatched,
        summary.spawned.len()
    );
    for failure in &summary.failures {
        let node = failure.node_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} on {}: {}",
            "✗".red(),
            failure.operation_type,
            node,
            failure.error
        );
    }
}

/// Completions requested during this invocation. Against a persistent store
/// they stay visible as blocked nodes and can be answered with `arbor resume`.
async fn print_pending(engine: &EmbeddedEngine) {
    for request in engine.completions.list_pending().await {
        println!(
            "  {} {} waits on {}: {}",
            "…".yellow(),
            request.node_id,
            request.blocking_type,
            request.args
        );
    }
}

fn status_label(status: NodeStatus) -> colored::ColoredString {
    match status {
        NodeStatus::Running => status.to_string().green(),
        NodeStatus::Blocked => status.to_string().yellow(),
        NodeStatus::Terminated => status.to_string().dimmed(),
        NodeStatus::Failed => status.to_string().red(),
    }
}

/// Print every tree in `nodes`, or only the subtree under `root`.
pub fn print_forest(nodes: &[Node], root: Option<NodeId>) {
    let by_id: HashMap<NodeId, &Node> = nodes.iter().map(|n| (n.id, n)).collect();
    let roots: Vec<NodeId> = match root {
        Some(id) => vec![id],
        None => nodes.iter().filter(|n| n.is_root()).map(|n| n.id).collect(),
    };

    let mut stack: Vec<(NodeId, usize)> = roots.into_iter().rev().map(|id| (id, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        let Some(node) = by_id.get(&id) else {
            println!("{}{} {}", indent, id, "(missing)".red());
            continue;
        };

        println!(
            "{}{} [{}] {} {}",
            indent,
            node.action_id.bold(),
            status_label(node.status()),
            node.message,
            id.to_string().dimmed()
        );
        if let Some(report) = node.report() {
            println!("{}  ↳ {}", indent, report.replace('\n', &format!("\n{}    ", indent)));
        }
        if let Some(reason) = node.failure_reason() {
            println!("{}  ↳ {}", indent, reason.red());
        }

        stack.extend(node.children_ids().iter().rev().map(|child| (*child, depth + 1)));
    }
}
