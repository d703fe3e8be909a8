// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `arbor run`: create a swarm for a goal and drive it to completion,
//! answering every completion request from the terminal.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use arbor_core::application::{create_repositories, SwarmRepositories};
use arbor_core::domain::completion::CompletionRequest;
use arbor_core::domain::node::BlockingType;
use arbor_core::domain::swarm::SwarmId;
use arbor_core::domain::swarm_config::SwarmConfig;

use crate::commands::node::{print_forest, print_summary};
use crate::embedded::EmbeddedEngine;

#[derive(Args)]
pub struct RunArgs {
    /// Goal handed to the root node
    #[arg(short, long)]
    pub goal: String,

    /// Use the configured storage backend instead of in-memory storage
    #[arg(long)]
    pub persist: bool,

    /// Print node events as they happen
    #[arg(long)]
    pub events: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = SwarmConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let repositories = if args.persist {
        create_repositories(&config).await?
    } else {
        SwarmRepositories::in_memory()
    };

    let swarm_id = SwarmId::new();
    let engine = EmbeddedEngine::new(config, repositories, swarm_id).await?;
    let event_log = args.events.then(|| engine.follow_events());

    let launch = engine
        .lifecycle()
        .create_swarm(swarm_id, &args.goal)
        .await
        .context("Failed to create swarm")?;
    info!(swarm_id = %swarm_id, root_node_id = %launch.root_node_id, "Driving swarm");
    println!("{} {}", "Swarm".bold(), swarm_id);

    let summary = engine.driver.run([launch.root_operation.into()]).await?;
    print_summary(&summary);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(request) = engine.completions.pop_next().await {
        prompt(&request);
        let Some(line) = lines.next_line().await.context("Failed to read answer")? else {
            warn!(node_id = %request.node_id, "Input closed with completions outstanding");
            break;
        };

        let summary = engine
            .driver
            .resume(request.node_id, Value::String(line.trim().to_string()))
            .await?;
        print_summary(&summary);
    }

    println!();
    let nodes = engine.repositories.nodes.list_all().await?;
    print_forest(&nodes, Some(launch.root_node_id));

    if let Some(handle) = event_log {
        handle.abort();
    }
    Ok(())
}

fn prompt(request: &CompletionRequest) {
    let text = request
        .args
        .get("prompt")
        .or_else(|| request.args.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| request.args.to_string());

    let label = match request.blocking_type {
        BlockingType::UserInput => "question".cyan(),
        _ => "completion".magenta(),
    };
    println!();
    println!("[{}] {}", label, text);
    println!("{}", format!("node {}", request.node_id).dimmed());
    print!("> ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}
