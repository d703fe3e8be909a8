// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Arbor CLI
//!
//! The `arbor` binary drives swarms of action nodes.
//!
//! ## Commands
//!
//! - `arbor run --goal <GOAL>` - Create a swarm and drive it, answering completions from stdin
//! - `arbor node show|tree` - Inspect nodes in the configured store
//! - `arbor resume <NODE_ID> --result <RESULT>` - Deliver a completion to a blocked node
//! - `arbor terminate <NODE_ID>` - Terminate a node
//! - `arbor config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use arbor_cli::commands::node::parse_node_id;
use arbor_cli::commands::{self, ConfigCommand, NodeCommand, RunArgs};
use arbor_core::domain::node::NodeId;
use arbor_core::domain::swarm::SwarmId;

/// Arbor - swarm operation dispatcher
#[derive(Parser)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "ARBOR_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ARBOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a swarm for a goal and drive it to completion
    #[command(name = "run")]
    Run(RunArgs),

    /// Inspect nodes
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Resume a blocked node with a completion result
    #[command(name = "resume")]
    Resume {
        #[arg(value_name = "NODE_ID", value_parser = parse_node_id)]
        node_id: NodeId,

        /// Result handed to the node's continuation (JSON or plain text)
        #[arg(short, long)]
        result: String,

        /// Swarm the node belongs to, passed on to its actions
        #[arg(long, value_parser = parse_swarm_id)]
        swarm: Option<SwarmId>,
    },

    /// Terminate a node (and its subtree, if its policy is cascading)
    #[command(name = "terminate")]
    Terminate {
        #[arg(value_name = "NODE_ID", value_parser = parse_node_id)]
        node_id: NodeId,

        /// Node requesting the termination; it is told once the target concludes
        #[arg(long, value_parser = parse_node_id)]
        by: Option<NodeId>,

        /// Report recorded on the terminated node
        #[arg(long)]
        report: Option<String>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config).await,
        Some(Commands::Node { command }) => commands::node::handle_command(command, cli.config).await,
        Some(Commands::Resume { node_id, result, swarm }) => {
            commands::node::resume(node_id, result, swarm, cli.config).await
        }
        Some(Commands::Terminate { node_id, by, report }) => {
            commands::node::terminate(node_id, by, report, cli.config).await
        }
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

fn parse_swarm_id(value: &str) -> Result<SwarmId, String> {
    SwarmId::from_string(value).map_err(|e| format!("invalid swarm id '{}': {}", value, e))
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
