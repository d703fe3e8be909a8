// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arbor_core::domain::repository::StorageBackend;
use arbor_core::domain::swarm_config::SwarmConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./arbor-config.yaml)
        #[arg(short, long, default_value = "./arbor-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = SwarmConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. ARBOR_CONFIG_PATH: {}",
            std::env::var("ARBOR_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./arbor-config.yaml");
        println!("  4. ~/.arbor/config.yaml");
        println!("  5. /etc/arbor/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Swarm:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!("  Platform: {}", config.spec.platform);
    println!("  Root action: {}", config.spec.root_action_id);
    println!("  Root termination policy: {:?}", config.spec.root_termination_policy);
    println!();

    println!("{}", "Action configs:".bold());
    if config.spec.configs.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    let mut keys: Vec<&String> = config.spec.configs.keys().collect();
    keys.sort();
    for key in keys {
        // Values are often credentials.
        println!("  {} = {}", key, "********".dimmed());
    }
    println!();

    println!("{}", "Storage:".bold());
    match config.storage_backend() {
        StorageBackend::InMemory => println!("  Backend: in-memory"),
        StorageBackend::PostgreSQL(_) => {
            println!("  Backend: postgres");
            println!("  Max connections: {}", config.spec.storage.max_connections);
        }
    }
    println!("  CAS attempts: {}", config.spec.dispatch.max_update_attempts);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = SwarmConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("arbor-config.yaml");

        generate(output.clone(), true).await.unwrap();

        let config = SwarmConfig::from_yaml_file(&output).unwrap();
        assert_eq!(config.metadata.name, "browser-research");
        assert!(matches!(config.storage_backend(), StorageBackend::PostgreSQL(_)));
    }

    #[test]
    fn test_templates_are_valid_configs() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = SwarmConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }
}
