// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Arbor CLI

pub mod config;
pub mod node;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::node::NodeCommand;
pub use self::run::RunArgs;
