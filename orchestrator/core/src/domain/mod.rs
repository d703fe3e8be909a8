// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model of the swarm: nodes, the operations that move them through
//! their lifecycle, the metadata trees they see, and the ports (actions,
//! completion provider, repositories) the application layer drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and invariants; no I/O

pub mod action;
pub mod completion;
pub mod events;
pub mod metadata;
pub mod node;
pub mod operation;
pub mod repository;
pub mod swarm;
pub mod swarm_config;
