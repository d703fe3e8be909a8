// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Arbor core: the operation dispatch and node-lifecycle engine.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - `domain`: nodes, operations, metadata trees and the ports around them
//! - `application`: dispatcher and handlers, portal clone, swarm bootstrap
//! - `infrastructure`: repositories, event bus, completion queue

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
