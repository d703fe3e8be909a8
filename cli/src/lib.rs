// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Arbor CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Builtin actions, embedded engine wiring and CLI commands

pub mod actions;
pub mod commands;
pub mod embedded;
