// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod completion_queue;
pub mod db;
pub mod event_bus;
pub mod repositories;

pub use completion_queue::PendingCompletionQueue;
pub use event_bus::EventBus;
