// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod action_registry;
pub mod dispatcher;
pub mod portal_clone;
pub mod repository_factory;
pub mod swarm_driver;
pub mod swarm_lifecycle;

// Handlers of `OperationDispatcher`
mod blocking;
mod continuation;
mod failure;
mod spawn;
mod termination;

pub use action_registry::{ActionRegistration, ActionRegistry, ResolveError, ResolvedAction};
pub use dispatcher::{DispatchError, DispatchSettings, OperationDispatcher};
pub use portal_clone::{PortalCloneError, PortalCloneReport, PortalCloner, PortalTree};
pub use repository_factory::{create_repositories, SwarmRepositories};
pub use swarm_driver::{DispatchFailure, DriveSummary, SwarmDriver};
pub use swarm_lifecycle::{LifecycleError, SwarmLaunch, SwarmLifecycle};
