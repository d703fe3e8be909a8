// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Action Registry
//!
//! Explicit map from `(action_id, platform)` to the [`Action`] implementing
//! it, populated at start-up. Resolution prefers a registration for the
//! requested platform and falls back to the platform-agnostic one, then
//! collects the configuration values the action declared as required.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::action::Action;
use crate::domain::swarm::Platform;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no action registered for '{action_id}'")]
    NotRegistered { action_id: String },

    #[error("action '{action_id}' requires configuration value '{key}'")]
    MissingConfig { action_id: String, key: String },
}

pub struct ActionRegistration {
    action_id: String,
    platform: Option<Platform>,
    action: Arc<dyn Action>,
    required_configs: Vec<String>,
}

impl ActionRegistration {
    pub fn new(action_id: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            action_id: action_id.into(),
            platform: None,
            action,
            required_configs: Vec::new(),
        }
    }

    /// Bind this implementation to one platform only.
    pub fn on_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_configs.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// A resolved action with its injected configuration.
#[derive(Clone)]
pub struct ResolvedAction {
    pub action: Arc<dyn Action>,
    pub configs: HashMap<String, String>,
}

#[derive(Default)]
pub struct ActionRegistry {
    entries: HashMap<(String, Option<Platform>), ActionRegistration>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: ActionRegistration) -> &mut Self {
        debug!(
            action_id = %registration.action_id,
            platform = ?registration.platform,
            "Registering action"
        );
        self.entries.insert(
            (registration.action_id.clone(), registration.platform),
            registration,
        );
        self
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.entries.keys().any(|(id, _)| id == action_id)
    }

    /// Registered action ids, sorted and deduplicated across platforms.
    pub fn action_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn resolve(
        &self,
        action_id: &str,
        platform: Platform,
        configs: &HashMap<String, String>,
    ) -> Result<ResolvedAction, ResolveError> {
        let registration = self
            .entries
            .get(&(action_id.to_string(), Some(platform)))
            .or_else(|| self.entries.get(&(action_id.to_string(), None)))
            .ok_or_else(|| ResolveError::NotRegistered {
                action_id: action_id.to_string(),
            })?;

        let mut injected = HashMap::with_capacity(registration.required_configs.len());
        for key in &registration.required_configs {
            match configs.get(key) {
                Some(value) if !value.is_empty() => {
                    injected.insert(key.clone(), value.clone());
                }
                _ => {
                    return Err(ResolveError::MissingConfig {
                        action_id: action_id.to_string(),
                        key: key.clone(),
                    })
                }
            }
        }

        Ok(ResolvedAction {
            action: Arc::clone(&registration.action),
            configs: injected,
        })
    }
}
