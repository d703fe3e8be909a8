// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Metadata Tree
//!
//! The action and memory namespaces a swarm sees are trees of
//! [`MetadataNode`]s. A shared base tree is immutable; each swarm instance gets
//! its own shadow copies of the `portal` nodes only (see
//! `application::portal_clone`), so instance-local attachments never leak into
//! the base.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::node::NodeId;
use crate::domain::swarm::SwarmId;

/// Id of the node every metadata tree walk starts from.
pub const METADATA_ROOT_ID: &str = "root";

/// Id under which a swarm instance stores its shadow copy of `node_id`.
pub fn shadow_id(swarm_id: &SwarmId, node_id: &str) -> String {
    format!("{swarm_id}_{node_id}")
}

/// Which metadata tree (collection) a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataTreeKind {
    Action,
    Memory,
}

impl MetadataTreeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataTreeKind::Action => "action_space",
            MetadataTreeKind::Memory => "memory_space",
        }
    }
}

impl fmt::Display for MetadataTreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataNodeType {
    /// Attachment point; shadow-copied per swarm instance.
    Portal,
    Folder,
    Action,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: MetadataNodeType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    /// Type-specific fields carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataNode {
    pub fn new(id: impl Into<String>, node_type: MetadataNodeType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            description: String::new(),
            parent_id: None,
            children_ids: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children_ids = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_portal(&self) -> bool {
        self.node_type == MetadataNodeType::Portal
    }

    /// Action id of an `action` node, stored under the `action_id` extra field.
    pub fn action_id(&self) -> Option<&str> {
        self.extra.get("action_id").and_then(Value::as_str)
    }

    /// Append a child id, ignoring duplicates.
    pub fn attach_child(&mut self, child_id: impl Into<String>) {
        let child_id = child_id.into();
        if !self.children_ids.contains(&child_id) {
            self.children_ids.push(child_id);
        }
    }
}

/// Memory written by a node into the swarm's memory tree.
pub fn memory_node(id: impl Into<String>, author: NodeId, name: impl Into<String>, content: Value) -> MetadataNode {
    MetadataNode::new(id, MetadataNodeType::Memory, name)
        .with_extra("author_node_id", Value::String(author.to_string()))
        .with_extra("content", content)
}
