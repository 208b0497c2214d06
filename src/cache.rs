//! Identity of modules and the store guaranteeing each one is processed once

use crate::node::DependencyNode;
use crate::strategy::SearchStrategy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a module in the graph
///
/// Two imports denote the same module if both the library name and the file it resolved to are
/// equal. Unresolved imports with the same name therefore share a single key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleKey {
    pub name: String,
    pub filepath: Option<PathBuf>,
}

impl ModuleKey {
    pub fn new<S: Into<String>>(name: S, filepath: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            filepath,
        }
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    /// The file path if the module was found, its name otherwise
    pub fn location(&self) -> PathBuf {
        self.filepath
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filepath {
            Some(p) => write!(f, "{} ({})", self.name, p.display()),
            None => write!(f, "{} (not found)", self.name),
        }
    }
}

/// Handle to a node stored in a [`DependencyCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Store of every module met while building a graph, indexed by identity
///
/// Nodes are never removed and their identity never changes, so a [`NodeId`] stays valid for the
/// lifetime of the cache.
#[derive(Debug, Default)]
pub struct DependencyCache {
    index: HashMap<ModuleKey, NodeId>,
    nodes: Vec<DependencyNode>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node for `key`, creating it with the given strategy and level if it is new
    ///
    /// The strategy and level of an existing node are left untouched.
    pub fn get_or_create(
        &mut self,
        key: ModuleKey,
        strategy: SearchStrategy,
        level: usize,
    ) -> NodeId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes
            .push(DependencyNode::new(key.clone(), strategy, level));
        self.index.insert(key, id);
        id
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn find(&self, key: &ModuleKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn get(&self, id: NodeId) -> &DependencyNode {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DependencyNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i), node))
    }
}
