//! Per-module resolution state

use crate::cache::{ModuleKey, NodeId};
use crate::common::LookupError;
use crate::pe::{ImportDll, ImportReader};
use crate::strategy::SearchStrategy;
use std::path::Path;

/// Progress of a node; it only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolutionState {
    Created,
    ImportsLoaded,
    Resolved,
}

/// Edge from a module to the module one of its imported libraries resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Library name as written in the import table
    pub library: String,
    pub target: NodeId,
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    key: ModuleKey,
    strategy: SearchStrategy,
    level: usize,
    imports: Vec<ImportDll>,
    resolved_imports: Vec<ResolvedImport>,
    children: Vec<NodeId>,
    state: ResolutionState,
}

impl DependencyNode {
    pub(crate) fn new(key: ModuleKey, strategy: SearchStrategy, level: usize) -> Self {
        Self {
            key,
            strategy,
            level,
            imports: Vec::new(),
            resolved_imports: Vec::new(),
            children: Vec::new(),
            state: ResolutionState::Created,
        }
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.key.filepath()
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Distance from the root at creation time
    pub fn level(&self) -> usize {
        self.level
    }

    /// Raw import descriptors, in table order
    pub fn imports(&self) -> &[ImportDll] {
        &self.imports
    }

    /// One edge per imported library name, in first-occurrence order
    pub fn resolved_imports(&self) -> &[ResolvedImport] {
        &self.resolved_imports
    }

    /// Modules first discovered while resolving this node
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ResolutionState::Resolved
    }

    /// Read the import table of the module's file
    ///
    /// Modules that were not found have nothing to read. Loading again re-reads the file.
    pub fn load(&mut self, reader: &dyn ImportReader) -> Result<(), LookupError> {
        if let Some(path) = self.key.filepath() {
            self.imports = reader.read_imports(path)?;
            self.state = self.state.max(ResolutionState::ImportsLoaded);
        }
        Ok(())
    }

    /// Record an edge unless one for the same library name already exists
    pub(crate) fn add_resolved_import(&mut self, edge: ResolvedImport) {
        if !self
            .resolved_imports
            .iter()
            .any(|ri| ri.library == edge.library)
        {
            self.resolved_imports.push(edge);
        }
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn mark_resolved(&mut self) {
        self.state = ResolutionState::Resolved;
    }
}
