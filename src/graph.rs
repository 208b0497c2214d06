//! Recursive construction and traversal of the dependency graph of a binary

use crate::cache::{DependencyCache, ModuleKey, NodeId};
use crate::common::{file_name_of, LookupError, ResolutionError};
use crate::lookup_path::ModuleResolver;
use crate::node::{DependencyNode, ResolvedImport};
use crate::pe::ImportReader;
use crate::query::LookupParameters;
use crate::strategy::{IgnoredStrategies, SearchStrategy};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Version of the [`ModuleRecord`] layout
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// One line of a tree traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub depth: usize,
    pub node: NodeId,
    /// false if the module was already shown earlier in the same traversal
    pub expanded: bool,
}

/// Stable description of a module for structured consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub schema_version: u32,
    pub name: String,
    pub filepath: Option<PathBuf>,
    pub strategy: SearchStrategy,
    pub level: usize,
    /// Library names this module imports, in first-occurrence order
    pub imports: Vec<String>,
}

/// Dependency graph of a root binary
///
/// All modules are owned by a single cache, so a module reached through several paths is loaded
/// and resolved once, and cycles between libraries terminate.
pub struct DependencyGraph<R: ImportReader, M: ModuleResolver> {
    reader: R,
    resolver: M,
    cache: DependencyCache,
    root: NodeId,
    parameters: LookupParameters,
    visited: HashSet<ModuleKey>,
}

impl<R: ImportReader, M: ModuleResolver> DependencyGraph<R, M> {
    /// Load the root file and recursively resolve its dependencies
    pub fn build<P: AsRef<Path>>(
        reader: R,
        resolver: M,
        root_file: P,
        parameters: LookupParameters,
    ) -> Result<Self, LookupError> {
        let root_file = root_file.as_ref();
        let key = ModuleKey::new(file_name_of(root_file)?, Some(root_file.to_owned()));
        let mut cache = DependencyCache::new();
        let root = cache.get_or_create(key, SearchStrategy::Root, 0);

        let mut graph = Self {
            reader,
            resolver,
            cache,
            root,
            parameters,
            visited: HashSet::new(),
        };
        graph.load(root)?;
        graph.resolve(root)?;
        tracing::debug!(
            "dependency graph of {} has {} modules",
            root_file.display(),
            graph.cache.len()
        );
        Ok(graph)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &DependencyNode {
        self.cache.get(id)
    }

    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }

    pub fn parameters(&self) -> &LookupParameters {
        &self.parameters
    }

    /// Find a library with the configured resolver
    pub fn resolve_module(
        &self,
        name: &str,
        search_folders: &[PathBuf],
        ignored: &IgnoredStrategies,
    ) -> Result<(SearchStrategy, Option<PathBuf>), LookupError> {
        self.resolver.resolve(name, search_folders, ignored)
    }

    fn load(&mut self, id: NodeId) -> Result<(), ResolutionError> {
        let node = self.cache.get_mut(id);
        node.load(&self.reader)
            .map_err(|e| ResolutionError::new(e, node.key().location()))
    }

    /// Resolve the imports of a loaded node, then expand the newly discovered modules depth-first
    ///
    /// Resolving an already resolved node does nothing.
    fn resolve(&mut self, id: NodeId) -> Result<(), ResolutionError> {
        let node = self.cache.get(id);
        if node.is_resolved() {
            return Ok(());
        }
        let level = node.level();
        let location = node.key().location();
        let libraries: Vec<String> = node.imports().iter().map(|d| d.name.clone()).collect();

        let mut edges = Vec::with_capacity(libraries.len());
        let mut children = Vec::new();
        for library in libraries {
            let (strategy, filepath) = self
                .resolver
                .resolve(
                    &library,
                    &self.parameters.custom_folders,
                    &self.parameters.ignored_strategies,
                )
                .map_err(|e| ResolutionError::new(e, location.clone()))?;
            let key = ModuleKey::new(library.as_str(), filepath);
            let target = match self.cache.find(&key) {
                Some(target) => target,
                None => {
                    tracing::debug!(
                        "[{}] [{}] adding dependency {}",
                        level,
                        location.display(),
                        key
                    );
                    let target = self.cache.get_or_create(key, strategy, level + 1);
                    children.push(target);
                    target
                }
            };
            edges.push(ResolvedImport { library, target });
        }

        let node = self.cache.get_mut(id);
        for edge in edges {
            node.add_resolved_import(edge);
        }
        for child in &children {
            node.add_child(*child);
        }
        node.mark_resolved();

        let max_depth = self.parameters.max_depth;
        if max_depth > 0 && level + 1 >= max_depth {
            return Ok(());
        }

        for child in children {
            self.load(child)
                .and_then(|_| self.resolve(child))
                .map_err(|e| e.within(location.clone()))?;
        }
        Ok(())
    }

    /// Pre-order walk over the resolved imports, starting with the root at depth 0
    ///
    /// A module met for the second time is listed once more but not expanded.
    pub fn tree_walk(&mut self) -> Vec<TreeEntry> {
        self.visited.clear();
        self.visited.insert(self.cache.get(self.root).key().clone());
        let mut entries = vec![TreeEntry {
            depth: 0,
            node: self.root,
            expanded: true,
        }];
        self.walk_from(self.root, 0, &mut entries);
        entries
    }

    fn walk_from(&mut self, id: NodeId, depth: usize, entries: &mut Vec<TreeEntry>) {
        let targets: Vec<NodeId> = self
            .cache
            .get(id)
            .resolved_imports()
            .iter()
            .map(|ri| ri.target)
            .collect();
        for target in targets {
            let first_visit = self.visited.insert(self.cache.get(target).key().clone());
            entries.push(TreeEntry {
                depth: depth + 1,
                node: target,
                expanded: first_visit,
            });
            if first_visit {
                self.walk_from(target, depth + 1, entries);
            }
        }
    }

    /// Every module of the graph, ordered by search strategy and then by name
    pub fn modules(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.cache.iter().map(|(id, _)| id).collect();
        ids.sort_by(|a, b| {
            let (a, b) = (self.cache.get(*a), self.cache.get(*b));
            (a.strategy(), a.name()).cmp(&(b.strategy(), b.name()))
        });
        ids
    }

    fn matches_filter(&self, id: NodeId) -> bool {
        self.parameters
            .found_filter
            .matches(self.cache.get(id).strategy())
    }

    /// Locations of the edges met during a tree walk that pass the found/not-found filter
    pub fn clean_chain(&mut self) -> Vec<PathBuf> {
        self.tree_walk()
            .into_iter()
            .skip(1)
            .filter(|e| self.matches_filter(e.node))
            .map(|e| self.cache.get(e.node).key().location())
            .collect()
    }

    /// Locations of every resolved import edge that passes the found/not-found filter,
    /// grouped by importing module in [`modules`](Self::modules) order
    pub fn clean_modules(&self) -> Vec<PathBuf> {
        self.modules()
            .into_iter()
            .flat_map(|id| self.cache.get(id).resolved_imports().iter())
            .filter(|ri| self.matches_filter(ri.target))
            .map(|ri| self.cache.get(ri.target).key().location())
            .collect()
    }

    /// Versioned records of every module, in [`modules`](Self::modules) order
    pub fn records(&self) -> Vec<ModuleRecord> {
        self.modules()
            .into_iter()
            .map(|id| {
                let node = self.cache.get(id);
                ModuleRecord {
                    schema_version: RECORD_SCHEMA_VERSION,
                    name: node.name().to_owned(),
                    filepath: node.filepath().map(Path::to_owned),
                    strategy: node.strategy(),
                    level: node.level(),
                    imports: node
                        .resolved_imports()
                        .iter()
                        .map(|ri| ri.library.clone())
                        .collect(),
                }
            })
            .collect()
    }
}
