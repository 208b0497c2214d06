extern crate thiserror;

pub mod apiset;
pub mod cache;
pub mod common;
pub mod graph;
#[cfg(windows)]
pub mod knowndlls;
pub mod logger;
pub mod lookup_path;
pub mod node;
pub mod pe;
pub mod query;
pub mod render;
pub mod strategy;
pub mod sxs;
pub mod system;

pub use cache::{DependencyCache, ModuleKey, NodeId};
pub use common::{decanonicalize, path_to_string};
pub use common::{LookupError, ResolutionError};
pub use graph::{DependencyGraph, ModuleRecord, TreeEntry};
pub use lookup_path::{LookupPath, ModuleResolver};
pub use node::{DependencyNode, ResolutionState};
pub use pe::{ImportReader, PEImportReader};
pub use query::LookupQuery;
pub use strategy::{FoundFilter, IgnoredStrategies, SearchStrategy};
