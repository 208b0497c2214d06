//! Mechanisms through which the loader maps a library name to a file

use crate::common::LookupError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How a module was found, in the order the loader tries the mechanisms
///
/// The derived ordering follows the declaration order and is used to sort module listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStrategy {
    /// The analyzed file itself
    Root,
    KnownDll,
    ApiSet,
    Sxs,
    ApplicationDirectory,
    /// System32 (or the Windows directory)
    SystemDirectory,
    /// SysWOW64, for 32-bit binaries on a 64-bit system
    SystemDirectoryX86,
    WorkingDirectory,
    EnvironmentPath,
    CustomFolder,
    NotFound,
}

impl SearchStrategy {
    pub const ALL: [SearchStrategy; 11] = [
        Self::Root,
        Self::KnownDll,
        Self::ApiSet,
        Self::Sxs,
        Self::ApplicationDirectory,
        Self::SystemDirectory,
        Self::SystemDirectoryX86,
        Self::WorkingDirectory,
        Self::EnvironmentPath,
        Self::CustomFolder,
        Self::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "ROOT",
            Self::KnownDll => "KNOWN_DLL",
            Self::ApiSet => "API_SET",
            Self::Sxs => "SXS",
            Self::ApplicationDirectory => "APPLICATION_DIRECTORY",
            Self::SystemDirectory => "SYSTEM_DIRECTORY",
            Self::SystemDirectoryX86 => "SYSTEM_DIRECTORY_X86",
            Self::WorkingDirectory => "WORKING_DIRECTORY",
            Self::EnvironmentPath => "ENVIRONMENT_PATH",
            Self::CustomFolder => "CUSTOM_FOLDER",
            Self::NotFound => "NOT_FOUND",
        }
    }

    pub fn is_found(&self) -> bool {
        *self != Self::NotFound
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| {
                LookupError::ParseError(format!(
                    "Unknown search strategy {}, expected one of {}",
                    wanted,
                    Self::ALL.map(|st| st.as_str()).join(", ")
                ))
            })
    }
}

/// Search strategies the resolver must skip, for "what-if" analyses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoredStrategies(BTreeSet<SearchStrategy>);

impl IgnoredStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `;`-separated list of strategy names; empty items are skipped
    pub fn parse_list(s: &str) -> Result<Self, LookupError> {
        s.split(';')
            .filter(|item| !item.trim().is_empty())
            .map(SearchStrategy::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, strategy: SearchStrategy) -> bool {
        self.0.contains(&strategy)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which side of the found/not-found partition the clean printer emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoundFilter {
    #[default]
    Found,
    NotFound,
}

impl FoundFilter {
    pub fn from_found_or_not(found: bool) -> Self {
        if found {
            Self::Found
        } else {
            Self::NotFound
        }
    }

    pub fn matches(&self, strategy: SearchStrategy) -> bool {
        match self {
            Self::Found => strategy.is_found(),
            Self::NotFound => !strategy.is_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FoundFilter, IgnoredStrategies, SearchStrategy};
    use crate::common::LookupError;
    use std::str::FromStr;

    #[test]
    fn strategies_sort_in_loader_order() {
        let mut shuffled = vec![
            SearchStrategy::NotFound,
            SearchStrategy::SystemDirectory,
            SearchStrategy::Root,
            SearchStrategy::ApiSet,
            SearchStrategy::CustomFolder,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![
                SearchStrategy::Root,
                SearchStrategy::ApiSet,
                SearchStrategy::SystemDirectory,
                SearchStrategy::CustomFolder,
                SearchStrategy::NotFound,
            ]
        );
        assert_eq!(SearchStrategy::ALL.last(), Some(&SearchStrategy::NotFound));
    }

    #[test]
    fn names_round_trip() -> Result<(), LookupError> {
        for st in SearchStrategy::ALL {
            assert_eq!(SearchStrategy::from_str(st.as_str())?, st);
        }
        assert_eq!(
            SearchStrategy::from_str("known_dll")?,
            SearchStrategy::KnownDll
        );
        assert!(SearchStrategy::from_str("REGISTRY").is_err());
        assert_eq!(
            serde_json::to_string(&SearchStrategy::SystemDirectoryX86).unwrap(),
            "\"SYSTEM_DIRECTORY_X86\""
        );
        Ok(())
    }

    #[test]
    fn parse_ignored_list() -> Result<(), LookupError> {
        let ignored = IgnoredStrategies::parse_list("KNOWN_DLL;;API_SET")?;
        assert!(ignored.contains(SearchStrategy::KnownDll));
        assert!(ignored.contains(SearchStrategy::ApiSet));
        assert!(!ignored.contains(SearchStrategy::Sxs));
        assert!(IgnoredStrategies::parse_list("KNOWN_DLL;BOGUS").is_err());
        assert!(IgnoredStrategies::parse_list("")?.is_empty());
        Ok(())
    }

    #[test]
    fn found_filter_partitions() {
        for st in SearchStrategy::ALL {
            assert_ne!(
                FoundFilter::Found.matches(st),
                FoundFilter::NotFound.matches(st)
            );
        }
        assert!(FoundFilter::NotFound.matches(SearchStrategy::NotFound));
        assert_eq!(FoundFilter::from_found_or_not(true), FoundFilter::Found);
    }
}
