//! Data structures that must be filled with the input and the parameters for the DLL scan

use crate::common::{path_to_string, LookupError};
use crate::strategy::{FoundFilter, IgnoredStrategies};
use crate::system::WindowsSystem;
use fs_err as fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct LookupTarget {
    /// Path to the target executable
    pub target_exe: PathBuf,
    /// Parent directory of target_exe, cached for performance purposes
    pub app_dir: PathBuf,
    /// Working directory as it should appear in the search path
    pub working_dir: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LookupParameters {
    /// Maximum library recursion depth for the search; 0 means unlimited
    pub max_depth: usize,
    /// Folders searched after every standard location
    pub custom_folders: Vec<PathBuf>,
    /// Resolver stages to skip
    pub ignored_strategies: IgnoredStrategies,
    /// Side of the found/not-found partition emitted by the clean printer
    pub found_filter: FoundFilter,
}

/// Complete specification of a search task
#[derive(Clone, Debug, PartialEq)]
pub struct LookupQuery {
    pub system: Option<WindowsSystem>,
    pub target: LookupTarget,
    pub parameters: LookupParameters,
}

impl LookupQuery {
    /// autodetects the settings with sensible defaults
    ///
    /// The working directory will be set to the one containing the executable (i.e. the app_dir)
    pub fn deduce_from_executable_location<P: AsRef<Path>>(
        target_exe: P,
    ) -> Result<Self, LookupError> {
        let target_exe = fs::canonicalize(target_exe.as_ref())?;
        let app_dir = target_exe.parent().ok_or_else(|| {
            LookupError::ContextDeductionError(format!(
                "Could not find application directory for given executable {}",
                path_to_string(&target_exe)
            ))
        })?;

        #[cfg(windows)]
        let system = Some(WindowsSystem::current()?);
        #[cfg(not(windows))]
        let system = WindowsSystem::from_exe_location(&target_exe);

        Ok(Self {
            system,
            target: LookupTarget {
                app_dir: app_dir.to_owned(),
                working_dir: app_dir.to_owned(),
                target_exe,
            },
            parameters: LookupParameters::default(),
        })
    }

    /// Use the Windows installation mounted at `root` instead of the detected one
    pub fn set_windows_root<P: AsRef<Path>>(&mut self, root: P) -> Result<(), LookupError> {
        let system = WindowsSystem::from_root(root.as_ref()).ok_or_else(|| {
            LookupError::ContextDeductionError(format!(
                "No Windows installation found at {}",
                path_to_string(root.as_ref())
            ))
        })?;
        self.system = Some(system);
        Ok(())
    }

    /// Add user folders to the search, skipping the ones that do not exist
    pub fn add_custom_folders<I: IntoIterator<Item = PathBuf>>(&mut self, folders: I) {
        for folder in folders {
            if folder.is_dir() {
                self.parameters.custom_folders.push(folder);
            } else {
                tracing::warn!(
                    "custom folder {} does not exist, skipping",
                    folder.display()
                );
            }
        }
    }
}
