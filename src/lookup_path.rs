use crate::apiset;
use crate::common::LookupError;
use crate::query::LookupQuery;
use crate::strategy::{IgnoredStrategies, SearchStrategy};
use crate::sxs::SxsEntries;
use crate::system::{KnownDLLList, WinFileSystemCache, WindowsSystem};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Maps a library name to a file, following some search order
pub trait ModuleResolver {
    /// Find `name`, also looking into `search_folders` and skipping the `ignored` stages
    ///
    /// A library that cannot be found is reported as `NotFound` with no path.
    fn resolve(
        &self,
        name: &str,
        search_folders: &[PathBuf],
        ignored: &IgnoredStrategies,
    ) -> Result<(SearchStrategy, Option<PathBuf>), LookupError>;
}

/// Directory/set of DLLs to be searched, and relative metadata
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum LookupPathEntry {
    /// The DLL is implicitely loaded by the OS for every process, and not looked up every time
    KnownDLLs,
    /// Virtual library names redirected to their host DLL
    ApiSet,
    /// Libraries declared in the application manifest
    Sxs,
    /// Directory where the root executable sits
    ExecutableDir(PathBuf),
    /// Windows System directory (typically C:\Windows\System32)
    SystemDir(PathBuf),
    // SystemDir16, // ignored
    /// Windows directory (typically C:\Windows)
    WindowsDir(PathBuf),
    /// System directory of 32-bit processes on 64-bit Windows (C:\Windows\SysWOW64)
    SystemDirX86(PathBuf),
    /// Working directory of the (virtual) process whose DLL lookup we are simulating
    WorkingDir(PathBuf),
    /// PATH as specified by the system (value PATH variable in the shell executing the process)
    SystemPath(PathBuf),
}

impl LookupPathEntry {
    pub fn strategy(&self) -> SearchStrategy {
        match self {
            Self::KnownDLLs => SearchStrategy::KnownDll,
            Self::ApiSet => SearchStrategy::ApiSet,
            Self::Sxs => SearchStrategy::Sxs,
            Self::ExecutableDir(_) => SearchStrategy::ApplicationDirectory,
            Self::SystemDir(_) | Self::WindowsDir(_) => SearchStrategy::SystemDirectory,
            Self::SystemDirX86(_) => SearchStrategy::SystemDirectoryX86,
            Self::WorkingDir(_) => SearchStrategy::WorkingDirectory,
            Self::SystemPath(_) => SearchStrategy::EnvironmentPath,
        }
    }

    pub(crate) fn get_path(&self) -> Option<&Path> {
        match self {
            // we have a fixed list, no need to scan
            Self::KnownDLLs | Self::ApiSet | Self::Sxs => None,
            // else
            Self::ExecutableDir(p)
            | Self::SystemDir(p)
            | Self::WindowsDir(p)
            | Self::SystemDirX86(p)
            | Self::WorkingDir(p)
            | Self::SystemPath(p) => Some(p),
        }
    }
}

/// Sorted list of locations to be looked up when searching for a DLL
///
/// It is built from a query, depending on the current system configuration (availability of a
/// Windows root, and its configuration that influences the lookup) and on the architecture of the
/// analyzed binary. Custom folders are provided at each lookup and searched last.
pub struct LookupPath {
    pub entries: Vec<LookupPathEntry>,
    system: Option<WindowsSystem>,
    sxs: SxsEntries,
    x86: bool,
    fs_cache: RefCell<WinFileSystemCache>,
}

impl LookupPath {
    /// `x86` selects the search order of a 32-bit process running on 64-bit Windows
    pub fn new(query: &LookupQuery, sxs: SxsEntries, x86: bool) -> Self {
        let target = &query.target;
        let entries = if let Some(system) = &query.system {
            let wow64 = system.sys_wow64_dir.as_ref().filter(|_| x86);
            let knowndlls_entry = if Self::known_dlls_of(system, x86).is_some() {
                vec![LookupPathEntry::KnownDLLs]
            } else {
                vec![]
            };
            let apiset_entry = if system.apiset_map.is_some() {
                vec![LookupPathEntry::ApiSet]
            } else {
                vec![]
            };
            let system_entries = vec![
                match wow64 {
                    Some(wow64) => LookupPathEntry::SystemDirX86(wow64.clone()),
                    None => LookupPathEntry::SystemDir(system.sys_dir.clone()),
                },
                // 16-bit system directory ignored
                LookupPathEntry::WindowsDir(system.win_dir.clone()),
            ];
            let system_path = system
                .system_path
                .iter()
                .flatten()
                .map(|p| LookupPathEntry::SystemPath(p.clone()))
                .collect::<Vec<_>>();

            if system.safe_dll_search_mode_on.unwrap_or(true) {
                // default mode (assume if not specified)
                [
                    knowndlls_entry,
                    apiset_entry,
                    vec![LookupPathEntry::Sxs],
                    vec![LookupPathEntry::ExecutableDir(target.app_dir.clone())],
                    system_entries,
                    vec![LookupPathEntry::WorkingDir(target.working_dir.clone())],
                    system_path,
                ]
                .concat()
            } else {
                // if HKEY_LOCAL_MACHINE\System\CurrentControlSet\Control\Session Manager\SafeDllSearchMode is 0
                [
                    knowndlls_entry,
                    apiset_entry,
                    vec![
                        LookupPathEntry::Sxs,
                        LookupPathEntry::ExecutableDir(target.app_dir.clone()),
                        LookupPathEntry::WorkingDir(target.working_dir.clone()),
                    ],
                    system_entries,
                    system_path,
                ]
                .concat()
            }
        } else {
            vec![
                LookupPathEntry::Sxs,
                LookupPathEntry::ExecutableDir(target.app_dir.clone()),
                LookupPathEntry::WorkingDir(target.working_dir.clone()),
            ]
        };

        Self {
            entries,
            system: query.system.clone(),
            sxs,
            x86,
            fs_cache: RefCell::new(WinFileSystemCache::new()),
        }
    }

    fn known_dlls_of(system: &WindowsSystem, x86: bool) -> Option<&KnownDLLList> {
        if x86 && system.sys_wow64_dir.is_some() {
            system.known_dlls_x86.as_ref()
        } else {
            system.known_dlls.as_ref()
        }
    }

    /// linearize the lookup context into a single vector of directories
    pub fn search_path(&self) -> Vec<&Path> {
        self.entries.iter().filter_map(|e| e.get_path()).collect()
    }

    fn search_dll_in_known_dlls(&self, library: &str) -> Option<PathBuf> {
        self.system
            .as_ref()
            .and_then(|s| Self::known_dlls_of(s, self.x86))
            .and_then(|kd| kd.search_dll_in_known_dlls(library))
    }

    /// API set: return the location of the first host DLL present in the system directory
    fn search_dll_in_apiset_map(&self, library: &str) -> Option<PathBuf> {
        let system = self.system.as_ref()?;
        let hosts = apiset::lookup_apiset(system.apiset_map.as_ref()?, library)?;
        let host_dir = match (&system.sys_wow64_dir, self.x86) {
            (Some(wow64), true) => wow64,
            _ => &system.sys_dir,
        };
        hosts
            .iter()
            .find_map(|host| self.search_file_in_folder(host, host_dir))
    }

    fn search_file_in_folder<P: AsRef<Path>>(&self, filename: &str, p: P) -> Option<PathBuf> {
        self.fs_cache
            .borrow_mut()
            .test_file_in_folder_case_insensitive(filename, p.as_ref())
    }
}

impl ModuleResolver for LookupPath {
    fn resolve(
        &self,
        name: &str,
        search_folders: &[PathBuf],
        ignored: &IgnoredStrategies,
    ) -> Result<(SearchStrategy, Option<PathBuf>), LookupError> {
        for e in &self.entries {
            let strategy = e.strategy();
            if ignored.contains(strategy) {
                continue;
            }
            let found = match e {
                LookupPathEntry::KnownDLLs => self.search_dll_in_known_dlls(name),
                LookupPathEntry::ApiSet => self.search_dll_in_apiset_map(name),
                LookupPathEntry::Sxs => self.sxs.find(name).map(Path::to_owned),
                LookupPathEntry::ExecutableDir(p)
                | LookupPathEntry::SystemDir(p)
                | LookupPathEntry::WindowsDir(p)
                | LookupPathEntry::SystemDirX86(p)
                | LookupPathEntry::WorkingDir(p)
                | LookupPathEntry::SystemPath(p) => self.search_file_in_folder(name, p),
            };
            if let Some(path) = found {
                tracing::trace!("{} found via {}: {}", name, strategy, path.display());
                return Ok((strategy, Some(path)));
            }
        }

        if !ignored.contains(SearchStrategy::CustomFolder) {
            if let Some(path) = search_folders
                .iter()
                .find_map(|f| self.search_file_in_folder(name, f))
            {
                tracing::trace!("{} found in custom folder: {}", name, path.display());
                return Ok((SearchStrategy::CustomFolder, Some(path)));
            }
        }

        tracing::trace!("{} not found", name);
        Ok((SearchStrategy::NotFound, None))
    }
}
