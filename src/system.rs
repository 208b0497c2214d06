#[cfg(windows)]
extern crate winapi;
use crate::apiset;
use crate::common::LookupError;
#[cfg(windows)]
use crate::knowndlls;
use fs_err as fs;
use std::collections::HashMap;
#[cfg(windows)]
use std::ffi::OsString;
#[cfg(windows)]
use std::os::windows::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// List of DLLs provided by the operating system and hardcoded into the loader
/// If a DLL with this name is required, the OS will not perform any further lookup but load the
/// copy distributed with Windows
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct KnownDLLList {
    pub entries: HashMap<String, PathBuf>,
}

impl KnownDLLList {
    /// Build the list from DLL names living in `dir`
    pub fn from_names<S: AsRef<str>>(names: &[S], dir: &Path) -> Self {
        Self {
            entries: names
                .iter()
                .map(|n| (n.as_ref().to_lowercase(), dir.join(n.as_ref())))
                .collect(),
        }
    }

    /// look for a DLL by name among the entries
    pub fn search_dll_in_known_dlls(&self, library: &str) -> Option<PathBuf> {
        self.entries.get(&library.to_lowercase()).cloned()
    }

    /// Full paths of the entries, sorted
    pub fn sorted_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.entries.values().map(PathBuf::as_path).collect();
        paths.sort();
        paths
    }
}

// supported DLL search modes: standard for desktop application, safe or unsafe
// https://docs.microsoft.com/en-us/windows/win32/dlls/dynamic-link-library-search-order#standard-search-order-for-desktop-applications

/// Description of a Windows system
/// If running from within Windows we extract the available information from the environment
/// variables and the Windows API.
/// If running in another OS we can only guess the directories, and can't do anything about the PATH
#[derive(Debug, Clone, PartialEq)]
pub struct WindowsSystem {
    pub safe_dll_search_mode_on: Option<bool>,
    pub apiset_map: Option<apiset::ApisetMap>,
    pub known_dlls: Option<KnownDLLList>,
    pub known_dlls_x86: Option<KnownDLLList>,
    pub win_dir: PathBuf,
    pub sys_dir: PathBuf,
    /// SysWOW64, present on 64-bit installations
    pub sys_wow64_dir: Option<PathBuf>,
    // sys16_dir ignored, since it is not supported on 64-bit systems
    pub system_path: Option<Vec<PathBuf>>,
}

fn read_apiset(sys_dir: &Path) -> Option<apiset::ApisetMap> {
    match apiset::parse_apiset(sys_dir.join("apisetschema.dll")) {
        Ok(apiset) => Some(apiset),
        Err(e) => {
            tracing::warn!("ApiSet schema not available: {}", e);
            None
        }
    }
}

fn existing_dir(p: PathBuf) -> Option<PathBuf> {
    if p.is_dir() {
        Some(p)
    } else {
        None
    }
}

impl WindowsSystem {
    /// Collect information about the host operating system
    #[cfg(windows)]
    pub fn current() -> Result<Self, LookupError> {
        let win_dir = get_windows_directory()?;
        let sys_dir = get_system_directory()?;
        let sys_wow64_dir = existing_dir(win_dir.join("SysWOW64"));

        let path = std::env::var("PATH").ok().map(|s| {
            s.split(';')
                .filter(|subs| !subs.is_empty())
                .filter_map(|subs| fs::canonicalize(subs).ok())
                .collect()
        });
        let known_dlls = match knowndlls::get_known_dlls() {
            Ok(names) => Some(KnownDLLList::from_names(&names, &sys_dir)),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        };
        let known_dlls_x86 = sys_wow64_dir.as_ref().and_then(|wow| {
            knowndlls::get_known_dlls32()
                .ok()
                .map(|names| KnownDLLList::from_names(&names, wow))
        });
        Ok(Self {
            safe_dll_search_mode_on: None,
            apiset_map: read_apiset(&sys_dir),
            known_dlls,
            known_dlls_x86,
            win_dir,
            sys_dir,
            sys_wow64_dir,
            system_path: path,
        })
    }

    /// Collect information about the Windows operating system installed on the partition the target
    /// executable lies into
    pub fn from_exe_location<P: AsRef<Path>>(p: P) -> Option<Self> {
        Self::find_root(&p).and_then(Self::from_root)
    }

    /// Try finding a Windows installation along the path to the target executable
    /// Rationale: the user may have mounted a Windows partition at an unknown depth in the filesystem
    fn find_root<P: AsRef<Path>>(p: P) -> Option<PathBuf> {
        p.as_ref()
            .parent()?
            .ancestors()
            .find(|a| a.join("Windows").join("System32").is_dir())
            .map(Path::to_owned)
    }

    /// Collect information about the Windows installation at the given path
    /// The path should point to the C:\ partition
    ///
    /// KnownDlls can only be listed for the running system, so they are not available here
    pub fn from_root<P: AsRef<Path>>(root_path: P) -> Option<Self> {
        let win_dir = root_path.as_ref().join("Windows");
        let sys_dir = win_dir.join("System32");
        if sys_dir.is_dir() {
            Some(Self {
                safe_dll_search_mode_on: None,
                apiset_map: read_apiset(&sys_dir),
                known_dlls: None,
                known_dlls_x86: None,
                sys_wow64_dir: existing_dir(win_dir.join("SysWOW64")),
                win_dir,
                sys_dir,
                system_path: None,
            })
        } else {
            None
        }
    }
}

/// Fetch the path to a system directory through the Windows API
#[cfg(windows)]
fn get_winapi_directory(
    a: unsafe extern "system" fn(
        winapi::um::winnt::LPWSTR,
        winapi::shared::minwindef::UINT,
    ) -> winapi::shared::minwindef::UINT,
) -> Result<PathBuf, std::io::Error> {
    use std::io::Error;

    const BFR_SIZE: usize = 512;
    let mut bfr: [u16; BFR_SIZE] = [0; BFR_SIZE];

    let ret: u32 = unsafe { a(bfr.as_mut_ptr(), BFR_SIZE as u32) };
    if ret == 0 {
        Err(Error::last_os_error())
    } else {
        let valid_bfr = &bfr[..ret as usize];
        fs::canonicalize(OsString::from_wide(valid_bfr))
    }
}

/// Get the path to the System directory (typically C:\Windows\System32)
#[cfg(windows)]
fn get_system_directory() -> Result<PathBuf, std::io::Error> {
    get_winapi_directory(winapi::um::sysinfoapi::GetSystemDirectoryW)
}

/// Get the path to the Windows directory (typically C:\Windows)
#[cfg(windows)]
fn get_windows_directory() -> Result<PathBuf, std::io::Error> {
    get_winapi_directory(winapi::um::sysinfoapi::GetWindowsDirectoryW)
}

/// Caches the content of already scanned directories, to avoid repeated expensive filesystem access
#[derive(Debug, Default)]
pub(crate) struct WinFileSystemCache {
    files_in_dirs: HashMap<PathBuf, HashMap<String, PathBuf>>,
}

impl WinFileSystemCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Look for `filename` in `folder`, ignoring case as the Windows file system does
    ///
    /// A folder that cannot be listed is treated as empty.
    pub(crate) fn test_file_in_folder_case_insensitive<P: AsRef<Path>>(
        &mut self,
        filename: &str,
        folder: P,
    ) -> Option<PathBuf> {
        let folder = folder.as_ref();
        let dir = self
            .files_in_dirs
            .entry(folder.to_owned())
            .or_insert_with(|| match Self::scan_folder(folder) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::trace!("skipping folder {}: {}", folder.display(), e);
                    HashMap::new()
                }
            });
        dir.get(&filename.to_lowercase()).map(|p| folder.join(p))
    }

    fn scan_folder(folder: &Path) -> Result<HashMap<String, PathBuf>, LookupError> {
        Ok(fs::read_dir(folder)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.metadata().map_or_else(|_| false, |m| m.is_file()))
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|s| (s.to_lowercase(), PathBuf::from(entry.file_name())))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::common::LookupError;
    use crate::system::{KnownDLLList, WinFileSystemCache, WindowsSystem};
    use std::path::Path;

    #[cfg(windows)]
    #[test]
    fn context_win10() -> Result<(), LookupError> {
        use fs_err as fs;
        let ctx = WindowsSystem::current()?;
        assert_eq!(ctx.win_dir, fs::canonicalize("C:\\Windows")?);
        assert_eq!(ctx.sys_dir, fs::canonicalize("C:\\Windows\\System32")?);

        // this changes from computer to computer, but we should get something
        let user_path = ctx.system_path;
        assert!(user_path.is_some());
        Ok(())
    }

    #[test]
    fn fscache() -> Result<(), LookupError> {
        let folder = tempfile::tempdir()?;
        std::fs::write(folder.path().join("DepRunTest.exe"), b"MZ")?;
        std::fs::create_dir(folder.path().join("subdir.dll"))?;

        let mut fscache = WinFileSystemCache::new();
        let expected_res = Some(folder.path().join("DepRunTest.exe"));
        assert_eq!(
            fscache.test_file_in_folder_case_insensitive("depruntest.exe", folder.path()),
            expected_res
        );
        assert_eq!(
            fscache.test_file_in_folder_case_insensitive("Depruntest.exe", folder.path()),
            expected_res
        );
        assert_eq!(
            fscache.test_file_in_folder_case_insensitive("somerandomstring.txt", folder.path()),
            None
        );
        // directories are not libraries
        assert_eq!(
            fscache.test_file_in_folder_case_insensitive("subdir.dll", folder.path()),
            None
        );
        assert_eq!(
            fscache.test_file_in_folder_case_insensitive("a.dll", folder.path().join("missing")),
            None
        );
        Ok(())
    }

    #[test]
    fn windows_root_detection() -> Result<(), LookupError> {
        let root = tempfile::tempdir()?;
        let sys_dir = root.path().join("Windows").join("System32");
        std::fs::create_dir_all(&sys_dir)?;
        let app_dir = root.path().join("Program Files").join("App");
        std::fs::create_dir_all(&app_dir)?;

        let system = WindowsSystem::from_exe_location(app_dir.join("app.exe"))
            .expect("the temporary partition has a Windows directory");
        assert_eq!(system.sys_dir, sys_dir);
        assert!(system.apiset_map.is_none());
        assert!(system.known_dlls.is_none());
        assert!(system.sys_wow64_dir.is_none());

        let elsewhere = tempfile::tempdir()?;
        assert!(WindowsSystem::from_exe_location(elsewhere.path().join("app.exe")).is_none());
        Ok(())
    }

    #[test]
    fn known_dll_lookup_ignores_case() {
        let list = KnownDLLList::from_names(&["KERNEL32.dll", "ntdll.dll"], Path::new("C:/sys"));
        assert_eq!(
            list.search_dll_in_known_dlls("kernel32.DLL"),
            Some(Path::new("C:/sys").join("KERNEL32.dll"))
        );
        assert_eq!(list.search_dll_in_known_dlls("user32.dll"), None);
        assert_eq!(list.sorted_paths().len(), 2);
    }
}
