//! Side-by-side assemblies declared in application manifests

use crate::common::{decanonicalize, path_to_string, LookupError};
use crate::pe::PEFile;
use fs_err as fs;
use serde::Serialize;
use std::path::{Path, PathBuf};

const ASSEMBLY_NOT_FOUND: &str = "???";

/// Identity of an assembly the application depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: Option<String>,
    pub processor_architecture: Option<String>,
    pub public_key_token: Option<String>,
    pub language: Option<String>,
}

/// The parts of a manifest that influence DLL lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestInfo {
    /// `<file name=...>` entries, relative to the manifest's folder
    pub files: Vec<String>,
    pub dependent_assemblies: Vec<AssemblyIdentity>,
}

fn local_name<'a>(n: &roxmltree::Node<'a, '_>) -> &'a str {
    n.tag_name().name()
}

fn parse_identity(n: &roxmltree::Node) -> Option<AssemblyIdentity> {
    Some(AssemblyIdentity {
        name: n.attribute("name")?.to_owned(),
        version: n.attribute("version").map(str::to_owned),
        processor_architecture: n.attribute("processorArchitecture").map(str::to_owned),
        public_key_token: n.attribute("publicKeyToken").map(str::to_owned),
        language: n.attribute("language").map(str::to_owned),
    })
}

/// Extract file and dependent assembly declarations from manifest XML
pub fn parse_manifest(xml: &str) -> Result<ManifestInfo, LookupError> {
    let doc = roxmltree::Document::parse(xml.trim_start_matches('\u{feff}'))?;
    let mut info = ManifestInfo::default();
    for node in doc.descendants().filter(|n| n.is_element()) {
        match local_name(&node) {
            "file" => {
                if let Some(name) = node.attribute("name") {
                    info.files.push(name.to_owned());
                }
            }
            "dependentAssembly" => {
                if let Some(identity) = node
                    .children()
                    .find(|c| c.is_element() && local_name(c) == "assemblyIdentity")
                    .as_ref()
                    .and_then(parse_identity)
                {
                    info.dependent_assemblies.push(identity);
                }
            }
            _ => {}
        }
    }
    Ok(info)
}

/// A library supplied through a side-by-side declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SxsEntry {
    pub name: String,
    /// Location of the library; absent if the declaring assembly could not be found
    pub path: Option<PathBuf>,
}

impl SxsEntry {
    pub fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ASSEMBLY_NOT_FOUND.to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SxsEntries {
    pub entries: Vec<SxsEntry>,
}

impl SxsEntries {
    /// Resolve the declarations of an application manifest
    ///
    /// `app_dir` is the folder of the application, `win_dir` the Windows directory hosting the
    /// WinSxS store, if one is known.
    pub fn from_manifest(
        manifest: &ManifestInfo,
        app_dir: &Path,
        win_dir: Option<&Path>,
    ) -> Result<Self, LookupError> {
        let mut entries: Vec<SxsEntry> = manifest
            .files
            .iter()
            .map(|f| {
                let candidate = app_dir.join(f);
                SxsEntry {
                    name: file_name(f),
                    path: candidate.is_file().then_some(candidate),
                }
            })
            .collect();

        for identity in &manifest.dependent_assemblies {
            match find_assembly(identity, app_dir, win_dir)? {
                Some(files) => entries.extend(files),
                None => {
                    tracing::debug!("side-by-side assembly {} not found", identity.name);
                    entries.push(SxsEntry {
                        name: identity.name.clone(),
                        path: None,
                    })
                }
            }
        }

        Ok(Self { entries })
    }

    /// Entries declared by the manifest embedded in `pefile`, if any
    pub fn from_pe(
        pefile: &PEFile,
        app_dir: &Path,
        win_dir: Option<&Path>,
    ) -> Result<Self, LookupError> {
        match pefile.read_manifest()? {
            Some(xml) => Self::from_manifest(&parse_manifest(&xml)?, app_dir, win_dir),
            None => Ok(Self::default()),
        }
    }

    /// Look for a library among the resolved entries
    pub fn find(&self, library: &str) -> Option<&Path> {
        self.entries
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case(library))
            .find_map(|e| e.path.as_deref())
    }
}

fn file_name(declared: &str) -> String {
    declared
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(declared)
        .to_owned()
}

/// Files declared by the assembly manifest at `manifest_path`, located next to `files_dir`
fn assembly_files(manifest_path: &Path, files_dir: &Path) -> Result<Vec<SxsEntry>, LookupError> {
    let info = parse_manifest(&fs::read_to_string(manifest_path)?)?;
    Ok(info
        .files
        .iter()
        .map(|f| SxsEntry {
            name: file_name(f),
            path: Some(files_dir.join(f)),
        })
        .collect())
}

fn find_assembly(
    identity: &AssemblyIdentity,
    app_dir: &Path,
    win_dir: Option<&Path>,
) -> Result<Option<Vec<SxsEntry>>, LookupError> {
    // private assemblies first
    let private_candidates = [
        app_dir.join(format!("{}.manifest", identity.name)),
        app_dir
            .join(&identity.name)
            .join(format!("{}.manifest", identity.name)),
    ];
    if let Some(candidate) = private_candidates.iter().find(|c| c.is_file()) {
        let files_dir = candidate.parent().unwrap_or(app_dir);
        return assembly_files(candidate, files_dir).map(Some);
    }

    let Some(win_dir) = win_dir else {
        return Ok(None);
    };
    let winsxs = win_dir.join("WinSxS");
    // <arch>_<name>_<token>_<version>_<language>_<hash>
    let field = |v: &Option<String>| {
        v.as_deref()
            .filter(|s| !s.is_empty() && *s != "*")
            .map(glob::Pattern::escape)
            .unwrap_or_else(|| "*".to_owned())
    };
    let stem = format!(
        "{}_{}_{}_{}_*",
        field(&identity.processor_architecture),
        glob::Pattern::escape(&identity.name),
        field(&identity.public_key_token),
        field(&identity.version),
    );
    // glob does not understand verbatim paths
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&decanonicalize(&path_to_string(&winsxs))),
        stem
    );
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let folders = glob::glob_with(&pattern, options).map_err(|e| {
        LookupError::ParseError(format!("invalid WinSxS pattern {}: {}", pattern, e))
    })?;

    for folder in folders.filter_map(Result::ok).filter(|f| f.is_dir()) {
        let manifest_path = folder.file_name().map(|n| {
            winsxs
                .join("Manifests")
                .join(format!("{}.manifest", n.to_string_lossy()))
        });
        if let Some(manifest_path) = manifest_path.filter(|m| m.is_file()) {
            return assembly_files(&manifest_path, &folder).map(Some);
        }
        // no manifest in the store: every library in the folder belongs to the assembly
        let files = fs::read_dir(&folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .map(|e| e.eq_ignore_ascii_case("dll"))
                    .unwrap_or(false)
            })
            .map(|p| SxsEntry {
                name: p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: Some(p),
            })
            .collect();
        return Ok(Some(files));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::{parse_manifest, SxsEntries};
    use crate::common::LookupError;

    const APP_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity type="win32" name="Contoso.App" version="1.0.0.0" processorArchitecture="amd64"/>
  <file name="plugins\Local.dll"/>
  <dependency>
    <dependentAssembly>
      <assemblyIdentity type="win32" name="Contoso.Private" version="2.0.0.0" processorArchitecture="amd64"/>
    </dependentAssembly>
  </dependency>
  <dependency>
    <dependentAssembly>
      <assemblyIdentity type="win32" name="Microsoft.VC90.CRT" version="9.0.21022.8" processorArchitecture="x86" publicKeyToken="1fc8b3b9a1e18e3b"/>
    </dependentAssembly>
  </dependency>
</assembly>"#;

    const PRIVATE_MANIFEST: &str = r#"<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity type="win32" name="Contoso.Private" version="2.0.0.0"/>
  <file name="contoso_private.dll"/>
</assembly>"#;

    const CRT_MANIFEST: &str = r#"<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <file name="msvcr90.dll"/>
  <file name="msvcp90.dll"/>
</assembly>"#;

    #[test]
    fn parse_app_manifest() -> Result<(), LookupError> {
        let info = parse_manifest(APP_MANIFEST)?;
        assert_eq!(info.files, vec![r"plugins\Local.dll".to_owned()]);
        assert_eq!(info.dependent_assemblies.len(), 2);
        assert_eq!(info.dependent_assemblies[0].name, "Contoso.Private");
        assert_eq!(
            info.dependent_assemblies[1].public_key_token.as_deref(),
            Some("1fc8b3b9a1e18e3b")
        );
        assert!(parse_manifest("<assembly>").is_err());
        Ok(())
    }

    #[test]
    fn resolve_private_and_shared_assemblies() -> Result<(), LookupError> {
        let app = tempfile::tempdir()?;
        std::fs::write(app.path().join("Contoso.Private.manifest"), PRIVATE_MANIFEST)?;

        let win = tempfile::tempdir()?;
        let stem = "x86_microsoft.vc90.crt_1fc8b3b9a1e18e3b_9.0.21022.8_none_bcb86ed6ac711f91";
        let crt_dir = win.path().join("WinSxS").join(stem);
        std::fs::create_dir_all(&crt_dir)?;
        std::fs::create_dir_all(win.path().join("WinSxS").join("Manifests"))?;
        std::fs::write(
            win.path()
                .join("WinSxS")
                .join("Manifests")
                .join(format!("{}.manifest", stem)),
            CRT_MANIFEST,
        )?;

        let info = parse_manifest(APP_MANIFEST)?;
        let entries = SxsEntries::from_manifest(&info, app.path(), Some(win.path()))?;

        let names: Vec<&str> = entries.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Local.dll", "contoso_private.dll", "msvcr90.dll", "msvcp90.dll"]
        );
        // the local file was declared but does not exist
        assert!(entries.entries[0].path.is_none());
        assert!(entries.entries[0].display_path().starts_with("???"));
        assert_eq!(
            entries.find("MSVCR90.DLL"),
            Some(crt_dir.join("msvcr90.dll").as_path())
        );
        assert_eq!(
            entries.find("contoso_private.dll"),
            Some(app.path().join("contoso_private.dll").as_path())
        );
        assert_eq!(entries.find("Local.dll"), None);
        Ok(())
    }

    #[test]
    fn missing_assembly_is_reported() -> Result<(), LookupError> {
        let app = tempfile::tempdir()?;
        let info = parse_manifest(APP_MANIFEST)?;
        let entries = SxsEntries::from_manifest(&info, app.path(), None)?;
        assert_eq!(entries.entries.len(), 3);
        assert!(entries.entries.iter().all(|e| e.path.is_none()));
        assert_eq!(entries.entries[2].name, "Microsoft.VC90.CRT");
        Ok(())
    }
}
