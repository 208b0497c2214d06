//! Low-level PE file format access through the goblin and pelite libraries
//!
//! goblin validates the image and provides the section table; pelite walks the import, export and
//! resource directories. The delay-load directory is not covered by pelite, so its descriptors are
//! read through pelite's RVA accessors.

extern crate msvc_demangler;
use crate::common::LookupError;
use dataview::Pod;
use fs_err as fs;
use pelite::image::{
    IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT, IMAGE_DIRECTORY_ENTRY_EXPORT,
    IMAGE_DIRECTORY_ENTRY_IMPORT, IMAGE_FILE_MACHINE_I386, IMAGE_ORDINAL_FLAG32,
    IMAGE_ORDINAL_FLAG64,
};
use pelite::pe32::imports::Import;
use pelite::Wrap;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Symbol referenced by an import entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSymbol {
    Name(String),
    Ordinal(u16),
}

impl From<Import<'_>> for ImportSymbol {
    fn from(import: Import<'_>) -> Self {
        match import {
            Import::ByName { hint: _, name } => ImportSymbol::Name(c_string(name)),
            Import::ByOrdinal { ord } => ImportSymbol::Ordinal(ord),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    pub symbol: ImportSymbol,
    pub delay_import: bool,
}

/// One import descriptor: a library name and the symbols requested from it
///
/// The same library may appear in several descriptors (e.g. once in the regular import table and
/// once in the delay-load table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDll {
    pub name: String,
    pub entries: Vec<ImportEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub ordinal: u32,
    pub name: Option<String>,
    pub rva: u32,
    pub forwarded_name: Option<String>,
}

/// Source of import tables for the dependency graph
pub trait ImportReader {
    /// Read the ordered import list of the file at `path`
    fn read_imports(&self, path: &Path) -> Result<Vec<ImportDll>, LookupError>;
}

/// Reads import tables from PE files on disk
#[derive(Debug, Default, Clone, Copy)]
pub struct PEImportReader;

impl ImportReader for PEImportReader {
    fn read_imports(&self, path: &Path) -> Result<Vec<ImportDll>, LookupError> {
        let filemap = PEFileMap::new(path)?;
        let pefile = PEFile::new(&filemap)?;
        pefile.read_imports()
    }
}

/// Content of a PE file, read in one go so that no handle outlives the call that opened it
pub struct PEFileMap {
    path: PathBuf,
    content: Vec<u8>,
}

impl PEFileMap {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let content = fs::read(path.as_ref()).map_err(|source| LookupError::CouldNotOpenFile {
            path: path.as_ref().to_owned(),
            source,
        })?;
        Ok(Self {
            path: PathBuf::from(path.as_ref()),
            content,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// IMAGE_DELAYLOAD_DESCRIPTOR
#[allow(dead_code)]
#[derive(Clone, Copy, Pod)]
#[repr(C)]
struct DelayLoadDescriptor {
    attributes: u32,
    dll_name_rva: u32,
    module_handle_rva: u32,
    import_address_table_rva: u32,
    import_name_table_rva: u32,
    bound_import_address_table_rva: u32,
    unload_information_table_rva: u32,
    time_date_stamp: u32,
}

impl DelayLoadDescriptor {
    /// Descriptors emitted by old linkers hold virtual addresses instead of RVAs
    fn is_va_based(&self) -> bool {
        self.attributes & 1 == 0
    }
}

pub struct PEFile<'a> {
    pefile: pelite::PeFile<'a>,
    peobject: goblin::pe::PE<'a>,
}

impl<'a> PEFile<'a> {
    pub fn new(filemap: &'a PEFileMap) -> Result<Self, LookupError> {
        Self::from_bytes(&filemap.path, &filemap.content)
    }

    pub fn from_bytes(path: &Path, bytes: &'a [u8]) -> Result<Self, LookupError> {
        let peobject = match goblin::Object::parse(bytes) {
            Ok(goblin::Object::PE(pe)) => pe,
            Ok(_) => {
                return Err(LookupError::WrongFileFormatError(format!(
                    "{} is an executable, but not a PE image",
                    path.display()
                )))
            }
            Err(goblin::error::Error::BadMagic(_)) => {
                return Err(LookupError::WrongFileFormatError(format!(
                    "{} is not an executable",
                    path.display()
                )))
            }
            Err(e) => return Err(LookupError::GoblinError(e)),
        };
        let pefile = match pelite::PeFile::from_bytes(bytes) {
            Ok(pefile) => pefile,
            Err(e @ (pelite::Error::BadMagic | pelite::Error::PeMagic)) => {
                return Err(LookupError::WrongFileFormatError(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
            Err(e) => return Err(LookupError::PEError(e)),
        };

        Ok(Self { pefile, peobject })
    }

    fn is_64(&self) -> bool {
        matches!(self.pefile, Wrap::T64(_))
    }

    /// Whether the image targets 32-bit x86, and thus is subject to WOW64 redirection
    pub fn is_x86(&self) -> bool {
        self.pefile.file_header().Machine == IMAGE_FILE_MACHINE_I386
    }

    fn image_base(&self) -> u64 {
        match self.pefile.optional_header() {
            Wrap::T32(header) => u64::from(header.ImageBase),
            Wrap::T64(header) => header.ImageBase,
        }
    }

    fn has_directory(&self, index: usize) -> bool {
        self.pefile
            .data_directory()
            .get(index)
            .map_or(false, |dir| dir.VirtualAddress != 0)
    }

    /// Raw values of a zero-terminated thunk table, widened to 64 bits
    fn read_thunk_values(&self, rva: u32) -> Result<Vec<u64>, LookupError> {
        Ok(if self.is_64() {
            self.pefile.derva_slice_s::<u64>(rva, 0)?.to_vec()
        } else {
            self.pefile
                .derva_slice_s::<u32>(rva, 0)?
                .iter()
                .map(|&value| u64::from(value))
                .collect()
        })
    }

    /// Decode a thunk into the symbol it refers to
    ///
    /// * `image_base` - set when the hint/name reference is a virtual address
    fn thunk_symbol(
        &self,
        value: u64,
        image_base: Option<u64>,
    ) -> Result<ImportSymbol, LookupError> {
        let ordinal_flag = if self.is_64() {
            IMAGE_ORDINAL_FLAG64
        } else {
            u64::from(IMAGE_ORDINAL_FLAG32)
        };
        if value & ordinal_flag != 0 {
            return Ok(ImportSymbol::Ordinal(value as u16));
        }
        let hint_name = match image_base {
            Some(base) => value.wrapping_sub(base),
            None => value,
        } as u32;
        // skip the hint
        let name_rva = hint_name.checked_add(2).ok_or(pelite::Error::Bounds)?;
        Ok(ImportSymbol::Name(c_string(self.pefile.derva_c_str(name_rva)?)))
    }

    fn read_thunks(
        &self,
        rva: u32,
        image_base: Option<u64>,
        delay_import: bool,
    ) -> Result<Vec<ImportEntry>, LookupError> {
        self.read_thunk_values(rva)?
            .into_iter()
            .map(|value| {
                Ok(ImportEntry {
                    symbol: self.thunk_symbol(value, image_base)?,
                    delay_import,
                })
            })
            .collect()
    }

    fn read_regular_imports(&self) -> Result<Vec<ImportDll>, LookupError> {
        if !self.has_directory(IMAGE_DIRECTORY_ENTRY_IMPORT) {
            return Ok(Vec::new());
        }
        let mut ret = Vec::new();
        for desc in self.pefile.imports()? {
            let entries = if desc.image().OriginalFirstThunk != 0 {
                desc.int()?
                    .map(|import| {
                        Ok(ImportEntry {
                            symbol: import?.into(),
                            delay_import: false,
                        })
                    })
                    .collect::<Result<Vec<_>, LookupError>>()?
            } else {
                // no lookup table: the unbound import address table holds the same references
                self.read_thunks(desc.image().FirstThunk, None, false)?
            };
            ret.push(ImportDll {
                name: c_string(desc.dll_name()?),
                entries,
            });
        }
        Ok(ret)
    }

    fn read_delay_imports(&self) -> Result<Vec<ImportDll>, LookupError> {
        if !self.has_directory(IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT) {
            return Ok(Vec::new());
        }
        let dir = &self.pefile.data_directory()[IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT];
        let descriptors = self
            .pefile
            .derva_slice_f(dir.VirtualAddress, |desc: &DelayLoadDescriptor| {
                desc.dll_name_rva == 0
            })?;

        let mut ret = Vec::new();
        for desc in descriptors {
            let image_base = desc.is_va_based().then(|| self.image_base());
            let to_rva = |address: u32| match image_base {
                Some(base) => u64::from(address).wrapping_sub(base) as u32,
                None => address,
            };
            let entries = if desc.import_name_table_rva != 0 {
                self.read_thunks(to_rva(desc.import_name_table_rva), image_base, true)?
            } else {
                Vec::new()
            };
            ret.push(ImportDll {
                name: c_string(self.pefile.derva_c_str(to_rva(desc.dll_name_rva))?),
                entries,
            });
        }
        Ok(ret)
    }

    /// Ordered import list: regular imports first, then delay-load imports
    pub fn read_imports(&self) -> Result<Vec<ImportDll>, LookupError> {
        let mut imports = self.read_regular_imports()?;
        imports.extend(self.read_delay_imports()?);
        Ok(imports)
    }

    /// Get the list of symbols exported by this DLL, in ordinal order
    pub fn read_exports(&self) -> Result<Vec<ExportEntry>, LookupError> {
        // there is no export directory, e.g. in case of an executable
        if !self.has_directory(IMAGE_DIRECTORY_ENTRY_EXPORT) {
            return Ok(Vec::new());
        }
        let exports = self.pefile.exports()?;
        let base = exports.image().Base;
        let by = exports.by()?;

        // pelite checks the function table against the file, so its length can be trusted
        let functions = by.functions();
        let mut names: Vec<Option<String>> = vec![None; functions.len()];
        for (hint, &index) in by.name_indices().iter().enumerate() {
            if let Some(slot) = names.get_mut(usize::from(index)) {
                *slot = Some(c_string(by.name_of_hint(hint)?));
            }
        }

        let mut ret = Vec::new();
        for (index, (&rva, name)) in functions.iter().zip(names).enumerate() {
            if rva == 0 {
                continue;
            }
            ret.push(ExportEntry {
                ordinal: base.wrapping_add(index as u32),
                name,
                rva,
                forwarded_name: by.index(index)?.forward().map(c_string),
            });
        }
        Ok(ret)
    }

    /// Embedded RT_MANIFEST resource, if the file carries one
    pub fn read_manifest(&self) -> Result<Option<String>, LookupError> {
        let resources = match self.pefile.resources() {
            Ok(resources) => resources,
            Err(pelite::Error::Null) | Err(pelite::Error::Bounds) => return Ok(None),
            Err(e) => return Err(LookupError::PEError(e)),
        };
        Ok(resources.manifest().ok().map(str::to_owned))
    }

    /// Raw content of a section, looked up by name
    pub fn section_bytes(&self, name: &str) -> Option<&'a [u8]> {
        let section = self
            .peobject
            .sections
            .iter()
            .find(|s| s.name().map(|n| n == name).unwrap_or(false))?;
        let start = section.pointer_to_raw_data as usize;
        let end = start.checked_add(section.size_of_raw_data as usize)?;
        self.pefile.image().get(start..end)
    }
}

fn c_string(s: &pelite::util::CStr) -> String {
    String::from_utf8_lossy(s).into_owned()
}

/// Get a humanly-readable version of the (imported or exported) symbol
pub fn demangle_symbol(symbol: &str) -> Result<String, LookupError> {
    let flags =
        msvc_demangler::DemangleFlags::llvm() | msvc_demangler::DemangleFlags::NO_MS_KEYWORDS;
    msvc_demangler::demangle(symbol, flags)
        .map_err(|_| LookupError::DemanglingError(symbol.to_owned()))
}

#[cfg(test)]
mod tests {
    use crate::common::LookupError;
    use crate::pe::{
        demangle_symbol, ExportEntry, ImportDll, ImportEntry, ImportReader, ImportSymbol,
        PEFile, PEFileMap, PEImportReader,
    };
    use std::path::{Path, PathBuf};

    const SECTION_RVA: u32 = 0x1000;
    const SECTION_OFFSET: usize = 0x200;
    const IMAGE_BASE: u32 = 0x1000_0000;

    /// Minimal DLL image with a single `.rdata` section holding all the directories
    struct TestImage {
        pe64: bool,
        section: Vec<u8>,
        directories: Vec<(usize, u32, u32)>,
    }

    impl TestImage {
        fn new(pe64: bool) -> Self {
            Self {
                pe64,
                section: Vec::new(),
                directories: Vec::new(),
            }
        }

        fn rva(&self) -> u32 {
            SECTION_RVA + self.section.len() as u32
        }

        fn align(&mut self, alignment: usize) {
            while self.section.len() % alignment != 0 {
                self.section.push(0);
            }
        }

        fn push_u32s(&mut self, values: &[u32]) -> u32 {
            self.align(4);
            let rva = self.rva();
            for v in values {
                self.section.extend_from_slice(&v.to_le_bytes());
            }
            rva
        }

        fn push_str(&mut self, s: &str) -> u32 {
            self.align(2);
            let rva = self.rva();
            self.section.extend_from_slice(s.as_bytes());
            self.section.push(0);
            rva
        }

        fn push_hint_name(&mut self, name: &str) -> u32 {
            self.align(2);
            let rva = self.rva();
            self.section.extend_from_slice(&[0, 0]);
            self.push_str(name);
            rva
        }

        fn ordinal(&self, ordinal: u16) -> u64 {
            let flag = if self.pe64 { 1u64 << 63 } else { 1u64 << 31 };
            flag | u64::from(ordinal)
        }

        /// Zero-terminated thunk table of the image's pointer width
        fn push_thunks(&mut self, thunks: &[u64]) -> u32 {
            self.align(8);
            let rva = self.rva();
            for &t in thunks.iter().chain(std::iter::once(&0)) {
                if self.pe64 {
                    self.section.extend_from_slice(&t.to_le_bytes());
                } else {
                    self.section.extend_from_slice(&(t as u32).to_le_bytes());
                }
            }
            rva
        }

        fn directory(&mut self, index: usize, rva: u32) {
            let size = self.rva() - rva;
            self.directories.push((index, rva, size));
        }

        fn build(mut self) -> Vec<u8> {
            self.align(0x200);
            let raw_size = self.section.len() as u32;
            let optional_header_size: usize = if self.pe64 { 0xf0 } else { 0xe0 };

            let mut file = vec![0u8; SECTION_OFFSET];
            let put16 = |file: &mut Vec<u8>, at: usize, v: u16| {
                file[at..at + 2].copy_from_slice(&v.to_le_bytes())
            };
            let put32 = |file: &mut Vec<u8>, at: usize, v: u32| {
                file[at..at + 4].copy_from_slice(&v.to_le_bytes())
            };

            file[0..2].copy_from_slice(b"MZ");
            put32(&mut file, 0x3c, 0x80);
            file[0x80..0x84].copy_from_slice(b"PE\0\0");

            let coff = 0x84;
            put16(&mut file, coff, if self.pe64 { 0x8664 } else { 0x14c });
            put16(&mut file, coff + 2, 1);
            put16(&mut file, coff + 16, optional_header_size as u16);
            put16(&mut file, coff + 18, 0x2102);

            let opt = 0x98;
            put16(&mut file, opt, if self.pe64 { 0x20b } else { 0x10b });
            if self.pe64 {
                put32(&mut file, opt + 24, IMAGE_BASE);
            } else {
                put32(&mut file, opt + 28, IMAGE_BASE);
            }
            put32(&mut file, opt + 32, 0x1000);
            put32(&mut file, opt + 36, 0x200);
            put32(&mut file, opt + 56, SECTION_RVA + ((raw_size + 0xfff) & !0xfff));
            put32(&mut file, opt + 60, SECTION_OFFSET as u32);
            put16(&mut file, opt + 68, 3);
            let (count_at, dirs_at) = if self.pe64 {
                (opt + 108, opt + 112)
            } else {
                (opt + 92, opt + 96)
            };
            put32(&mut file, count_at, 16);
            for &(index, rva, size) in &self.directories {
                put32(&mut file, dirs_at + 8 * index, rva);
                put32(&mut file, dirs_at + 8 * index + 4, size);
            }

            let section = opt + optional_header_size;
            file[section..section + 6].copy_from_slice(b".rdata");
            put32(&mut file, section + 8, raw_size);
            put32(&mut file, section + 12, SECTION_RVA);
            put32(&mut file, section + 16, raw_size);
            put32(&mut file, section + 20, SECTION_OFFSET as u32);
            put32(&mut file, section + 36, 0x4000_0040);

            file.extend_from_slice(&self.section);
            file
        }
    }

    /// A DLL importing from four libraries and exporting two symbols, one of them forwarded
    ///
    /// Returns the image and the file offset of the export directory.
    fn sample_dll(pe64: bool) -> (Vec<u8>, usize) {
        let mut img = TestImage::new(pe64);
        let kernel32 = img.push_str("KERNEL32.dll");
        let user32 = img.push_str("USER32.dll");
        let shell32 = img.push_str("SHELL32.dll");
        let comctl32 = img.push_str("COMCTL32.dll");
        let get_last_error = u64::from(img.push_hint_name("GetLastError"));
        let message_box = u64::from(img.push_hint_name("MessageBoxW"));
        let shell_execute = u64::from(img.push_hint_name("ShellExecuteW"));
        let init_controls = u64::from(img.push_hint_name("InitCommonControlsEx"));
        let by_ordinal = img.ordinal(17);

        let kernel32_int = img.push_thunks(&[get_last_error, by_ordinal]);
        let kernel32_iat = img.push_thunks(&[get_last_error, by_ordinal]);
        let user32_iat = img.push_thunks(&[message_box]);
        let shell32_int = img.push_thunks(&[shell_execute]);
        let base = u64::from(IMAGE_BASE);
        let comctl32_int = img.push_thunks(&[base + init_controls, img.ordinal(5)]);

        let import_dir = img.push_u32s(&[kernel32_int, 0, 0, kernel32, kernel32_iat]);
        // descriptor without a lookup table
        img.push_u32s(&[0, 0, 0, user32, user32_iat]);
        img.push_u32s(&[0; 5]);
        img.directory(1, import_dir);

        let delay_dir = img.push_u32s(&[1, shell32, 0, shell32_int, shell32_int, 0, 0, 0]);
        let va = |rva: u32| IMAGE_BASE + rva;
        let comctl32_int_va = va(comctl32_int);
        img.push_u32s(&[0, va(comctl32), 0, comctl32_int_va, comctl32_int_va, 0, 0, 0]);
        img.push_u32s(&[0; 8]);
        img.directory(13, delay_dir);

        let dll_name = img.push_str("sample.dll");
        let first = img.push_str("sample_first");
        let forward = img.push_str("sample_forward");
        img.align(4);
        let export_dir = img.rva();
        let (functions, names, ordinals) = (export_dir + 40, export_dir + 52, export_dir + 60);
        img.push_u32s(&[0, 0, 0, dll_name, 1, 3, 2, functions, names, ordinals]);
        img.push_u32s(&[SECTION_RVA, 0, export_dir + 64]);
        img.push_u32s(&[first, forward]);
        img.push_u32s(&[0x0002_0000]);
        img.push_str("KERNEL32.GetLastError");
        img.directory(0, export_dir);

        let export_offset = SECTION_OFFSET + (export_dir - SECTION_RVA) as usize;
        (img.build(), export_offset)
    }

    fn write_dll(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, LookupError> {
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn expected_imports() -> Vec<ImportDll> {
        let entry = |symbol: ImportSymbol, delay_import: bool| ImportEntry {
            symbol,
            delay_import,
        };
        let name = |s: &str| ImportSymbol::Name(s.to_owned());
        vec![
            ImportDll {
                name: "KERNEL32.dll".to_owned(),
                entries: vec![
                    entry(name("GetLastError"), false),
                    entry(ImportSymbol::Ordinal(17), false),
                ],
            },
            ImportDll {
                name: "USER32.dll".to_owned(),
                entries: vec![entry(name("MessageBoxW"), false)],
            },
            ImportDll {
                name: "SHELL32.dll".to_owned(),
                entries: vec![entry(name("ShellExecuteW"), true)],
            },
            ImportDll {
                name: "COMCTL32.dll".to_owned(),
                entries: vec![
                    entry(name("InitCommonControlsEx"), true),
                    entry(ImportSymbol::Ordinal(5), true),
                ],
            },
        ]
    }

    #[test]
    fn read_imports_64() -> Result<(), LookupError> {
        let dir = tempfile::tempdir()?;
        let (content, _) = sample_dll(true);
        let path = write_dll(dir.path(), "sample64.dll", &content)?;

        let filemap = PEFileMap::new(&path)?;
        let pefile = PEFile::new(&filemap)?;
        assert!(!pefile.is_x86());
        assert_eq!(pefile.read_imports()?, expected_imports());
        assert_eq!(PEImportReader.read_imports(&path)?, expected_imports());
        Ok(())
    }

    #[test]
    fn read_imports_x86() -> Result<(), LookupError> {
        let dir = tempfile::tempdir()?;
        let (content, _) = sample_dll(false);
        let path = write_dll(dir.path(), "sample32.dll", &content)?;

        let filemap = PEFileMap::new(&path)?;
        let pefile = PEFile::new(&filemap)?;
        assert!(pefile.is_x86());
        assert_eq!(pefile.read_imports()?, expected_imports());
        Ok(())
    }

    #[test]
    fn read_exports() -> Result<(), LookupError> {
        let dir = tempfile::tempdir()?;
        let (content, _) = sample_dll(true);
        let path = write_dll(dir.path(), "sample.dll", &content)?;
        let filemap = PEFileMap::new(&path)?;
        let pefile = PEFile::new(&filemap)?;

        let exports = pefile.read_exports()?;
        assert_eq!(exports.len(), 2);
        assert_eq!(
            exports[0],
            ExportEntry {
                ordinal: 1,
                name: Some("sample_first".to_owned()),
                rva: 0x1000,
                forwarded_name: None,
            }
        );
        assert_eq!(exports[1].ordinal, 3);
        assert_eq!(exports[1].name.as_deref(), Some("sample_forward"));
        assert_eq!(
            exports[1].forwarded_name.as_deref(),
            Some("KERNEL32.GetLastError")
        );

        assert_eq!(pefile.read_manifest()?, None);
        assert!(pefile.section_bytes(".rdata").is_some());
        assert!(pefile.section_bytes(".apiset").is_none());
        Ok(())
    }

    #[test]
    fn oversized_export_count_is_a_parse_error() -> Result<(), LookupError> {
        let dir = tempfile::tempdir()?;
        let (mut content, export_offset) = sample_dll(true);
        // NumberOfFunctions
        content[export_offset + 20..export_offset + 24]
            .copy_from_slice(&0x4000_0000u32.to_le_bytes());
        let path = write_dll(dir.path(), "corrupt.dll", &content)?;
        let filemap = PEFileMap::new(&path)?;
        let pefile = PEFile::new(&filemap)?;

        let err = pefile.read_exports().unwrap_err();
        assert!(matches!(err, LookupError::PEError(_)));
        // the import table is still readable
        assert_eq!(pefile.read_imports()?.len(), 4);
        Ok(())
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = PEImportReader
            .read_imports(Path::new("this/file/does/not/exist.dll"))
            .unwrap_err();
        assert!(err.is_load_error());
        assert!(matches!(err, LookupError::CouldNotOpenFile { .. }));
    }

    #[test]
    fn text_file_is_not_a_pe() -> Result<(), LookupError> {
        let dir = tempfile::tempdir()?;
        let path = write_dll(
            dir.path(),
            "notes.dll",
            b"this is definitely not an executable image",
        )?;
        let filemap = PEFileMap::new(&path)?;
        assert_eq!(filemap.path(), path.as_path());
        let err = PEImportReader.read_imports(&path).unwrap_err();
        assert!(err.is_load_error());
        Ok(())
    }

    #[test]
    fn demangle() {
        assert!(demangle_symbol("?foo@@YAXXZ")
            .map(|s| s.contains("foo"))
            .unwrap_or(false));
        assert!(demangle_symbol("plain_c_symbol").is_err());
    }
}
