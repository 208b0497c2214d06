/*!
ApiSet schema parsing

Windows 10 and later ship the redirection table from virtual `api-ms-*`/`ext-ms-*` library names to
their host DLLs in the `.apiset` section of `apisetschema.dll` (schema version 6).

Resources:

* https://blog.quarkslab.com/runtime-dll-name-resolution-apisetschema-part-i.html
* https://lucasg.github.io/2017/10/15/Api-set-resolution/
* https://www.geoffchappell.com/studies/windows/win32/apisetschema/index.htm

 */

use crate::common::LookupError;
use crate::pe::{PEFile, PEFileMap};
use dataview::DataView;
use std::collections::BTreeMap;
use std::path::Path;

/// ApiSet name (lowercase, without the `.dll` extension) to host DLL names
pub type ApisetMap = BTreeMap<String, Vec<String>>;

const SCHEMA_VERSION: u32 = 6;
const NAMESPACE_ENTRY_SIZE: usize = 24;
const VALUE_ENTRY_SIZE: usize = 20;

struct Schema<'a> {
    view: &'a DataView,
}

impl<'a> Schema<'a> {
    fn u32_at(&self, offset: usize) -> Result<u32, LookupError> {
        self.view.try_read::<u32>(offset).ok_or_else(|| {
            LookupError::ParseError(format!(
                "ApiSet schema truncated at offset {:#x}",
                offset
            ))
        })
    }

    fn string_at(&self, offset: u32, byte_len: u32) -> Result<String, LookupError> {
        let units = (0..byte_len as usize / 2)
            .map(|i| {
                self.view
                    .try_read::<u16>(offset as usize + 2 * i)
                    .ok_or_else(|| {
                        LookupError::ParseError(format!(
                            "ApiSet string at offset {:#x} is truncated",
                            offset
                        ))
                    })
            })
            .collect::<Result<Vec<u16>, _>>()?;
        Ok(String::from_utf16_lossy(&units))
    }

    fn entry(&self, entry_offset: usize) -> Result<(String, Vec<String>), LookupError> {
        let name = self.string_at(
            self.u32_at(entry_offset + 4)?,
            self.u32_at(entry_offset + 8)?,
        )?;
        let values_offset = self.u32_at(entry_offset + 16)? as usize;
        let value_count = self.u32_at(entry_offset + 20)? as usize;
        let hosts = (0..value_count)
            .map(|i| {
                let v = values_offset + i * VALUE_ENTRY_SIZE;
                self.string_at(self.u32_at(v + 12)?, self.u32_at(v + 16)?)
            })
            .filter(|host| host.as_ref().map(|h| !h.is_empty()).unwrap_or(true))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((name.to_lowercase(), hosts))
    }
}

/// Parse the content of an `.apiset` section
pub fn parse_apiset_section(bytes: &[u8]) -> Result<ApisetMap, LookupError> {
    let schema = Schema {
        view: DataView::from(bytes),
    };
    let version = schema.u32_at(0)?;
    if version != SCHEMA_VERSION {
        return Err(LookupError::ParseError(format!(
            "Unsupported ApiSet schema version {}",
            version
        )));
    }
    let count = schema.u32_at(12)? as usize;
    let entries_offset = schema.u32_at(16)? as usize;
    (0..count)
        .map(|i| schema.entry(entries_offset + i * NAMESPACE_ENTRY_SIZE))
        .collect()
}

/// Read the ApiSet schema from an `apisetschema.dll` file
pub fn parse_apiset<P: AsRef<Path>>(apisetschema_path: P) -> Result<ApisetMap, LookupError> {
    let filemap = PEFileMap::new(apisetschema_path.as_ref())?;
    let pefile = PEFile::new(&filemap)?;
    match pefile.section_bytes(".apiset") {
        Some(section) => parse_apiset_section(section),
        None => Ok(ApisetMap::new()),
    }
}

/// Find the entry an imported library name refers to, if it is an ApiSet
///
/// The trailing revision number is not significant: `api-ms-win-core-file-l1-2-4` is served by the
/// `api-ms-win-core-file-l1-2-3` entry when that is the only one present.
pub fn lookup_apiset<'m>(map: &'m ApisetMap, library: &str) -> Option<&'m [String]> {
    let lowercase = library.to_lowercase();
    let name = lowercase.trim_end_matches(".dll");
    if !(name.starts_with("api-") || name.starts_with("ext-")) {
        return None;
    }
    if let Some(hosts) = map.get(name) {
        return Some(hosts.as_slice());
    }
    let unversioned = name.rsplit_once('-').map(|(head, _)| head)?;
    map.iter()
        .find(|(k, _)| k.rsplit_once('-').map(|(head, _)| head) == Some(unversioned))
        .map(|(_, hosts)| hosts.as_slice())
}
