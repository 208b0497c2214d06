//! Utilities to read the list of known DLLs for a Windows installation

extern crate ntapi;
extern crate winapi;

use crate::common::LookupError;
use ntapi::ntobapi::{
    NtClose, NtOpenDirectoryObject, NtQueryDirectoryObject, DIRECTORY_QUERY,
    OBJECT_DIRECTORY_INFORMATION,
};
use std::ffi::OsString;
use std::mem::size_of;
use std::os::windows::prelude::*;
use std::ptr::null_mut;
use winapi::shared::ntdef::{
    FALSE, HANDLE, NTSTATUS, NT_SUCCESS, OBJECT_ATTRIBUTES, PVOID, TRUE, ULONG, UNICODE_STRING,
    USHORT,
};
use winapi::shared::ntstatus::STATUS_NO_MORE_ENTRIES;

// according to https://lucasg.github.io/2017/06/07/listing-known-dlls/,
// in contrast to reading the HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Session Manager\KnownDLLs key,
// listing \KnownDlls gives us the entire list of DLLs, so we don't need to look up the dependencies of each DLL

fn unicode_to_string(s: &UNICODE_STRING) -> String {
    if s.Buffer.is_null() {
        return String::new();
    }
    let units = unsafe { std::slice::from_raw_parts(s.Buffer, s.Length as usize / 2) };
    OsString::from_wide(units).to_string_lossy().into_owned()
}

fn nt_error(directory: &str, status: NTSTATUS) -> LookupError {
    LookupError::ScanError(format!(
        "Could not enumerate object directory {}: NTSTATUS {:#x}",
        directory, status
    ))
}

/// Names of the section objects in an object manager directory
fn list_sections(directory: &str) -> Result<Vec<String>, LookupError> {
    let mut wide: Vec<u16> = directory.encode_utf16().collect();
    let byte_len = (wide.len() * size_of::<u16>()) as USHORT;
    let mut name = UNICODE_STRING {
        Length: byte_len,
        MaximumLength: byte_len,
        Buffer: wide.as_mut_ptr(),
    };
    let mut attributes = OBJECT_ATTRIBUTES {
        Length: size_of::<OBJECT_ATTRIBUTES>() as ULONG,
        RootDirectory: null_mut(),
        ObjectName: &mut name,
        Attributes: 0,
        SecurityDescriptor: null_mut(),
        SecurityQualityOfService: null_mut(),
    };

    let mut handle: HANDLE = null_mut();
    let status = unsafe { NtOpenDirectoryObject(&mut handle, DIRECTORY_QUERY, &mut attributes) };
    if !NT_SUCCESS(status) {
        return Err(nt_error(directory, status));
    }

    // one entry per query; u64 storage keeps the returned structure aligned
    let mut buffer = vec![0u64; 512];
    let mut context: ULONG = 0;
    let mut restart = TRUE;
    let mut sections = Vec::new();
    let result = loop {
        let mut returned: ULONG = 0;
        let status = unsafe {
            NtQueryDirectoryObject(
                handle,
                buffer.as_mut_ptr() as PVOID,
                (buffer.len() * size_of::<u64>()) as ULONG,
                TRUE,
                restart,
                &mut context,
                &mut returned,
            )
        };
        restart = FALSE;
        if status == STATUS_NO_MORE_ENTRIES {
            break Ok(());
        }
        if !NT_SUCCESS(status) {
            break Err(nt_error(directory, status));
        }
        let info = unsafe { &*(buffer.as_ptr() as *const OBJECT_DIRECTORY_INFORMATION) };
        if unicode_to_string(&info.TypeName) == "Section" {
            sections.push(unicode_to_string(&info.Name));
        }
    };
    unsafe { NtClose(handle) };

    result.map(|_| sections)
}

/// Returns the complete list of 64-bit KnownDlls
///
/// These DLLs are mapped into each process' memory as
/// copy-on-write for performance (and a sprinkle of security) reasons.
///
/// They are all located in the system directory and can't be overridden/hijacked.
pub fn get_known_dlls() -> Result<Vec<String>, LookupError> {
    list_sections(r"\KnownDlls")
}

/// Returns the KnownDlls used by 32-bit processes (located in SysWOW64)
pub fn get_known_dlls32() -> Result<Vec<String>, LookupError> {
    list_sections(r"\KnownDlls32")
}

#[cfg(test)]
mod tests {
    use crate::common::LookupError;
    use crate::knowndlls::get_known_dlls;

    #[test]
    fn list_known_dlls() -> Result<(), LookupError> {
        let known_dlls = get_known_dlls()?;
        assert!(!known_dlls.is_empty());
        assert!(known_dlls
            .iter()
            .any(|kd| kd.eq_ignore_ascii_case("kernel32.dll")));
        Ok(())
    }
}
