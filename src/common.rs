use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Could not open file {path:?}")]
    CouldNotOpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not a PE file: {0}")]
    WrongFileFormatError(String),

    #[error("PE file parse error")]
    GoblinError(#[from] goblin::error::Error),

    #[error("PE file parse error")]
    PEError(#[from] pelite::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Manifest parse error")]
    XmlError(#[from] roxmltree::Error),

    #[error("Lookup context building error: {0}")]
    ContextDeductionError(String),

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("Could not demangle symbol {0}")]
    DemanglingError(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl LookupError {
    /// Whether the error happened while opening or validating a file, rather than later
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::CouldNotOpenFile { .. }
                | Self::WrongFileFormatError(_)
                | Self::GoblinError(_)
                | Self::IOError(_)
        )
    }
}

/// Failure during the recursive resolution of a dependency graph
///
/// The trace lists the files that were being processed, starting from the one that failed and
/// ending with the root of the analysis.
#[derive(Debug)]
pub struct ResolutionError {
    source: Box<LookupError>,
    trace: Vec<PathBuf>,
}

impl ResolutionError {
    pub fn new(source: LookupError, failing_file: PathBuf) -> Self {
        Self {
            source: Box::new(source),
            trace: vec![failing_file],
        }
    }

    /// Record that the failure happened while resolving the dependencies of `file`
    pub fn within(mut self, file: PathBuf) -> Self {
        self.trace.push(file);
        self
    }

    pub fn trace(&self) -> &[PathBuf] {
        &self.trace
    }

    pub fn failing_file(&self) -> Option<&Path> {
        self.trace.first().map(PathBuf::as_path)
    }

    pub fn cause(&self) -> &LookupError {
        &self.source
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failing_file() {
            Some(p) => write!(f, "Unhandled error while processing \"{}\"", p.display()),
            None => write!(f, "Unhandled error while resolving dependencies"),
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

pub fn path_to_string<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().to_string_lossy().into_owned()
}

/// Strip the verbatim prefix that canonicalization adds on Windows
pub fn decanonicalize(s: &str) -> String {
    s.strip_prefix(r"\\?\").unwrap_or(s).to_owned()
}

/// Last component of a path, as it would appear in an import table
pub fn file_name_of<P: AsRef<Path>>(p: P) -> Result<String, LookupError> {
    p.as_ref()
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            LookupError::ContextDeductionError(format!(
                "Could not extract a file name from {}",
                path_to_string(&p)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::{decanonicalize, file_name_of, LookupError, ResolutionError};
    use std::path::PathBuf;

    #[test]
    fn resolution_trace_grows_towards_root() {
        let err = ResolutionError::new(
            LookupError::ParseError("bad import table".to_owned()),
            PathBuf::from("C:/app/deep.dll"),
        )
        .within(PathBuf::from("C:/app/middle.dll"))
        .within(PathBuf::from("C:/app/root.exe"));

        assert_eq!(
            err.trace(),
            &[
                PathBuf::from("C:/app/deep.dll"),
                PathBuf::from("C:/app/middle.dll"),
                PathBuf::from("C:/app/root.exe"),
            ]
        );
        assert!(err.to_string().contains("deep.dll"));
        assert!(matches!(err.cause(), LookupError::ParseError(_)));
    }

    #[test]
    fn strip_verbatim_prefix() {
        assert_eq!(decanonicalize(r"\\?\C:\Windows"), r"C:\Windows");
        assert_eq!(decanonicalize("/usr/lib"), "/usr/lib");
    }

    #[test]
    fn file_name() -> Result<(), LookupError> {
        assert_eq!(file_name_of("some/dir/App.exe")?, "App.exe");
        assert!(file_name_of("/").is_err());
        Ok(())
    }
}
