//! I/O error types.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IoError {
    /// A path that does not resolve to readable data.
    NotFound(PathBuf),
    /// Bytes that cannot be parsed into rows/columns or a workbook.
    Malformed(String),
    /// A stage artifact that is neither a workbook buffer nor an existing path.
    MalformedArtifact(String),
    /// The xlsx writer rejected the workbook.
    Write(String),
    Io(std::io::Error),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::NotFound(path) => write!(f, "source not found: {}", path.display()),
            IoError::Malformed(msg) => write!(f, "malformed tabular data: {}", msg),
            IoError::MalformedArtifact(msg) => write!(f, "malformed stage artifact: {}", msg),
            IoError::Write(msg) => write!(f, "failed to write workbook: {}", msg),
            IoError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e)
    }
}

impl From<rust_xlsxwriter::XlsxError> for IoError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        IoError::Write(e.to_string())
    }
}
