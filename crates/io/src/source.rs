//! Stage inputs and outputs.
//!
//! Every stage reads its inputs through `Source` and writes through an
//! `OutputTarget`, returning an `Artifact` that names where the result went.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::IoError;

/// Leading bytes of every xlsx (ZIP) container.
pub const XLSX_SIGNATURE: &[u8] = b"PK\x03\x04";

pub fn looks_like_xlsx(bytes: &[u8]) -> bool {
    bytes.starts_with(XLSX_SIGNATURE)
}

/// A tabular or workbook input.
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl Source {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        Source::Path(p.into())
    }

    /// Drain a readable stream into an in-memory source.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, IoError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Source::Bytes(buf))
    }

    /// Load the full contents. A path that is missing or not a file is
    /// reported verbatim as `NotFound`.
    pub fn bytes(&self) -> Result<Vec<u8>, IoError> {
        match self {
            Source::Bytes(b) => Ok(b.clone()),
            Source::Path(p) => {
                if !p.is_file() {
                    return Err(IoError::NotFound(p.clone()));
                }
                Ok(fs::read(p)?)
            }
        }
    }

    /// Short human label for logs.
    pub fn describe(&self) -> String {
        match self {
            Source::Path(p) => p.display().to_string(),
            Source::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl From<&Path> for Source {
    fn from(p: &Path) -> Self {
        Source::Path(p.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(p: PathBuf) -> Self {
        Source::Path(p)
    }
}

impl From<Vec<u8>> for Source {
    fn from(b: Vec<u8>) -> Self {
        Source::Bytes(b)
    }
}

impl From<Artifact> for Source {
    fn from(a: Artifact) -> Self {
        match a {
            Artifact::Path(p) => Source::Path(p),
            Artifact::Bytes(b) => Source::Bytes(b),
        }
    }
}

/// Where a stage writes its workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Path(PathBuf),
    Buffer,
}

impl OutputTarget {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        OutputTarget::Path(p.into())
    }

    /// Deliver finished workbook bytes to this target.
    pub fn emit(&self, bytes: Vec<u8>) -> Result<Artifact, IoError> {
        match self {
            OutputTarget::Buffer => Ok(Artifact::Bytes(bytes)),
            OutputTarget::Path(p) => {
                if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(p, &bytes)?;
                Ok(Artifact::Path(p.clone()))
            }
        }
    }
}

/// The result of a stage: a file on disk or an in-memory workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl Artifact {
    /// Check the artifact has the expected shape: an existing file, or a
    /// non-empty buffer carrying the xlsx signature.
    pub fn validate(&self) -> Result<(), IoError> {
        match self {
            Artifact::Path(p) if p.is_file() => Ok(()),
            Artifact::Path(p) => Err(IoError::NotFound(p.clone())),
            Artifact::Bytes(b) if b.is_empty() => {
                Err(IoError::MalformedArtifact("empty buffer".to_string()))
            }
            Artifact::Bytes(b) if !looks_like_xlsx(b) => Err(IoError::MalformedArtifact(format!(
                "buffer of {} bytes without an xlsx signature",
                b.len()
            ))),
            Artifact::Bytes(_) => Ok(()),
        }
    }

    /// Persist the artifact at `dest`. A buffer is written out, a path is
    /// copied unless it already is `dest`.
    pub fn persist_to(&self, dest: &Path) -> Result<(), IoError> {
        self.validate()?;
        if let Some(parent) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        match self {
            Artifact::Bytes(b) => fs::write(dest, b)?,
            Artifact::Path(p) => {
                if !same_file(p, dest) {
                    fs::copy(p, dest)?;
                }
            }
        }
        Ok(())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, IoError> {
        self.validate()?;
        match self {
            Artifact::Bytes(b) => Ok(b),
            Artifact::Path(p) => Ok(fs::read(p)?),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_not_found() {
        let err = Source::path("/definitely/not/here.xlsx").bytes().unwrap_err();
        assert!(matches!(err, IoError::NotFound(_)));
        assert!(err.to_string().contains("/definitely/not/here.xlsx"));
    }

    #[test]
    fn reader_is_buffered() {
        let src = Source::from_reader(&b"a;b\n1;2\n"[..]).unwrap();
        assert_eq!(src.bytes().unwrap(), b"a;b\n1;2\n".to_vec());
    }

    #[test]
    fn malformed_buffers_are_rejected() {
        let empty = Artifact::Bytes(Vec::new()).validate().unwrap_err();
        assert!(empty.to_string().contains("empty buffer"));
        let text = Artifact::Bytes(b"hello".to_vec()).validate().unwrap_err();
        assert!(matches!(text, IoError::MalformedArtifact(_)));
        assert!(Artifact::Bytes(b"PK\x03\x04rest".to_vec()).validate().is_ok());
    }

    #[test]
    fn persist_buffer_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("nested/a.xlsx");
        Artifact::Bytes(b"PK\x03\x04data".to_vec()).persist_to(&first).unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"PK\x03\x04data");

        let second = dir.path().join("b.xlsx");
        Artifact::Path(first.clone()).persist_to(&second).unwrap();
        assert_eq!(fs::read(&second).unwrap(), b"PK\x03\x04data");

        // persisting onto itself leaves the file alone
        Artifact::Path(first.clone()).persist_to(&first).unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"PK\x03\x04data");
    }

    #[test]
    fn buffer_target_returns_bytes() {
        let art = OutputTarget::Buffer.emit(vec![1, 2, 3]).unwrap();
        assert_eq!(art, Artifact::Bytes(vec![1, 2, 3]));
    }
}
