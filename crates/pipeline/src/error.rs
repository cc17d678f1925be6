use std::fmt;
use std::path::PathBuf;

use espelhos_io::IoError;

#[derive(Debug)]
pub enum PipelineError {
    /// An input path that does not resolve to readable data.
    SourceNotFound(PathBuf),
    /// Input bytes that cannot be parsed into rows and columns.
    MalformedInput(String),
    /// No alias of a required field is present in the table.
    MissingColumn { table: String, field: String },
    /// A stage artifact that is neither a workbook buffer nor an existing path.
    MalformedReturn(String),
    /// The consolidated table has no non-blank driver names.
    NoEntities,
    /// The template workbook has no sheets or cannot be read.
    Template(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty alias list, bad cell reference, etc.).
    ConfigValidation(String),
    /// IO error (write failures, etc.).
    Io(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceNotFound(path) => write!(f, "source not found: {}", path.display()),
            Self::MalformedInput(msg) => write!(f, "malformed tabular data: {msg}"),
            Self::MissingColumn { table, field } => {
                write!(f, "required column missing: table '{table}' has no '{field}' column")
            }
            Self::MalformedReturn(msg) => write!(f, "malformed stage result: {msg}"),
            Self::NoEntities => write!(f, "no entities: no rows carry a driver name"),
            Self::Template(msg) => write!(f, "template error: {msg}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<IoError> for PipelineError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::NotFound(path) => Self::SourceNotFound(path),
            IoError::Malformed(msg) => Self::MalformedInput(msg),
            IoError::MalformedArtifact(msg) => Self::MalformedReturn(msg),
            IoError::Write(msg) => Self::Io(msg),
            IoError::Io(e) => Self::Io(e.to_string()),
        }
    }
}
