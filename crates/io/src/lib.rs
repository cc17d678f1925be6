// File I/O: tabular sources, xlsx workbooks and stage artifacts

pub mod csv;
pub mod error;
pub mod source;
pub mod tabular;
pub mod xlsx;
pub mod xlsx_styles;

pub use error::IoError;
pub use source::{Artifact, OutputTarget, Source};
