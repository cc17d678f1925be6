//! `espelhos-pipeline`: the driver settlement pipeline.
//!
//! Three stages over spreadsheet data:
//! 1. consolidate the roster and settlement tables (left join on driver name),
//! 2. fan the consolidated table out into one mirror sheet per driver,
//! 3. roll the mirror sheets up into the RESUMO and RESUMO TOTAL sheets.
//!
//! Stages read through `espelhos_io::Source` and write through
//! `espelhos_io::OutputTarget`. No CLI or workspace concerns live here.

pub mod config;
pub mod consolidate;
pub mod error;
pub mod fields;
pub mod layout;
pub mod mirror;
pub mod stages;
pub mod styles;
pub mod summary;

pub use config::PipelineConfig;
pub use consolidate::{consolidate, ConsolidationReport};
pub use error::PipelineError;
pub use fields::{Field, FieldMap};
pub use layout::EntityLayout;
pub use mirror::{build_mirrors, MirrorBook, MirrorReport};
pub use stages::{consolidate_sources, generate_mirrors, generate_summaries, run, RunReport};
pub use summary::{build_summaries, SummaryReport};
