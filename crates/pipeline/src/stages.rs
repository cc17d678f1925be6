//! Stage entry points over sources and output targets.
//!
//! Each stage reads fully materialized inputs, runs, and emits one workbook.
//! `run` chains all three in memory and hands the layout index straight
//! from stage 2 to stage 3; the per-stage entry points re-derive it from
//! the mirror workbook on disk.

use serde::Serialize;

use espelhos_engine::sheet::Sheet;
use espelhos_io::tabular::{load_table, write_table};
use espelhos_io::xlsx::{export_workbook, import_workbook};
use espelhos_io::{Artifact, IoError, OutputTarget, Source};

use crate::config::PipelineConfig;
use crate::consolidate::{consolidate, ConsolidationReport};
use crate::error::PipelineError;
use crate::mirror::{build_mirrors, MirrorBook, MirrorReport};
use crate::summary::{build_summaries, distinct_clients, SummaryReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub consolidation: ConsolidationReport,
    pub mirrors: MirrorReport,
    pub summary: SummaryReport,
}

/// The active sheet of the template workbook.
pub fn load_template(template: &Source) -> Result<Sheet, PipelineError> {
    let workbook = import_workbook(template).map_err(|e| match e {
        IoError::NotFound(path) => PipelineError::SourceNotFound(path),
        other => PipelineError::Template(other.to_string()),
    })?;
    workbook
        .sheet(workbook.active_sheet_index())
        .cloned()
        .ok_or_else(|| PipelineError::Template("template workbook has no sheets".into()))
}

/// Stage artifacts must be a workbook: an existing file or xlsx bytes.
fn checked(artifact: Artifact) -> Result<Artifact, PipelineError> {
    artifact.validate()?;
    Ok(artifact)
}

/// Stage 1: load both tables, join them and write the consolidated table.
pub fn consolidate_sources(
    roster: &Source,
    settlement: &Source,
    config: &PipelineConfig,
    target: &OutputTarget,
) -> Result<(Artifact, ConsolidationReport), PipelineError> {
    let roster = load_table(roster)?;
    let settlement = load_table(settlement)?;
    let (table, report) = consolidate(&roster, &settlement, &config.alias_set())?;
    let artifact = write_table(&table, &config.output.consolidated_sheet, target)?;
    Ok((checked(artifact)?, report))
}

/// Stage 2: one mirror sheet per driver of the consolidated table.
pub fn generate_mirrors(
    consolidated: &Source,
    template: &Source,
    config: &PipelineConfig,
    target: &OutputTarget,
) -> Result<(Artifact, MirrorReport), PipelineError> {
    let table = load_table(consolidated)?;
    let template = load_template(template)?;
    let (book, report) = build_mirrors(&table, &template, config)?;
    let artifact = export_workbook(&book.workbook, target)?;
    Ok((checked(artifact)?, report))
}

/// Stage 3: add the summary sheets to a mirror workbook. The layout index is
/// rebuilt by scanning the mirror sheets for their anchor labels.
pub fn generate_summaries(
    mirrors: &Source,
    consolidated: &Source,
    config: &PipelineConfig,
    target: &OutputTarget,
) -> Result<(Artifact, SummaryReport), PipelineError> {
    let workbook = import_workbook(mirrors)?;
    let table = load_table(consolidated)?;
    let clients = distinct_clients(&table, &config.alias_set());
    let cells = config.layout.identity()?;
    let book = MirrorBook::from_workbook(workbook, &clients, &cells);
    let (workbook, report) = build_summaries(book, &clients);
    let artifact = export_workbook(&workbook, target)?;
    Ok((checked(artifact)?, report))
}

/// Join, build and summarize in memory, then write the final workbook.
pub fn run(
    roster: &Source,
    settlement: &Source,
    template: &Source,
    config: &PipelineConfig,
    target: &OutputTarget,
) -> Result<(Artifact, RunReport), PipelineError> {
    let roster = load_table(roster)?;
    let settlement = load_table(settlement)?;
    let template = load_template(template)?;
    let aliases = config.alias_set();

    let (table, consolidation) = consolidate(&roster, &settlement, &aliases)?;
    let (book, mirrors) = build_mirrors(&table, &template, config)?;
    let clients = distinct_clients(&table, &aliases);
    let (workbook, summary) = build_summaries(book, &clients);

    let artifact = export_workbook(&workbook, target)?;
    Ok((checked(artifact)?, RunReport { consolidation, mirrors, summary }))
}

