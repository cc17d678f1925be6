//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                                  |
//! |---------|------------|----------------------------------------------|
//! | 0       | Universal  | Success                                      |
//! | 1       | Universal  | General error (unspecified)                  |
//! | 2       | Universal  | CLI usage error (bad args, bad workspace id) |
//! | 3-9     | pipeline   | Stage failures                               |
//! | 10-19   | workspace  | Workspace state and upload codes             |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `pipeline_exit_code` / `workspace_exit_code`

use espelhos_config::WorkspaceError;
use espelhos_pipeline::PipelineError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure (write errors, state file I/O).
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Pipeline (3-9)
// =============================================================================

/// An input file (roster, settlement, template, stage artifact) does not exist.
pub const EXIT_INPUT_NOT_FOUND: u8 = 3;

/// A required column is missing under every accepted header spelling.
pub const EXIT_MISSING_COLUMN: u8 = 4;

/// Input could not be parsed as a table or workbook, or yields no drivers.
pub const EXIT_MALFORMED_INPUT: u8 = 5;

/// A stage produced something that is neither a workbook nor a file.
pub const EXIT_MALFORMED_RETURN: u8 = 6;

/// Pipeline configuration could not be parsed or failed validation.
pub const EXIT_CONFIG: u8 = 7;

// =============================================================================
// Workspace (10-19)
// =============================================================================

/// A workspace step was requested before the step it depends on.
pub const EXIT_STAGE_ORDER: u8 = 10;

/// Upload refused (extension not allowed, file over the size cap).
pub const EXIT_UPLOAD_REJECTED: u8 = 11;

/// Download requested before step3 produced the final workbook.
pub const EXIT_FINAL_NOT_READY: u8 = 12;

// =============================================================================
// Mapping
// =============================================================================

pub fn pipeline_exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::SourceNotFound(_) => EXIT_INPUT_NOT_FOUND,
        PipelineError::MissingColumn { .. } => EXIT_MISSING_COLUMN,
        PipelineError::MalformedInput(_) | PipelineError::NoEntities | PipelineError::Template(_) => {
            EXIT_MALFORMED_INPUT
        }
        PipelineError::MalformedReturn(_) => EXIT_MALFORMED_RETURN,
        PipelineError::ConfigParse(_) | PipelineError::ConfigValidation(_) => EXIT_CONFIG,
        PipelineError::Io(_) => EXIT_ERROR,
    }
}

pub fn workspace_exit_code(err: &WorkspaceError) -> u8 {
    match err {
        WorkspaceError::InvalidId(_) => EXIT_USAGE,
        WorkspaceError::NotFound(_) => EXIT_INPUT_NOT_FOUND,
        WorkspaceError::UploadRejected(_) => EXIT_UPLOAD_REJECTED,
        WorkspaceError::StageOrder(_) => EXIT_STAGE_ORDER,
        WorkspaceError::FinalNotReady => EXIT_FINAL_NOT_READY,
        WorkspaceError::Pipeline(e) => pipeline_exit_code(e),
        WorkspaceError::Io(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pipeline_codes() {
        assert_eq!(pipeline_exit_code(&PipelineError::SourceNotFound(PathBuf::from("x"))), 3);
        assert_eq!(
            pipeline_exit_code(&PipelineError::MissingColumn { table: "roster".into(), field: "contrato".into() }),
            4
        );
        assert_eq!(pipeline_exit_code(&PipelineError::NoEntities), 5);
        assert_eq!(pipeline_exit_code(&PipelineError::MalformedReturn("empty".into())), 6);
        assert_eq!(pipeline_exit_code(&PipelineError::ConfigValidation("bad".into())), 7);
    }

    #[test]
    fn workspace_codes_wrap_pipeline_codes() {
        assert_eq!(workspace_exit_code(&WorkspaceError::StageOrder("x".into())), 10);
        assert_eq!(workspace_exit_code(&WorkspaceError::UploadRejected("x".into())), 11);
        assert_eq!(workspace_exit_code(&WorkspaceError::FinalNotReady), 12);
        assert_eq!(
            workspace_exit_code(&WorkspaceError::Pipeline(PipelineError::SourceNotFound(PathBuf::from("x")))),
            3
        );
    }
}
