// Espelhos CLI - driver settlement pipeline
//
// consolidate -> mirrors -> summary, either one stage at a time on files or
// through a workspace that tracks which stages are done.

mod exit_codes;
mod workspace;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use serde::Serialize;

use espelhos_config::{Settings, WorkspaceError};
use espelhos_io::{OutputTarget, Source};
use espelhos_pipeline::{
    consolidate_sources, generate_mirrors, generate_summaries, run, PipelineConfig, PipelineError,
};

use exit_codes::{pipeline_exit_code, workspace_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "espelhos")]
#[command(about = "Driver settlement pipeline: consolidated table, mirror sheets, summaries")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Only print warnings and errors (RUST_LOG overrides)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Settings file (default: <config dir>/espelhos/settings.json)
    #[arg(long, global = true, env = "ESPELHOS_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every stage command
#[derive(clap::Args, Debug, Clone)]
struct StageArgs {
    /// Pipeline configuration (TOML: [aliases], [layout], [output])
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the stage report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage 1: join the driver roster onto the settlement table
    #[command(after_help = "\
Examples:
  espelhos consolidate motoristas.xlsx fechamento.xlsx
  espelhos consolidate motoristas.xlsx fechamento.csv -o banco.xlsx --json")]
    Consolidate {
        /// Driver roster (xlsx, xls or csv)
        roster: PathBuf,

        /// Settlement table (xlsx, xls or csv)
        settlement: PathBuf,

        /// Output workbook (default: [output].consolidated)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[command(flatten)]
        stage: StageArgs,
    },

    /// Stage 2: one mirror sheet per driver from a template
    #[command(after_help = "\
Examples:
  espelhos mirrors banco_consolidado.xlsx --template modelo.xlsx")]
    Mirrors {
        /// Consolidated table from stage 1
        consolidated: PathBuf,

        /// Template workbook; its active sheet is copied for every driver
        #[arg(long, short = 't')]
        template: Option<PathBuf>,

        /// Output workbook (default: [output].mirrors)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[command(flatten)]
        stage: StageArgs,
    },

    /// Stage 3: add RESUMO and RESUMO TOTAL to a mirror workbook
    #[command(after_help = "\
Examples:
  espelhos summary Espelhos_Motoristas.xlsx banco_consolidado.xlsx
  espelhos summary Espelhos_Motoristas.xlsx banco_consolidado.xlsx -o final.xlsx")]
    Summary {
        /// Mirror workbook from stage 2
        mirrors: PathBuf,

        /// Consolidated table from stage 1 (lists the clients)
        consolidated: PathBuf,

        /// Output workbook (default: rewrite MIRRORS in place)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[command(flatten)]
        stage: StageArgs,
    },

    /// All three stages in memory
    Run {
        roster: PathBuf,

        settlement: PathBuf,

        #[arg(long, short = 't')]
        template: Option<PathBuf>,

        #[arg(long, short = 'o')]
        output: PathBuf,

        #[command(flatten)]
        stage: StageArgs,
    },

    /// Upload-driven runs with persisted stage state
    #[command(subcommand)]
    Workspace(workspace::WorkspaceCommands),
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nbuild:   ", env!("ESPELHOS_BUILD_PROFILE"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let settings = match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let result = match cli.command {
        Commands::Consolidate { roster, settlement, output, stage } => {
            cmd_consolidate(&settings, roster, settlement, output, stage)
        }
        Commands::Mirrors { consolidated, template, output, stage } => {
            cmd_mirrors(&settings, consolidated, template, output, stage)
        }
        Commands::Summary { mirrors, consolidated, output, stage } => {
            cmd_summary(&settings, mirrors, consolidated, output, stage)
        }
        Commands::Run { roster, settlement, template, output, stage } => {
            cmd_run(&settings, roster, settlement, template, output, stage)
        }
        Commands::Workspace(command) => workspace::dispatch(&settings, command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        let hint = match &err {
            PipelineError::MissingColumn { .. } => {
                Some("extra header spellings can be listed under [aliases] in a --config file".to_string())
            }
            PipelineError::ConfigParse(_) | PipelineError::ConfigValidation(_) => {
                Some("see [aliases], [layout] and [output] in the pipeline config".to_string())
            }
            _ => None,
        };
        Self { code: pipeline_exit_code(&err), message: err.to_string(), hint }
    }
}

impl From<WorkspaceError> for CliError {
    fn from(err: WorkspaceError) -> Self {
        let hint = match &err {
            WorkspaceError::StageOrder(_) => Some("check progress with `espelhos workspace status <ID>`".to_string()),
            WorkspaceError::FinalNotReady => Some("run `espelhos workspace step3 <ID>` first".to_string()),
            WorkspaceError::UploadRejected(_) => Some("only .xlsx files under the upload size cap are accepted".to_string()),
            _ => None,
        };
        Self { code: workspace_exit_code(&err), message: err.to_string(), hint }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Pipeline config from --config, else the settings file's, else defaults.
pub(crate) fn load_config(settings: &Settings, explicit: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let path = explicit.map(Path::to_path_buf).or_else(|| settings.pipeline_config.clone());
    match path {
        Some(path) => {
            log::debug!("pipeline config: {}", path.display());
            Ok(PipelineConfig::load(&path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Template from --template, else the settings file's default.
pub(crate) fn resolve_template(settings: &Settings, explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit
        .or_else(|| settings.default_template.clone())
        .ok_or_else(|| {
            CliError::args("no template workbook given")
                .with_hint("pass --template FILE or set \"pipeline.template\" in settings.json")
        })
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", json).map_err(|e| CliError::io(e.to_string()))
}

pub(crate) fn money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let mut int = (cents / 100).to_string();
    let mut grouped = String::new();
    while int.len() > 3 {
        let tail = int.split_off(int.len() - 3);
        grouped = format!(".{}{}", tail, grouped);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}R$ {}{},{:02}", sign, int, grouped, cents % 100)
}

pub(crate) fn print_consolidation(report: &espelhos_pipeline::ConsolidationReport, out: &Path) {
    println!("consolidated {} rows ({} matched) -> {}", report.rows, report.matched, out.display());
    if !report.unmatched_drivers.is_empty() {
        println!("  no roster entry: {}", report.unmatched_drivers.join(", "));
    }
}

pub(crate) fn print_mirrors(report: &espelhos_pipeline::MirrorReport, out: &Path) {
    println!("{} mirror sheets -> {}", report.entities.len(), out.display());
    for entity in &report.entities {
        println!(
            "  {:<31}  {:>3} clients  {:>4} orders  {}",
            entity.sheet_name,
            entity.clients,
            entity.orders,
            money(entity.gross)
        );
    }
}

pub(crate) fn print_summary(report: &espelhos_pipeline::SummaryReport, out: &Path) {
    println!(
        "RESUMO + RESUMO TOTAL for {} drivers, {} clients -> {}",
        report.entities.len(),
        report.clients.len(),
        out.display()
    );
    for miss in &report.anchor_misses {
        println!("  sheet '{}': '{}' not found", miss.sheet, miss.anchor);
    }
    println!("net total: {}", money(report.net_total));
}

fn output_or(output: Option<PathBuf>, default_name: &str) -> PathBuf {
    output.unwrap_or_else(|| PathBuf::from(default_name))
}

// ============================================================================
// consolidate
// ============================================================================

fn cmd_consolidate(
    settings: &Settings,
    roster: PathBuf,
    settlement: PathBuf,
    output: Option<PathBuf>,
    stage: StageArgs,
) -> Result<(), CliError> {
    let config = load_config(settings, stage.config.as_deref())?;
    let out = output_or(output, &config.output.consolidated);
    let (_, report) = consolidate_sources(
        &Source::path(roster),
        &Source::path(settlement),
        &config,
        &OutputTarget::path(&out),
    )?;
    if stage.json {
        print_json(&report)
    } else {
        print_consolidation(&report, &out);
        Ok(())
    }
}

// ============================================================================
// mirrors
// ============================================================================

fn cmd_mirrors(
    settings: &Settings,
    consolidated: PathBuf,
    template: Option<PathBuf>,
    output: Option<PathBuf>,
    stage: StageArgs,
) -> Result<(), CliError> {
    let config = load_config(settings, stage.config.as_deref())?;
    let template = resolve_template(settings, template)?;
    let out = output_or(output, &config.output.mirrors);
    let (_, report) = generate_mirrors(
        &Source::path(consolidated),
        &Source::path(template),
        &config,
        &OutputTarget::path(&out),
    )?;
    if stage.json {
        print_json(&report)
    } else {
        print_mirrors(&report, &out);
        Ok(())
    }
}

// ============================================================================
// summary
// ============================================================================

fn cmd_summary(
    settings: &Settings,
    mirrors: PathBuf,
    consolidated: PathBuf,
    output: Option<PathBuf>,
    stage: StageArgs,
) -> Result<(), CliError> {
    let config = load_config(settings, stage.config.as_deref())?;
    let out = output.unwrap_or_else(|| mirrors.clone());
    let (_, report) = generate_summaries(
        &Source::path(mirrors),
        &Source::path(consolidated),
        &config,
        &OutputTarget::path(&out),
    )?;
    if stage.json {
        print_json(&report)
    } else {
        print_summary(&report, &out);
        Ok(())
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    settings: &Settings,
    roster: PathBuf,
    settlement: PathBuf,
    template: Option<PathBuf>,
    output: PathBuf,
    stage: StageArgs,
) -> Result<(), CliError> {
    let config = load_config(settings, stage.config.as_deref())?;
    let template = resolve_template(settings, template)?;
    let (_, report) = run(
        &Source::path(roster),
        &Source::path(settlement),
        &Source::path(template),
        &config,
        &OutputTarget::path(&output),
    )?;
    if stage.json {
        print_json(&report)
    } else {
        print_consolidation(&report.consolidation, &output);
        print_mirrors(&report.mirrors, &output);
        print_summary(&report.summary, &output);
        Ok(())
    }
}
