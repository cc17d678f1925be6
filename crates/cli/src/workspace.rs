// workspace subcommands: upload, run the stages in order, download

use std::path::PathBuf;

use clap::Subcommand;
use serde::Serialize;

use espelhos_config::{RunState, Settings, Workspace};
use espelhos_io::Source;

use crate::{load_config, print_consolidation, print_json, print_mirrors, print_summary, resolve_template, CliError};

#[derive(clap::Args, Debug, Clone)]
pub struct RootArgs {
    /// Storage root holding workspaces/ and downloads/ (default: settings)
    #[arg(long, env = "ESPELHOS_ROOT")]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Create a workspace and print its id
    Init {
        #[command(flatten)]
        root: RootArgs,

        #[arg(long)]
        json: bool,
    },

    /// Copy the roster and settlement workbooks into a workspace
    Upload {
        id: String,

        #[arg(long)]
        roster: PathBuf,

        #[arg(long)]
        settlement: PathBuf,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Stage 1 on the uploaded tables
    Step1 {
        id: String,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Stage 2 on the consolidated table
    Step2 {
        id: String,

        #[arg(long, short = 't')]
        template: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Stage 3 on the mirror workbook; publishes the final workbook
    Step3 {
        id: String,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Show which stages are done
    Status {
        id: String,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        root: RootArgs,
    },

    /// Copy the final workbook out of the workspace
    Download {
        id: String,

        #[arg(long, short = 'o')]
        output: PathBuf,

        #[command(flatten)]
        root: RootArgs,
    },
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    id: &'a str,
    #[serde(flatten)]
    state: &'a RunState,
}

fn storage_root(settings: &Settings, args: &RootArgs) -> PathBuf {
    args.root.clone().unwrap_or_else(|| settings.storage_root())
}

fn open(settings: &Settings, args: &RootArgs, id: &str) -> Result<Workspace, CliError> {
    Ok(Workspace::open(&storage_root(settings, args), id)?)
}

fn flag(done: bool) -> &'static str {
    if done {
        "done"
    } else {
        "pending"
    }
}

pub fn dispatch(settings: &Settings, command: WorkspaceCommands) -> Result<(), CliError> {
    match command {
        WorkspaceCommands::Init { root, json } => {
            let ws = Workspace::create(&storage_root(settings, &root))?;
            if json {
                print_json(&serde_json::json!({ "id": ws.id(), "dir": ws.dir() }))
            } else {
                println!("{}", ws.id());
                Ok(())
            }
        }
        WorkspaceCommands::Upload { id, roster, settlement, root } => {
            let ws = open(settings, &root, &id)?;
            ws.upload(&roster, &settlement, settings.upload_max_bytes())?;
            println!("uploaded; next: espelhos workspace step1 {}", ws.id());
            Ok(())
        }
        WorkspaceCommands::Step1 { id, config, json, root } => {
            let ws = open(settings, &root, &id)?;
            let config = load_config(settings, config.as_deref())?;
            let report = ws.step1(&config)?;
            if json {
                return print_json(&report);
            }
            print_consolidation(&report, &ws.dir().join(&config.output.consolidated));
            Ok(())
        }
        WorkspaceCommands::Step2 { id, template, config, json, root } => {
            let ws = open(settings, &root, &id)?;
            let config = load_config(settings, config.as_deref())?;
            let template = resolve_template(settings, template)?;
            let report = ws.step2(&Source::path(template), &config)?;
            if json {
                return print_json(&report);
            }
            print_mirrors(&report, &ws.dir().join(&config.output.mirrors));
            Ok(())
        }
        WorkspaceCommands::Step3 { id, config, json, root } => {
            let ws = open(settings, &root, &id)?;
            let config = load_config(settings, config.as_deref())?;
            let report = ws.step3(&config)?;
            if json {
                return print_json(&report);
            }
            print_summary(&report, &ws.final_artifact()?);
            Ok(())
        }
        WorkspaceCommands::Status { id, json, root } => {
            let ws = open(settings, &root, &id)?;
            let state = ws.state()?;
            if json {
                return print_json(&StatusOutput { id: ws.id(), state: &state });
            }
            println!("workspace {}", ws.id());
            println!("  uploaded  {}", if state.uploaded { "yes" } else { "no" });
            println!("  step1     {}", flag(state.step1_done));
            println!("  step2     {}", flag(state.step2_done));
            println!("  step3     {}", flag(state.step3_done));
            Ok(())
        }
        WorkspaceCommands::Download { id, output, root } => {
            let ws = open(settings, &root, &id)?;
            let final_path = ws.final_artifact()?;
            std::fs::copy(&final_path, &output)
                .map_err(|e| CliError::io(format!("cannot write {}: {}", output.display(), e)))?;
            println!("{}", output.display());
            Ok(())
        }
    }
}
