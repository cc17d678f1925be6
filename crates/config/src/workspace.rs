// Per-upload workspaces
//
// Layout under the storage root:
//   workspaces/{id}/state.json          run state
//   workspaces/{id}/motoristas__*.xlsx  uploaded roster
//   workspaces/{id}/fechamento__*.xlsx  uploaded settlement table
//   workspaces/{id}/<stage outputs>
//   downloads/{id}/<final workbook>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use espelhos_io::{OutputTarget, Source};
use espelhos_pipeline::{
    consolidate_sources, generate_mirrors, generate_summaries, ConsolidationReport, MirrorReport, PipelineConfig,
    PipelineError, SummaryReport,
};

const STATE_FILE: &str = "state.json";
const ALLOWED_EXTENSIONS: [&str; 1] = ["xlsx"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum WorkspaceError {
    /// The id is not a workspace id (32 lowercase hex characters).
    InvalidId(String),
    /// No workspace directory for this id.
    NotFound(String),
    /// Upload refused: wrong extension, too large or unreadable name.
    UploadRejected(String),
    /// A step was requested before the one it depends on.
    StageOrder(String),
    /// Download requested before the final workbook exists.
    FinalNotReady,
    /// The stage itself failed.
    Pipeline(PipelineError),
    /// State file or copy failure.
    Io(String),
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId(id) => write!(f, "invalid workspace id: '{id}'"),
            Self::NotFound(id) => write!(f, "workspace not found: {id}"),
            Self::UploadRejected(msg) => write!(f, "upload rejected: {msg}"),
            Self::StageOrder(msg) => write!(f, "stage order: {msg}"),
            Self::FinalNotReady => write!(f, "final workbook not ready: run step3 first"),
            Self::Pipeline(e) => write!(f, "{e}"),
            Self::Io(msg) => write!(f, "workspace I/O error: {msg}"),
        }
    }
}

impl std::error::Error for WorkspaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pipeline(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PipelineError> for WorkspaceError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<std::io::Error> for WorkspaceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Files produced or received so far. Paths are absolute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFiles {
    pub motoristas: Option<PathBuf>,
    pub fechamento: Option<PathBuf>,
    pub banco: Option<PathBuf>,
    pub espelhos: Option<PathBuf>,
    #[serde(rename = "final")]
    pub final_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub uploaded: bool,
    pub step1_done: bool,
    pub step2_done: bool,
    pub step3_done: bool,
    pub files: RunFiles,
}

/// Existing file recorded in the state, or a stage-order error naming it.
fn recorded(path: &Option<PathBuf>, what: &str) -> Result<PathBuf, WorkspaceError> {
    match path {
        Some(p) if p.is_file() => Ok(p.clone()),
        Some(p) => Err(WorkspaceError::Pipeline(PipelineError::SourceNotFound(p.clone()))),
        None => Err(WorkspaceError::StageOrder(format!("{what} is missing"))),
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Reduce an uploaded file name to a safe ASCII name: path components are
/// dropped, whitespace becomes '_', and anything outside [A-Za-z0-9._-] is
/// removed. Leading dots and underscores are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

fn check_upload(path: &Path, max_bytes: u64) -> Result<String, WorkspaceError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WorkspaceError::UploadRejected(format!("invalid file name: {}", path.display())))?;
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(WorkspaceError::UploadRejected(format!("only .xlsx files are accepted: {name}")));
    }
    let meta = fs::metadata(path)
        .map_err(|_| WorkspaceError::Pipeline(PipelineError::SourceNotFound(path.to_path_buf())))?;
    if meta.len() > max_bytes {
        return Err(WorkspaceError::UploadRejected(format!(
            "{name} is {} bytes, limit is {max_bytes}",
            meta.len()
        )));
    }
    let safe = sanitize_file_name(name);
    if safe.is_empty() || Path::new(&safe).extension().is_none() {
        return Err(WorkspaceError::UploadRejected(format!("invalid file name: {name}")));
    }
    Ok(safe)
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    downloads: PathBuf,
}

fn valid_id(id: &str) -> bool {
    id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

impl Workspace {
    fn at(root: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            dir: root.join("workspaces").join(id),
            downloads: root.join("downloads").join(id),
        }
    }

    /// Create a new empty workspace under `root`
    pub fn create(root: &Path) -> Result<Self, WorkspaceError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let ws = Self::at(root, &id);
        fs::create_dir_all(&ws.dir)?;
        ws.save_state(&RunState::default())?;
        log::info!("created workspace {}", id);
        Ok(ws)
    }

    /// Open an existing workspace
    pub fn open(root: &Path, id: &str) -> Result<Self, WorkspaceError> {
        if !valid_id(id) {
            return Err(WorkspaceError::InvalidId(id.to_string()));
        }
        let ws = Self::at(root, id);
        if !ws.dir.is_dir() {
            return Err(WorkspaceError::NotFound(id.to_string()));
        }
        Ok(ws)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current run state; a workspace without a state file is fresh
    pub fn state(&self) -> Result<RunState, WorkspaceError> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(RunState::default());
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents).map_err(|e| WorkspaceError::Io(format!("{}: {}", path.display(), e)))
    }

    fn save_state(&self, state: &RunState) -> Result<(), WorkspaceError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| WorkspaceError::Io(e.to_string()))?;
        fs::write(self.dir.join(STATE_FILE), json)?;
        Ok(())
    }

    /// Copy both tables into the workspace and reset every stage
    pub fn upload(&self, roster: &Path, settlement: &Path, max_bytes: u64) -> Result<RunState, WorkspaceError> {
        let roster_name = check_upload(roster, max_bytes)?;
        let settlement_name = check_upload(settlement, max_bytes)?;

        let roster_dest = self.dir.join(format!("motoristas__{roster_name}"));
        let settlement_dest = self.dir.join(format!("fechamento__{settlement_name}"));
        fs::copy(roster, &roster_dest)?;
        fs::copy(settlement, &settlement_dest)?;

        let state = RunState {
            uploaded: true,
            files: RunFiles {
                motoristas: Some(roster_dest),
                fechamento: Some(settlement_dest),
                ..RunFiles::default()
            },
            ..RunState::default()
        };
        self.save_state(&state)?;
        log::info!("workspace {}: uploaded {} and {}", self.id, roster_name, settlement_name);
        Ok(state)
    }

    /// Stage 1: consolidated table
    pub fn step1(&self, config: &PipelineConfig) -> Result<ConsolidationReport, WorkspaceError> {
        let mut state = self.state()?;
        if !state.uploaded {
            return Err(WorkspaceError::StageOrder("upload both tables first".into()));
        }
        let roster = recorded(&state.files.motoristas, "roster upload")?;
        let settlement = recorded(&state.files.fechamento, "settlement upload")?;

        let out = self.dir.join(&config.output.consolidated);
        let (_, report) = consolidate_sources(
            &Source::path(roster),
            &Source::path(settlement),
            config,
            &OutputTarget::path(&out),
        )?;

        state.files.banco = Some(out);
        state.step1_done = true;
        state.step2_done = false;
        state.step3_done = false;
        self.save_state(&state)?;
        Ok(report)
    }

    /// Stage 2: mirror workbook
    pub fn step2(&self, template: &Source, config: &PipelineConfig) -> Result<MirrorReport, WorkspaceError> {
        let mut state = self.state()?;
        if !state.step1_done {
            return Err(WorkspaceError::StageOrder("run step1 first".into()));
        }
        let banco = recorded(&state.files.banco, "consolidated table")?;

        let out = self.dir.join(&config.output.mirrors);
        let (_, report) = generate_mirrors(&Source::path(banco), template, config, &OutputTarget::path(&out))?;

        state.files.espelhos = Some(out);
        state.step2_done = true;
        state.step3_done = false;
        self.save_state(&state)?;
        Ok(report)
    }

    /// Stage 3: summaries written into the mirror workbook, then copied to
    /// the download area
    pub fn step3(&self, config: &PipelineConfig) -> Result<SummaryReport, WorkspaceError> {
        let mut state = self.state()?;
        if !state.step2_done {
            return Err(WorkspaceError::StageOrder("run step2 first".into()));
        }
        let espelhos = recorded(&state.files.espelhos, "mirror workbook")?;
        let banco = recorded(&state.files.banco, "consolidated table")?;

        let (_, report) = generate_summaries(
            &Source::path(&espelhos),
            &Source::path(banco),
            config,
            &OutputTarget::path(&espelhos),
        )?;

        fs::create_dir_all(&self.downloads)?;
        let final_path = self.downloads.join(&config.output.final_name);
        if final_path.exists() {
            fs::remove_file(&final_path)?;
        }
        fs::copy(&espelhos, &final_path)?;

        state.files.final_path = Some(final_path);
        state.step3_done = true;
        self.save_state(&state)?;
        Ok(report)
    }

    /// The final workbook, once step3 has produced it
    pub fn final_artifact(&self) -> Result<PathBuf, WorkspaceError> {
        let state = self.state()?;
        match (&state.files.final_path, state.step3_done) {
            (Some(path), true) if path.is_file() => Ok(path.clone()),
            _ => Err(WorkspaceError::FinalNotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("Fechamento Janeiro.xlsx"), "Fechamento_Janeiro.xlsx");
        assert_eq!(sanitize_file_name("../../etc/passwd.xlsx"), "passwd.xlsx");
        assert_eq!(sanitize_file_name("C:\\Users\\ana\\motoristas.xlsx"), "motoristas.xlsx");
        assert_eq!(sanitize_file_name("relatório (1).xlsx"), "relatrio_1.xlsx");
        assert_eq!(sanitize_file_name("..hidden.xlsx"), "hidden.xlsx");
    }

    #[test]
    fn ids_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workspace::open(dir.path(), "../escape").unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidId(_)));
        let err = Workspace::open(dir.path(), &"a".repeat(32)).unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[test]
    fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        assert_eq!(ws.id().len(), 32);
        let again = Workspace::open(dir.path(), ws.id()).unwrap();
        assert_eq!(again.state().unwrap(), RunState::default());
        assert!(dir.path().join("workspaces").join(ws.id()).join("state.json").is_file());
    }

    #[test]
    fn upload_rules() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();

        let csv = dir.path().join("motoristas.csv");
        let xlsx = dir.path().join("Fechamento Jan.xlsx");
        fs::write(&csv, "a,b\n").unwrap();
        fs::write(&xlsx, vec![0u8; 64]).unwrap();

        let err = ws.upload(&csv, &xlsx, 1024).unwrap_err();
        assert!(err.to_string().contains("only .xlsx"));

        let err = ws.upload(&xlsx, &xlsx, 10).unwrap_err();
        assert!(matches!(err, WorkspaceError::UploadRejected(_)));

        let state = ws.upload(&xlsx, &xlsx, 1024).unwrap();
        assert!(state.uploaded);
        assert!(!state.step1_done);
        let roster = state.files.motoristas.unwrap();
        assert_eq!(roster.file_name().unwrap(), "motoristas__Fechamento_Jan.xlsx");
        assert!(roster.is_file());
    }

    #[test]
    fn steps_require_their_predecessor() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let config = PipelineConfig::default();

        let err = ws.step1(&config).unwrap_err();
        assert!(matches!(err, WorkspaceError::StageOrder(_)));
        let err = ws.step2(&Source::path("modelo.xlsx"), &config).unwrap_err();
        assert!(err.to_string().contains("step1"));
        let err = ws.step3(&config).unwrap_err();
        assert!(err.to_string().contains("step2"));
        assert!(matches!(ws.final_artifact(), Err(WorkspaceError::FinalNotReady)));
    }

    #[test]
    fn old_state_files_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        fs::write(
            ws.dir().join("state.json"),
            r#"{"uploaded": true, "step1_done": true, "files": {"banco": "/tmp/b.xlsx"}}"#,
        )
        .unwrap();
        let state = ws.state().unwrap();
        assert!(state.step1_done);
        assert!(!state.step2_done);
        assert_eq!(state.files.banco, Some(PathBuf::from("/tmp/b.xlsx")));
    }
}
