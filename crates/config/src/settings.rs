// User settings
// Loaded from ~/.config/espelhos/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default upload cap in megabytes.
pub const DEFAULT_UPLOAD_MAX_MB: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Storage
    #[serde(rename = "workspace.root")]
    pub workspace_root: Option<PathBuf>, // None = data dir

    #[serde(rename = "upload.maxSizeMb")]
    pub upload_max_mb: u64,

    // Pipeline
    #[serde(rename = "pipeline.template")]
    pub default_template: Option<PathBuf>,

    #[serde(rename = "pipeline.config")]
    pub pipeline_config: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace_root: None,
            upload_max_mb: DEFAULT_UPLOAD_MAX_MB,
            default_template: None,
            pipeline_config: None,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("espelhos");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("error parsing {}: {}; using default settings", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with // are comments.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned)
    }

    /// Save current settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Directory holding `workspaces/` and `downloads/`
    pub fn storage_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("espelhos")
        })
    }

    pub fn upload_max_bytes(&self) -> u64 {
        self.upload_max_mb.saturating_mul(1024 * 1024)
    }

    /// Commented default file, for `settings.json` scaffolding
    pub fn default_file_contents() -> &'static str {
        r#"{
    // Where workspaces/ and downloads/ live (null = user data directory)
    "workspace.root": null,

    // Largest accepted upload, in megabytes
    "upload.maxSizeMb": 50,

    // Template workbook for mirror sheets
    "pipeline.template": null,

    // Optional TOML with header aliases, identity cells and output names
    "pipeline.config": null
}
"#
    }
}
