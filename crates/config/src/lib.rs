// Configuration loading and workspace storage

pub mod settings;
pub mod workspace;

pub use settings::Settings;
pub use workspace::{RunFiles, RunState, Workspace, WorkspaceError};
