use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Virtual environment activation script not found: {}", .0.display())]
    ActivationNotFound(PathBuf),

    #[error("Virtual environment activation failed: {0}")]
    ActivationFailed(String),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Project directory error: {0}")]
    ProjectDir(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LauncherError {
    /// Process exit code reported when the launcher itself fails.
    pub fn exit_code(&self) -> i32 {
        match self {
            LauncherError::CommandNotFound(_) => 127,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
