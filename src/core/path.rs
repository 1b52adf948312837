use crate::core::error::{LauncherError, Result};
use std::path::{Path, PathBuf};

/// Files that mark the root of an Azure Functions project.
pub const PROJECT_MARKERS: &[&str] = &["host.json", "function_app.py"];

pub fn resolve_path(base_dir: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        base_dir.join(configured)
    }
}

pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if PROJECT_MARKERS
            .iter()
            .any(|marker| current.join(marker).is_file())
        {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

/// Pick the directory the launcher works from.
///
/// An explicit override wins (relative to `cwd`); otherwise the nearest
/// ancestor of `cwd` carrying a project marker; otherwise `cwd` itself.
pub fn resolve_project_dir(cwd: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => resolve_path(cwd, dir),
        None => find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf()),
    };

    dir.canonicalize().map_err(|e| {
        LauncherError::ProjectDir(format!("cannot access {}: {}", dir.display(), e))
    })
}
