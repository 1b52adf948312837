pub mod error;
pub mod path;
pub mod process;

pub use error::{LauncherError, Result};
pub use path::{find_project_root, resolve_path, resolve_project_dir};
pub use process::{EnvMap, ProcessExecutor};
