use crate::core::error::Result;
use crate::core::resolve_project_dir;
use crate::launcher::{LaunchConfig, Launcher};
use crate::venv::DEFAULT_VENV_DIR;
use clap::Parser;
use std::env;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "funcstart",
    version,
    about = "Activate the project's Python virtual environment and run `func start`",
    long_about = None
)]
pub struct Cli {
    /// Project directory (default: nearest ancestor with host.json or function_app.py, else the current directory)
    #[arg(long, env = "FUNCSTART_PROJECT_DIR", value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Virtual environment directory, relative to the project directory
    #[arg(long, env = "FUNCSTART_VENV", default_value = DEFAULT_VENV_DIR, value_name = "DIR")]
    pub venv: PathBuf,

    /// Resolve the environment and executable, print the plan as JSON, and exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Returns the exit code the process should end with.
pub async fn run(cli: Cli) -> Result<i32> {
    let cwd = env::current_dir()?;
    let project_dir = resolve_project_dir(&cwd, cli.project_dir.as_deref())?;
    debug!(project_dir = %project_dir.display(), "project directory");

    let launcher = Launcher::new(LaunchConfig::new(project_dir).with_venv(cli.venv));

    if cli.dry_run {
        let plan = launcher.dry_run().await?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    launcher.run().await
}
