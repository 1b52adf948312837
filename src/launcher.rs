use crate::core::error::Result;
use crate::core::{EnvMap, ProcessExecutor};
use crate::venv::{resolve_tool_environment, EnvironmentOverrides, VenvLayout, DEFAULT_VENV_DIR};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_PROGRAM: &str = "func";
pub const DEFAULT_ARGS: &[&str] = &["start"];

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub project_dir: PathBuf,
    pub venv: PathBuf,
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchConfig {
    /// `func start` with the project's `.venv`.
    pub fn new(project_dir: PathBuf) -> Self {
        Self {
            project_dir,
            venv: PathBuf::from(DEFAULT_VENV_DIR),
            program: DEFAULT_PROGRAM.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_venv(mut self, venv: impl Into<PathBuf>) -> Self {
        self.venv = venv.into();
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Environment produced by activation, ready to hand to a child.
#[derive(Debug, Clone)]
pub struct ActivatedEnvironment {
    pub overrides: EnvironmentOverrides,
    pub env: EnvMap,
}

/// Fully resolved invocation.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub overrides: EnvironmentOverrides,
    #[serde(skip)]
    pub env: EnvMap,
}

pub struct Launcher {
    config: LaunchConfig,
    parent_env: Option<EnvMap>,
}

impl Launcher {
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            parent_env: None,
        }
    }

    /// Use `env` instead of this process's environment as the base.
    pub fn with_parent_env(mut self, env: EnvMap) -> Self {
        self.parent_env = Some(env);
        self
    }

    pub async fn activate(&self) -> Result<ActivatedEnvironment> {
        let layout = VenvLayout::new(&self.config.project_dir, &self.config.venv);

        println!(
            "{} Activating virtual environment at {}",
            "⚙".blue().bold(),
            layout.venv_path().display().to_string().yellow()
        );

        let overrides = resolve_tool_environment(&layout).await?;
        let env = match &self.parent_env {
            Some(parent) => overrides.apply(parent.clone())?,
            None => overrides.apply(std::env::vars_os())?,
        };

        Ok(ActivatedEnvironment { overrides, env })
    }

    pub fn plan(&self, activated: ActivatedEnvironment) -> Result<LaunchPlan> {
        let search_path = EnvironmentOverrides::search_path(&activated.env);
        let program = ProcessExecutor::resolve_command(
            &self.config.program,
            &search_path,
            &self.config.project_dir,
        )?;
        debug!(program = %program.display(), "resolved executable");

        Ok(LaunchPlan {
            program,
            args: self.config.args.clone(),
            working_dir: self.config.project_dir.clone(),
            overrides: activated.overrides,
            env: activated.env,
        })
    }

    /// Activate and resolve without spawning anything.
    pub async fn dry_run(&self) -> Result<LaunchPlan> {
        let activated = self.activate().await?;
        self.plan(activated)
    }

    /// Activate, then run the program in the foreground. Returns its exit code.
    pub async fn run(&self) -> Result<i32> {
        let activated = self.activate().await?;

        println!(
            "{} Starting {}",
            "→".blue().bold(),
            self.config.command_line().cyan()
        );

        let plan = self.plan(activated)?;
        ProcessExecutor::run_foreground(&plan.program, &plan.args, &plan.env, &plan.working_dir)
            .await
    }
}
