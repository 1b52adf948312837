use crate::core::error::{LauncherError, Result};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

pub type EnvMap = BTreeMap<OsString, OsString>;

pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Locate `program` on `search_path`, the way a shell would with that `PATH`.
    pub fn resolve_command(program: &str, search_path: &OsStr, cwd: &Path) -> Result<PathBuf> {
        which::which_in(program, Some(search_path), cwd).map_err(|e| {
            debug!(program, error = %e, "lookup failed");
            LauncherError::CommandNotFound(program.to_string())
        })
    }

    /// Run a command in the foreground with full stdio passthrough and an
    /// explicit environment. Returns the child's exit code.
    pub async fn run_foreground(
        executable: &Path,
        args: &[String],
        env: &EnvMap,
        cwd: &Path,
    ) -> Result<i32> {
        let mut command = Command::new(executable);
        command
            .args(args)
            .env_clear()
            .envs(env)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Listen before spawning so a signal never finds the launcher unprepared.
        let signals = Signals::install()?;

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                LauncherError::CommandNotFound(executable.display().to_string())
            }
            _ => LauncherError::CommandFailed(format!(
                "Failed to execute {}: {}",
                executable.display(),
                e
            )),
        })?;

        debug!(pid = ?child.id(), "child started");

        let status = signals.wait_for(&mut child).await?;
        debug!(%status, "child exited");

        Ok(exit_code(status))
    }
}

/// Signals the launcher handles while a foreground child runs.
///
/// SIGINT comes from the terminal, which also delivers it to the child (same
/// process group), so the launcher only has to outlive it. SIGTERM is usually
/// aimed at the launcher alone and is forwarded to the child.
#[cfg(unix)]
struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn wait_for(mut self, child: &mut Child) -> Result<ExitStatus> {
        loop {
            let terminate = tokio::select! {
                status = child.wait() => return status.map_err(wait_failed),
                Some(()) = self.interrupt.recv() => false,
                Some(()) = self.terminate.recv() => true,
            };

            if terminate {
                debug!("termination requested, forwarding to child");
                forward_terminate(child);
            } else {
                debug!("interrupt received, waiting for child to exit");
            }
        }
    }
}

#[cfg(unix)]
fn forward_terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    // SAFETY: `pid` belongs to our own child, which has not been reaped yet.
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
        let err = std::io::Error::last_os_error();
        warn!(pid, error = %err, "cannot forward SIGTERM, killing child");
        if let Err(e) = child.start_kill() {
            warn!(pid, error = %e, "cannot kill child");
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn wait_for(self, child: &mut Child) -> Result<ExitStatus> {
        loop {
            let interrupted = tokio::select! {
                status = child.wait() => return status.map_err(wait_failed),
                interrupted = tokio::signal::ctrl_c() => interrupted,
            };

            if let Err(e) = interrupted {
                debug!(error = %e, "cannot listen for interrupts");
                return child.wait().await.map_err(wait_failed);
            }
            debug!("interrupt received, waiting for child to exit");
        }
    }
}

fn wait_failed(e: std::io::Error) -> LauncherError {
    LauncherError::CommandFailed(format!("Failed to wait for child: {}", e))
}

/// Shell-style exit code: the child's own code, or `128 + signal` when it was
/// killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
