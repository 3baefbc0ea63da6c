//! External program spawner.
//!
//! Launches the supervised program for one session with piped stdio and
//! `kill_on_drop(true)`, so a process whose last handle is released is
//! reclaimed. The dataset reference is appended as the only per-request
//! argument; session context travels as per-spawn environment on the
//! `Command` (`SESSION_ID`, `DATA_DIR`) and never touches the server's own
//! environment.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Environment variable carrying the session key into the child.
pub const SESSION_ID_ENV: &str = "SESSION_ID";

/// Environment variable carrying the resolved data directory into the child.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// An executable plus its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    /// Executable name or path.
    pub command: String,
    /// Arguments placed before the dataset reference.
    pub args: Vec<String>,
}

impl ProgramSpec {
    /// Program invocation from a command and its arguments.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Everything a runner needs to launch and drive its program.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Program tried first.
    pub primary: ProgramSpec,
    /// Program tried when the primary cannot be spawned.
    pub fallback: Option<ProgramSpec>,
    /// Working directory for the child; inherits the server's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Data directory handed to the child through `DATA_DIR`.
    pub data_dir: PathBuf,
    /// Pause between force-stopping a superseded process and respawning.
    pub restart_grace: Duration,
    /// Bound for a single stdin write.
    pub input_timeout: Duration,
}

impl SpawnConfig {
    /// Derive the spawn settings from global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, data_dir: &Path) -> Self {
        let program = &config.program;
        Self {
            primary: ProgramSpec::new(program.command.clone(), program.args.clone()),
            fallback: program
                .fallback_command
                .as_ref()
                .filter(|command| !command.trim().is_empty())
                .map(|command| ProgramSpec::new(command.clone(), program.fallback_args.clone())),
            working_dir: program.working_dir.clone(),
            data_dir: data_dir.to_path_buf(),
            restart_grace: program.restart_grace(),
            input_timeout: program.input_timeout(),
        }
    }
}

/// A freshly spawned program with its stdio captured.
#[derive(Debug)]
pub struct SpawnedProgram {
    /// Child handle; dropping the last owner kills the process.
    pub child: Child,
    /// Process input stream.
    pub stdin: ChildStdin,
    /// Process output stream.
    pub stdout: ChildStdout,
    /// Process diagnostic stream, relayed together with `stdout`.
    pub stderr: ChildStderr,
    /// Human-readable launch summary returned to the client.
    pub message: String,
}

/// Spawn the primary program, or the fallback if the primary cannot start.
///
/// # Errors
///
/// Returns `AppError::Spawn` carrying the diagnostics of every attempt when
/// no program could be started.
pub fn spawn_program(config: &SpawnConfig, session_id: &str, dataset: &str) -> Result<SpawnedProgram> {
    let primary_err = match spawn_one(&config.primary, config, session_id, dataset) {
        Ok(spawned) => {
            return Ok(SpawnedProgram {
                message: "Algorithm started successfully".into(),
                ..spawned
            })
        }
        Err(err) => err,
    };

    let Some(fallback) = config.fallback.as_ref() else {
        return Err(AppError::Spawn(format!(
            "failed to start {}: {primary_err}",
            config.primary.command
        )));
    };

    warn!(
        session_id,
        command = %config.primary.command,
        err = %primary_err,
        fallback = %fallback.command,
        "primary program failed to start, trying fallback"
    );

    match spawn_one(fallback, config, session_id, dataset) {
        Ok(spawned) => Ok(SpawnedProgram {
            message: format!("Fallback algorithm started (primary failed: {primary_err})"),
            ..spawned
        }),
        Err(fallback_err) => Err(AppError::Spawn(format!(
            "failed to start {}: {primary_err}; fallback {} also failed: {fallback_err}",
            config.primary.command, fallback.command
        ))),
    }
}

fn spawn_one(
    program: &ProgramSpec,
    config: &SpawnConfig,
    session_id: &str,
    dataset: &str,
) -> std::io::Result<SpawnedProgram> {
    let mut cmd = Command::new(&program.command);
    cmd.args(&program.args)
        .arg(dataset)
        .env(SESSION_ID_ENV, session_id)
        .env(DATA_DIR_ENV, &config.data_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = config.working_dir.as_ref() {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let missing = |stream: &str| std::io::Error::other(format!("failed to capture {stream}"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    info!(
        session_id,
        pid = child.id().unwrap_or(0),
        command = %program.command,
        dataset,
        "external program spawned"
    );

    Ok(SpawnedProgram {
        child,
        stdin,
        stdout,
        stderr,
        message: String::new(),
    })
}

/// Ask a process to terminate without waiting for it to exit.
///
/// Sends `SIGTERM` on Unix and the runtime's kill elsewhere. A child that
/// has already been reaped has no pid and is left alone.
///
/// # Errors
///
/// Returns the OS error if the signal could not be delivered.
pub fn request_termination(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(std::io::Error::other)?;
        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(std::io::Error::from)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        child.start_kill()
    }
}
