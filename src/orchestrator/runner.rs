//! Per-session process supervisor.
//!
//! A [`Runner`] owns at most one live external program. Lifecycle operations
//! (`start`, `stop`, `send_input`, `retire`) serialise on an async control
//! lock, so a restart fully replaces the old process before anything else
//! touches the runner. Output lines and exit notices arrive from the drain
//! worker over an unbounded channel and are folded into the buffer whenever
//! the runner is observed; [`Runner::status`] never waits on the control
//! lock and always returns a consistent copy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};

use super::drain::{spawn_drain_worker, DrainEvent, SharedChild};
use super::spawner::{request_termination, spawn_program, SpawnConfig};
use crate::models::{InputToken, RunnerState, RunnerStatus};
use crate::{AppError, Result};

/// Supervisor for one session's external program.
#[derive(Debug)]
pub struct Runner {
    session_id: String,
    spawn: Arc<SpawnConfig>,
    control: tokio::sync::Mutex<Control>,
    shared: Mutex<Shared>,
}

/// State touched only under the async control lock.
#[derive(Debug, Default)]
struct Control {
    /// Set once the runner has left the registry; further starts are refused.
    retired: bool,
    process: Option<ActiveProcess>,
}

/// Handles to a live program. Dropping this cancels the drain worker and
/// releases the last runner-side references to the process.
#[derive(Debug)]
struct ActiveProcess {
    child: SharedChild,
    stdin: ChildStdin,
    _drain: DropGuard,
}

/// State read by status queries.
#[derive(Debug)]
struct Shared {
    state: RunnerState,
    lines: Vec<String>,
    events: Option<mpsc::UnboundedReceiver<DrainEvent>>,
}

impl Runner {
    /// Create an idle runner for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>, spawn: Arc<SpawnConfig>) -> Self {
        Self {
            session_id: session_id.into(),
            spawn,
            control: tokio::sync::Mutex::new(Control::default()),
            shared: Mutex::new(Shared {
                state: RunnerState::Idle,
                lines: Vec::new(),
                events: None,
            }),
        }
    }

    /// Session this runner belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Launch the external program for `dataset`.
    ///
    /// A live process is stopped first and given the configured grace period
    /// before the new one is spawned. On success the output buffer is cleared
    /// and the launch message is returned.
    ///
    /// # Errors
    ///
    /// - `AppError::SessionClosed` if the runner was retired.
    /// - `AppError::Spawn` if neither the primary nor the fallback program
    ///   could be started; the runner is left idle.
    pub async fn start(&self, dataset: &str) -> Result<String> {
        let span = info_span!("runner_start", session_id = %self.session_id, dataset);
        async move {
            let mut control = self.control.lock().await;
            if control.retired {
                return Err(AppError::SessionClosed(format!(
                    "session {} is shutting down",
                    self.session_id
                )));
            }

            if self.stop_locked(&mut control) {
                info!("superseded running process, waiting before respawn");
                tokio::time::sleep(self.spawn.restart_grace).await;
            }

            self.transition(RunnerState::Launching);
            let spawned = match spawn_program(&self.spawn, &self.session_id, dataset) {
                Ok(spawned) => spawned,
                Err(err) => {
                    self.transition(RunnerState::Idle);
                    warn!(%err, "failed to launch external program");
                    return Err(err);
                }
            };

            let (tx, rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let child: SharedChild = Arc::new(Mutex::new(spawned.child));
            // Detached: the worker ends on cancellation, channel close, or exit.
            drop(spawn_drain_worker(
                self.session_id.clone(),
                Arc::clone(&child),
                spawned.stdout,
                spawned.stderr,
                tx,
                cancel.clone(),
            ));

            {
                let mut shared = self.shared();
                shared.lines.clear();
                shared.events = Some(rx);
            }
            self.transition(RunnerState::Active);

            control.process = Some(ActiveProcess {
                child,
                stdin: spawned.stdin,
                _drain: cancel.drop_guard(),
            });
            info!("external program active");
            Ok(spawned.message)
        }
        .instrument(span)
        .await
    }

    /// Write `token` followed by a newline to the program's stdin.
    ///
    /// # Errors
    ///
    /// - `AppError::NoActiveSession` if no process is running.
    /// - `AppError::Io` if the write fails or exceeds the input timeout.
    pub async fn send_input(&self, token: &InputToken) -> Result<()> {
        let mut control = self.control.lock().await;
        let no_session =
            || AppError::NoActiveSession(format!("no running program for session {}", self.session_id));

        if !self.state().is_running() {
            return Err(no_session());
        }
        let process = control.process.as_mut().ok_or_else(no_session)?;

        let mut payload = token.as_str().to_owned();
        payload.push('\n');
        let write = async {
            process.stdin.write_all(payload.as_bytes()).await?;
            process.stdin.flush().await
        };

        match tokio::time::timeout(self.spawn.input_timeout, write).await {
            Ok(Ok(())) => {
                debug!(session_id = %self.session_id, input = token.as_str(), "forwarded input");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(session_id = %self.session_id, %err, "failed to write program input");
                Err(AppError::Io(format!("failed to write program input: {err}")))
            }
            Err(_) => {
                warn!(session_id = %self.session_id, "program input write timed out");
                Err(AppError::Io("timed out writing program input".into()))
            }
        }
    }

    /// Stop the program if one is running. Idempotent.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        if self.stop_locked(&mut control) {
            info!(session_id = %self.session_id, "external program stopped");
        }
    }

    /// Stop the program and refuse any later start.
    pub async fn retire(&self) {
        let mut control = self.control.lock().await;
        control.retired = true;
        self.stop_locked(&mut control);
    }

    /// Liveness plus a copy of every buffered output line.
    #[must_use]
    pub fn status(&self) -> RunnerStatus {
        let mut shared = self.shared();
        absorb(&mut shared);
        RunnerStatus {
            running: shared.state.is_running(),
            output: shared.lines.clone(),
        }
    }

    /// Current lifecycle state, after folding in pending worker events.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        let mut shared = self.shared();
        absorb(&mut shared);
        shared.state
    }

    /// Signal and release the current process. Returns `true` if a live
    /// process was signalled.
    fn stop_locked(&self, control: &mut Control) -> bool {
        let Some(process) = control.process.take() else {
            return false;
        };

        let live = self.state().is_running();
        if live {
            self.transition(RunnerState::Terminating);
            terminate(&self.session_id, &process.child);
        }
        drop(process);

        let mut shared = self.shared();
        absorb(&mut shared);
        shared.events = None;
        if live {
            shared.state = RunnerState::Terminated;
        }
        live
    }

    fn transition(&self, next: RunnerState) {
        let mut shared = self.shared();
        if !shared.state.can_transition_to(next) {
            debug!(
                session_id = %self.session_id,
                from = ?shared.state,
                to = ?next,
                "unexpected runner transition"
            );
        }
        shared.state = next;
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ask the process to exit, escalating to a kill if the signal fails.
fn terminate(session_id: &str, child: &SharedChild) {
    let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(err) = request_termination(&mut child) {
        warn!(session_id, %err, "failed to signal program, killing");
        if let Err(err) = child.start_kill() {
            warn!(session_id, %err, "failed to kill program");
        }
    }
}

/// Fold queued worker events into the buffer without blocking.
fn absorb(shared: &mut Shared) {
    let Some(events) = shared.events.as_mut() else {
        return;
    };

    let mut finished = false;
    loop {
        match events.try_recv() {
            Ok(DrainEvent::Line(line)) => shared.lines.push(line),
            Ok(DrainEvent::Exited { .. }) | Err(TryRecvError::Disconnected) => {
                finished = true;
                break;
            }
            Err(TryRecvError::Empty) => break,
        }
    }

    if finished {
        shared.events = None;
        if shared.state == RunnerState::Active {
            shared.state = RunnerState::Terminated;
        }
    }
}
