//! Output drain worker.
//!
//! One worker per running program. It relays every line from the
//! program's stdout and stderr, in arrival order, into the owning runner's
//! event channel. When both streams close it confirms process exit and
//! reports it, then returns and releases its child handle.
//!
//! The worker stops early when its cancellation token fires (the runner
//! stopped or replaced the process) or when the receiving side of the
//! channel is gone (the runner started a new process with a fresh channel).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::RelayCodec;

/// How often exit is polled once the output streams have closed.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Child handle shared between a runner and its drain worker.
pub type SharedChild = Arc<Mutex<Child>>;

/// Events a drain worker reports to its runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEvent {
    /// One output line, trailing whitespace removed.
    Line(String),
    /// The process exited; `code` is `None` when it was killed by a signal.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
    },
}

/// Spawn the drain worker for a freshly started program.
#[must_use]
pub fn spawn_drain_worker(
    session_id: String,
    child: SharedChild,
    stdout: ChildStdout,
    stderr: ChildStderr,
    events: mpsc::UnboundedSender<DrainEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stdout = FramedRead::new(stdout, RelayCodec::new());
        let stderr = FramedRead::new(stderr, RelayCodec::new());
        let mut lines = stream::select(stdout, stderr);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(session_id, "drain worker: cancelled");
                    return;
                }

                item = lines.next() => match item {
                    Some(Ok(line)) => {
                        if events.send(DrainEvent::Line(line)).is_err() {
                            debug!(session_id, "drain worker: runner moved on, stopping");
                            return;
                        }
                    }
                    // A failed stream ends on its own; the other keeps relaying.
                    Some(Err(err)) => {
                        warn!(session_id, %err, "drain worker: output stream error");
                    }
                    None => break,
                }
            }
        }

        let code = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(session_id, "drain worker: cancelled while awaiting exit");
                return;
            }
            code = wait_for_exit(&session_id, &child) => code,
        };

        info!(session_id, exit_code = ?code, "external program exited");
        if events.send(DrainEvent::Exited { code }).is_err() {
            debug!(session_id, "drain worker: runner gone before exit was reported");
        }
    })
}

/// Poll for exit without holding the child lock across an await, so the
/// runner can still signal the process while the worker waits.
async fn wait_for_exit(session_id: &str, child: &SharedChild) -> Option<i32> {
    loop {
        let polled = child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait();
        match polled {
            Ok(Some(status)) => return status.code(),
            Ok(None) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Err(err) => {
                warn!(session_id, %err, "drain worker: failed to poll process exit");
                return None;
            }
        }
    }
}
