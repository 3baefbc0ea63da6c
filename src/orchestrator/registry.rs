//! Session registry.
//!
//! Maps session keys to their runners. Creation is race-free: concurrent
//! first requests for one key observe the same runner. The map lock is a
//! plain mutex held only for lookups and inserts, never across an await;
//! all process work happens on the runner after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::runner::Runner;
use super::spawner::SpawnConfig;
use crate::models::{InputToken, RunnerStatus, SessionKey};
use crate::{AppError, Result};

/// Attempts before a start racing repeated stops gives up.
const MAX_START_ATTEMPTS: usize = 3;

/// Process-wide table of session runners.
#[derive(Debug)]
pub struct SessionRegistry {
    spawn: Arc<SpawnConfig>,
    runners: Mutex<HashMap<String, Arc<Runner>>>,
}

impl SessionRegistry {
    /// Empty registry whose runners launch programs with `spawn`.
    #[must_use]
    pub fn new(spawn: Arc<SpawnConfig>) -> Self {
        Self {
            spawn,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// The runner for `key`, created idle if absent.
    #[must_use]
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<Runner> {
        self.lookup_or_create(key).0
    }

    /// The runner for `key`, if one is registered.
    #[must_use]
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Runner>> {
        self.runners().get(key.as_str()).cloned()
    }

    /// Unregister and return the runner for `key`.
    #[must_use]
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Runner>> {
        self.runners().remove(key.as_str())
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runners().len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runners().is_empty()
    }

    /// Start (or restart) the program for `key`.
    ///
    /// If a concurrent stop retires the runner between lookup and start, the
    /// start is retried on a fresh runner. A runner created by this call is
    /// unregistered again when its launch fails, so failed starts do not
    /// accumulate idle entries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` when the program cannot be launched, or
    /// `AppError::SessionClosed` if every attempt lost a race with a stop.
    pub async fn start(&self, key: &SessionKey, dataset: &str) -> Result<String> {
        let mut last = None;
        for _ in 0..MAX_START_ATTEMPTS {
            let (runner, created) = self.lookup_or_create(key);
            match runner.start(dataset).await {
                Err(AppError::SessionClosed(reason)) => {
                    debug!(session_id = %key, reason, "runner retired during start, retrying");
                    last = Some(AppError::SessionClosed(reason));
                }
                Err(err) => {
                    if created {
                        self.discard_failed(key, &runner).await;
                    }
                    return Err(err);
                }
                ok => return ok,
            }
        }
        Err(last.unwrap_or_else(|| AppError::SessionClosed(format!("session {key} is closed"))))
    }

    /// Forward an input token to the session's program.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoActiveSession` if the session is unknown or not
    /// running, or `AppError::Io` if the write fails.
    pub async fn send_input(&self, key: &SessionKey, token: &InputToken) -> Result<()> {
        let runner = self.get(key).ok_or_else(|| {
            AppError::NoActiveSession(format!("no running program for session {key}"))
        })?;
        runner.send_input(token).await
    }

    /// Stop the session's program and unregister it.
    ///
    /// Returns `true` if the session was registered. Unknown keys are a no-op.
    pub async fn stop(&self, key: &SessionKey) -> bool {
        let Some(runner) = self.remove(key) else {
            return false;
        };
        runner.retire().await;
        info!(session_id = %key, "session stopped and removed");
        true
    }

    /// Status of the session; unknown keys report not running with no output.
    #[must_use]
    pub fn status(&self, key: &SessionKey) -> RunnerStatus {
        self.get(key)
            .map_or_else(RunnerStatus::default, |runner| runner.status())
    }

    /// Stop every registered program and empty the registry.
    ///
    /// Returns the number of sessions flushed.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<Arc<Runner>> = self.runners().drain().map(|(_, runner)| runner).collect();
        let count = drained.len();
        for runner in drained {
            runner.retire().await;
        }
        if count > 0 {
            info!(count, "stopped all session programs");
        }
        count
    }

    /// The runner for `key` and whether this call created it.
    fn lookup_or_create(&self, key: &SessionKey) -> (Arc<Runner>, bool) {
        let mut runners = self.runners();
        if let Some(runner) = runners.get(key.as_str()) {
            return (Arc::clone(runner), false);
        }
        debug!(session_id = %key, "creating session runner");
        let runner = Arc::new(Runner::new(key.as_str(), Arc::clone(&self.spawn)));
        runners.insert(key.as_str().to_owned(), Arc::clone(&runner));
        (runner, true)
    }

    /// Unregister `runner` after a failed first launch, unless it was replaced
    /// or another request got it running in the meantime.
    async fn discard_failed(&self, key: &SessionKey, runner: &Arc<Runner>) {
        let removed = {
            let mut runners = self.runners();
            let current = runners
                .get(key.as_str())
                .is_some_and(|entry| Arc::ptr_eq(entry, runner));
            current && !runner.state().is_running() && runners.remove(key.as_str()).is_some()
        };
        if removed {
            runner.retire().await;
            debug!(session_id = %key, "removed runner after failed launch");
        }
    }

    fn runners(&self) -> MutexGuard<'_, HashMap<String, Arc<Runner>>> {
        self.runners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
