//! Integration tests for the shutdown flush of the session registry.
#![cfg(unix)]

use std::sync::Arc;

use study_supervisor::models::{RunnerState, SessionKey};
use study_supervisor::orchestrator::SessionRegistry;

use super::test_helpers::{has_line, script_spawn, wait_for_status, IDLE};

#[tokio::test]
async fn stop_all_terminates_every_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = SessionRegistry::new(script_spawn(IDLE, dir.path()));

    let mut runners = Vec::new();
    for name in ["a", "b", "c"] {
        let key = SessionKey::parse(name).expect("key");
        registry.start(&key, "d").await.expect("start");
        let runner = registry.get(&key).expect("registered");
        wait_for_status(&runner, |s| has_line(s, "started")).await;
        runners.push(runner);
    }

    assert_eq!(registry.stop_all().await, 3);
    assert!(registry.is_empty());
    for runner in &runners {
        assert_eq!(runner.state(), RunnerState::Terminated);
        assert!(!runner.status().running);
    }
}

#[tokio::test]
async fn stop_all_on_empty_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(SessionRegistry::new(script_spawn(IDLE, dir.path())));

    assert_eq!(registry.stop_all().await, 0);
}
