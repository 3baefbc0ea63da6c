//! Integration tests for the session endpoints, driven through the router
//! without a socket.

use axum::http::StatusCode;
use serde_json::json;

use study_supervisor::models::SessionKey;

use super::test_helpers::{
    get, has_line, script_config, send_json, test_router, wait_for_status, IDLE, INTERACTIVE,
};

fn key(raw: &str) -> SessionKey {
    SessionKey::parse(raw).expect("session key")
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[tokio::test]
async fn unknown_session_status_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = get(&router, "/get_status?session_id=nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"running": false, "output": []}));
}

#[tokio::test]
async fn status_without_session_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = get(&router, "/get_status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

/// Non-integer input is rejected before the registry is consulted, so an
/// unknown session still gets 400 rather than 404.
#[tokio::test]
async fn non_integer_input_is_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = send_json(
        &router,
        "POST",
        "/send_input",
        &json!({"session_id": "ghost", "input": "three"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap_or_default().contains("integer"));
}

#[tokio::test]
async fn input_without_runner_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = send_json(
        &router,
        "POST",
        "/send_input",
        &json!({"session_id": "ghost", "input": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, body) = send_json(&router, "POST", "/start_algorithm", &json!({"dataset": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send_json(&router, "POST", "/start_algorithm", &json!({"session_id": " "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Stopping a session that never started still succeeds.
#[tokio::test]
async fn stop_is_idempotent_over_http() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    for _ in 0..2 {
        let (status, body) =
            send_json(&router, "POST", "/stop_algorithm", &json!({"session_id": "s1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "message": "Algorithm stopped"}));
    }
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = script_config(IDLE);
    config.program.command = "/nonexistent/study-algo".into();
    let (router, state) = test_router(config, dir.path());

    let (status, body) =
        send_json(&router, "POST", "/start_algorithm", &json!({"session_id": "s1"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("/nonexistent/study-algo"));
    assert!(!state.registry.status(&key("s1")).running);
    assert!(state.registry.is_empty(), "failed launch leaves no runner behind");
}

/// Full session over HTTP: start, read, answer, stop.
#[cfg(unix)]
#[tokio::test]
async fn session_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = script_config(INTERACTIVE);
    config.program.datasets = vec!["datasets/house.txt".into()];
    let (router, state) = test_router(config, dir.path());

    let (status, body) = send_json(
        &router,
        "POST",
        "/start_algorithm",
        &json!({"session_id": "p1", "dataset": "datasets/house.txt"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let runner = state.registry.get(&key("p1")).expect("registered");
    wait_for_status(&runner, |s| s.output.len() == 2).await;

    let (status, body) = get(&router, "/get_status?session_id=p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], json!(true));
    assert_eq!(body["output"][0], "Question 1 from datasets/house.txt");

    let (status, body) = send_json(
        &router,
        "POST",
        "/send_input",
        &json!({"session_id": "p1", "input": "4"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "message": "Input sent"}));
    wait_for_status(&runner, |s| has_line(s, "got 4")).await;

    let (status, _) =
        send_json(&router, "POST", "/stop_algorithm", &json!({"session_id": "p1"})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&router, "/get_status?session_id=p1").await;
    assert_eq!(body, json!({"running": false, "output": []}));
}

/// A dataset outside the allow-list falls back to the default.
#[cfg(unix)]
#[tokio::test]
async fn disallowed_dataset_uses_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, state) = test_router(script_config(INTERACTIVE), dir.path());

    let (status, _) = send_json(
        &router,
        "POST",
        "/start_algorithm",
        &json!({"session_id": "p2", "dataset": "/etc/shadow"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let runner = state.registry.get(&key("p2")).expect("registered");
    let status = wait_for_status(&runner, |s| !s.output.is_empty()).await;
    assert_eq!(status.output[0], "Question 1 from datasets/car.txt");

    state.registry.stop(&key("p2")).await;
}
