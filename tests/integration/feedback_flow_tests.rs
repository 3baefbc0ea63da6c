//! Integration tests for study completion and feedback submission.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};

use study_supervisor::persistence::scratch::SESSIONS_DIR;

use super::test_helpers::{call, script_config, send_json, test_router, IDLE};

fn feedback_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/submit_feedback")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.23, 10.0.0.1")
        .header("x-client-region", "eu-central")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn log_lines(dir: &tempfile::TempDir) -> Vec<Value> {
    std::fs::read_to_string(dir.path().join("user_feedback.json"))
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("one object per line"))
        .collect()
}

/// Completion then feedback produce a single record that also carries the
/// program's interaction artifact.
#[tokio::test]
async fn completion_and_feedback_merge_into_one_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let sessions = dir.path().join(SESSIONS_DIR);
    std::fs::create_dir_all(&sessions).expect("sessions dir");
    std::fs::write(
        sessions.join("p1.json"),
        "[{\"question\":1,\"choice\":2},{\"question\":2,\"choice\":0}]",
    )
    .expect("artifact");

    let (status, body) = send_json(
        &router,
        "POST",
        "/study_completion",
        &json!({
            "session_id": "p1",
            "startTime": "2024-05-01T10:00:00Z",
            "endTime": "2024-05-01T10:09:30Z",
            "questionsAnswered": 9,
            "completed": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "message": "Study completion recorded"}));

    let (status, body) = call(
        &router,
        feedback_request(&json!({
            "session_id": "p1",
            "rating1": 8,
            "rating2": "6",
            "timestamp": "2024-05-01T10:10:00Z",
            "studyData": {"finalChoice": 17},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Feedback recorded successfully");

    let lines = log_lines(&dir);
    assert_eq!(lines.len(), 1, "both calls land in one record: {lines:?}");
    let record = &lines[0];
    assert_eq!(record["session_id"], "p1");
    assert_eq!(record["start_time"], "2024-05-01T10:00:00Z");
    assert_eq!(record["questions_answered"], 9);
    assert_eq!(record["rating1"], 8);
    assert_eq!(record["rating2"], 6);
    assert_eq!(record["client_ip"], "198.51.100.23");
    assert_eq!(record["region"], "eu-central");
    assert_eq!(record["study_data"], json!({"finalChoice": 17}));
    assert_eq!(
        record["interaction"],
        json!([{"question": 1, "choice": 2}, {"question": 2, "choice": 0}])
    );
    assert!(record["submission_time"].as_str().is_some_and(|t| t.ends_with('Z')));
    assert!(!sessions.join("p1.json").exists(), "artifact is consumed");
}

/// An invalid rating is rejected and nothing is written.
#[tokio::test]
async fn invalid_rating_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    for bad in [json!(0), json!(11), json!("high"), json!(null)] {
        let (status, body) =
            call(&router, feedback_request(&json!({"session_id": "p1", "rating": bad}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "rating {bad} must be rejected");
        assert_eq!(body["success"], json!(false));
    }

    let (status, _) = call(&router, feedback_request(&json!({"session_id": "p1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!dir.path().join("user_feedback.json").exists());
}

/// Feedback without a prior completion is appended on its own.
#[tokio::test]
async fn feedback_without_completion_is_appended() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    for session in ["a", "b"] {
        let (status, _) =
            call(&router, feedback_request(&json!({"session_id": session, "rating": 5}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let lines = log_lines(&dir);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["session_id"], "a");
    assert_eq!(lines[1]["session_id"], "b");
    assert!(lines[0].get("interaction").is_none());
}

/// A legacy array log is migrated by the first write and keeps every record.
#[tokio::test]
async fn legacy_log_is_migrated_by_first_submission() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("user_feedback.json"),
        "[\n  {\"rating\": 9, \"timestamp\": \"old\", \"study_data\": {}, \"submission_time\": \"2023-01-01T00:00:00\"}\n]",
    )
    .expect("seed legacy log");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, _) =
        call(&router, feedback_request(&json!({"session_id": "new", "rating": 4}))).await;
    assert_eq!(status, StatusCode::OK);

    let lines = log_lines(&dir);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["timestamp"], "old");
    assert_eq!(lines[1]["session_id"], "new");
}

/// Completion for an unsafe session key still records, without touching
/// the filesystem outside the data directory.
#[tokio::test]
async fn completion_with_unusual_session_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (router, _state) = test_router(script_config(IDLE), dir.path());

    let (status, _) = send_json(
        &router,
        "POST",
        "/study_completion",
        &json!({"session_id": "../../escape", "questionsAnswered": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &router,
        feedback_request(&json!({"session_id": "../../escape", "rating": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let lines = log_lines(&dir);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["questions_answered"], 3);
    assert_eq!(lines[0]["rating"], 7);
}

/// A failed log write keeps the interaction artifact for a later retry.
#[tokio::test]
async fn failed_write_keeps_interaction_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("blocker"), "not a directory").expect("blocker file");
    let mut config = script_config(IDLE);
    config.feedback_file = "blocker/user_feedback.json".into();
    let (router, state) = test_router(config, dir.path());

    let sessions = dir.path().join(SESSIONS_DIR);
    std::fs::create_dir_all(&sessions).expect("sessions dir");
    let artifact = sessions.join("p1.json");
    std::fs::write(&artifact, "[{\"question\":1,\"choice\":3}]").expect("artifact");

    let (status, body) =
        call(&router, feedback_request(&json!({"session_id": "p1", "rating": 5}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));

    assert!(artifact.exists(), "artifact must survive a failed write");
    assert!(state.store.read_all().is_empty());
}
