use axum::http::StatusCode;
use axum::response::IntoResponse;

use study_supervisor::AppError;

#[test]
fn display_carries_category_prefix() {
    assert_eq!(AppError::Spawn("boom".into()).to_string(), "spawn: boom");
    assert_eq!(
        AppError::NoActiveSession("s1".into()).to_string(),
        "no active session: s1"
    );
    assert_eq!(AppError::Validation("bad".into()).to_string(), "validation: bad");
    assert_eq!(AppError::Io("disk".into()).to_string(), "io: disk");
}

#[test]
fn io_error_converts() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn status_codes_follow_error_category() {
    assert_eq!(AppError::Validation(String::new()).status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::NoActiveSession(String::new()).status_code(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::SessionClosed(String::new()).status_code(), StatusCode::CONFLICT);
    assert_eq!(
        AppError::Spawn(String::new()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        AppError::Store(String::new()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

/// Error responses always carry `{success: false, error}`.
#[tokio::test]
async fn error_response_body_shape() {
    let response = AppError::Validation("input must be an integer".into()).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body["success"], serde_json::json!(false));
    assert_eq!(body["error"], "validation: input must be an integer");
}
