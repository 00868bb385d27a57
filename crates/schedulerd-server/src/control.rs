//! Immediate-Run Control Plane: a small Axum router exposing `/health`
//! and `/run_immediate`, run as a sibling task to the Poll Loop — the
//! same "axum server as its own tokio task" shape the teacher uses for
//! its own HTTP surface, scaled down to two routes.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use schedulerd_core::error::Error as CoreError;
use schedulerd_engine::ImmediateQueue;
use serde::Serialize;
use serde_json::json;

#[derive(Clone)]
pub struct ControlState {
    pub queue: ImmediateQueue,
    pub token: String,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

/// Axum response wrapper around `schedulerd_core::Error`, the way the
/// teacher's own `HttpError: From<CoreError>` bridges a shared error type
/// into its HTTP surface — `status_code()` supplies the response code,
/// `Display` supplies the body.
struct HttpError(CoreError);

impl From<CoreError> for HttpError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiError { error: self.0.to_string() })).into_response()
    }
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run_immediate", get(run_immediate))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn run_immediate(
    State(state): State<ControlState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, HttpError> {
    if !state.token.is_empty() {
        let query_token = params.get("token").map(String::as_str);
        let header_token = headers
            .get("X-Token")
            .and_then(|v| v.to_str().ok());
        let matches = query_token == Some(state.token.as_str())
            || header_token == Some(state.token.as_str());
        if !matches {
            return Err(CoreError::control_forbidden("invalid or missing token").into());
        }
    }

    let job_id: i64 = params
        .get("job_id")
        .ok_or_else(|| CoreError::control_bad_request("missing job_id"))?
        .parse()
        .map_err(|_| CoreError::control_bad_request("job_id must be an integer"))?;

    state.queue.enqueue(job_id).await;
    Ok(Json(json!({ "accepted": true, "job_id": job_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(token: &str) -> ControlState {
        ControlState {
            queue: ImmediateQueue::new(),
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn health_returns_ok_true() {
        let app = router(state(""));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_immediate_without_token_configured_accepts_any_request() {
        let app = router(state(""));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/run_immediate?job_id=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_job_id_is_400() {
        let app = router(state(""));
        let response = app
            .oneshot(Request::builder().uri("/run_immediate").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_integer_job_id_is_400() {
        let app = router(state(""));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/run_immediate?job_id=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mismatched_token_is_403() {
        let app = router(state("secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/run_immediate?job_id=1&token=wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn matching_query_token_is_accepted() {
        let app = router(state("secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/run_immediate?job_id=1&token=secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn matching_header_token_is_accepted() {
        let app = router(state("secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/run_immediate?job_id=1")
                    .header("X-Token", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
