use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;
use uuid::Uuid;

use triad_coordinator::Coordinator;
use triad_core::{IntakeRequest, ServerConfig, TriadError, TriadResult};
use triad_status::StatusBroadcaster;

use crate::ws;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The engine coordinator behind the intake and lookup routes.
    pub coordinator: Arc<Coordinator>,
    /// The broadcaster behind the status stream.
    pub broadcaster: Arc<StatusBroadcaster>,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/{id}", get(get_task))
        .route("/health", get(health))
        .route("/ws/status", get(ws::status_stream))
        .with_state(state)
}

/// Bind and serve the gateway until the process exits.
pub async fn serve(config: &ServerConfig, state: AppState) -> TriadResult<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| TriadError::Gateway(format!("Failed to bind {}: {e}", config.bind)))?;
    info!(addr = %config.bind, "Gateway listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| TriadError::Gateway(format!("Server error: {e}")))
}

async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<IntakeRequest>,
) -> Response {
    match state.coordinator.intake(request) {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "task_id": task_id })),
        )
            .into_response(),
        Err(TriadError::Validation(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": msg })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.coordinator.get_task(id) {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown task {id}") })),
        )
            .into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "tasks": state.coordinator.list_tasks().len(),
            "subscribers": state.broadcaster.subscriber_count(),
        })),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use triad_core::{CoordinatorConfig, StatusConfig};

    fn test_state() -> AppState {
        let broadcaster = StatusBroadcaster::new(&StatusConfig::default());
        let coordinator =
            Coordinator::new(CoordinatorConfig::default(), vec![], broadcaster.clone());
        AppState {
            coordinator,
            broadcaster,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_submit_accepts_valid_task() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"payload": "do the thing"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert!(json["task_id"].is_string());
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_payload() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"payload": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("payload"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::get(format!("/tasks/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submitted_task_is_queryable() {
        let state = test_state();
        let app = router(state.clone());
        let response = app
            .clone()
            .oneshot(
                Request::post("/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"payload": "query me", "strategy": "fast_path"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let task_id = json["task_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::get(format!("/tasks/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["payload"], "query me");
        assert_eq!(json["strategy"], "fast_path");
    }
}
