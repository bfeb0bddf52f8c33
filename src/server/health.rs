//! Health check endpoint for liveness probes.
//!
//! Always returns 200 while the server is running. The body also says which
//! remote instance and project the process targets, and which endpoint it
//! settled on once the first event has established one.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};

use super::AppState;

/// Health check handler.
///
/// # Example
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"status":"healthy","timestamp":"2024-03-01T12:00:00+00:00",
///  "codebeamer_url":"https://cb.example.com/","project_id":68,
///  "endpoint":{"base_url":"https://cb.example.com/rest/v3","auth_mode":"token"}}
/// ```
pub async fn health_handler(State(app_state): State<AppState>) -> (StatusCode, Json<Value>) {
    let config = app_state.config();
    let endpoint = app_state
        .established()
        .map(|remote| json!(remote.context().profile));

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "codebeamer_url": config.remote_url.as_str(),
            "project_id": config.project_id.0,
            "endpoint": endpoint,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;

    #[tokio::test]
    async fn health_returns_200_with_target() {
        let state = AppState::new(test_config("https://cb.example.com")).unwrap();

        let (status, Json(body)) = health_handler(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["codebeamer_url"], "https://cb.example.com/");
        assert!(body["endpoint"].is_null());
    }
}
