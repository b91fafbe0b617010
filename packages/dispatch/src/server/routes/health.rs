use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::time::Duration;

use crate::kernel::ServerDeps;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: StoreHealth,
}

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint
///
/// Pings the store with a 5s budget. Returns 200 OK when it answers,
/// 503 Service Unavailable otherwise.
pub async fn health_handler(State(deps): State<ServerDeps>) -> (StatusCode, Json<HealthResponse>) {
    let store = match tokio::time::timeout(Duration::from_secs(5), deps.store.ping()).await {
        Ok(Ok(())) => StoreHealth {
            status: "ok",
            error: None,
        },
        Ok(Err(e)) => StoreHealth {
            status: "error",
            error: Some(format!("Ping failed: {}", e)),
        },
        Err(_) => StoreHealth {
            status: "error",
            error: Some("Ping timeout (>5s)".to_string()),
        },
    };

    let (status_code, status) = if store.error.is_none() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (status_code, Json(HealthResponse { status, store }))
}
