use axum::extract::State;
use axum::Json;

use crate::common::DispatchResult;
use crate::domains::dispatch::DispatchStats;
use crate::domains::helpers::{catalog, ServiceTypeInfo};
use crate::kernel::ServerDeps;

/// `GET /api/stats`
pub async fn stats_handler(State(deps): State<ServerDeps>) -> DispatchResult<Json<DispatchStats>> {
    Ok(Json(deps.dispatcher.stats().await?))
}

/// `GET /api/service-types`
pub async fn service_types_handler() -> Json<Vec<ServiceTypeInfo>> {
    Json(catalog())
}
