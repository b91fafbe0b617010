use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::common::{DispatchResult, GeoPoint, HelperId};
use crate::domains::helpers::{Helper, HelperFilter, HelperStatus, NewHelper, ServiceType};
use crate::kernel::ServerDeps;

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: HelperStatus,
}

#[derive(Debug, Deserialize)]
pub struct SkillsBody {
    pub skills: BTreeSet<ServiceType>,
}

/// `GET /api/helpers?status=&skill=`
pub async fn list_helpers(
    State(deps): State<ServerDeps>,
    Query(filter): Query<HelperFilter>,
) -> DispatchResult<Json<Vec<Helper>>> {
    Ok(Json(deps.registry.list(&filter).await?))
}

/// `POST /api/helpers`
pub async fn register_helper(
    State(deps): State<ServerDeps>,
    Json(input): Json<NewHelper>,
) -> DispatchResult<(StatusCode, Json<Helper>)> {
    let helper = deps.registry.register(input).await?;
    Ok((StatusCode::CREATED, Json(helper)))
}

/// `GET /api/helpers/{id}`
pub async fn get_helper(
    State(deps): State<ServerDeps>,
    Path(id): Path<HelperId>,
) -> DispatchResult<Json<Helper>> {
    Ok(Json(deps.registry.get(id).await?))
}

/// `PUT /api/helpers/{id}/status`
pub async fn set_status(
    State(deps): State<ServerDeps>,
    Path(id): Path<HelperId>,
    Json(body): Json<StatusBody>,
) -> DispatchResult<Json<Helper>> {
    Ok(Json(deps.registry.set_status(id, body.status).await?))
}

/// `PUT /api/helpers/{id}/location`
pub async fn set_location(
    State(deps): State<ServerDeps>,
    Path(id): Path<HelperId>,
    Json(location): Json<GeoPoint>,
) -> DispatchResult<Json<Helper>> {
    Ok(Json(deps.registry.set_location(id, location).await?))
}

/// `PUT /api/helpers/{id}/skills`
pub async fn set_skills(
    State(deps): State<ServerDeps>,
    Path(id): Path<HelperId>,
    Json(body): Json<SkillsBody>,
) -> DispatchResult<Json<Helper>> {
    Ok(Json(deps.registry.set_skills(id, body.skills).await?))
}
