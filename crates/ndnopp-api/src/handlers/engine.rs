//! /engine/* handlers — forwarding engine tables and route management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use ndnopp_core::{FaceDescriptor, FaceId};
use ndnopp_services::{EngineTable, Route};

use super::{daemon_error, ApiState};

// ── /engine/faces ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FaceTableResponse {
    pub faces: Vec<FaceDescriptor>,
}

pub async fn handle_face_table(State(state): State<ApiState>) -> Json<FaceTableResponse> {
    Json(FaceTableResponse {
        faces: state.daemon.face_table(),
    })
}

// ── /engine/{table} ───────────────────────────────────────────────────────────

pub async fn handle_engine_table(
    State(state): State<ApiState>,
    Path(table): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let table: EngineTable = table.parse().map_err(|e| (StatusCode::NOT_FOUND, e))?;
    let snapshot = state.daemon.engine_snapshot(table).map_err(daemon_error)?;
    Ok(Json(snapshot))
}

// ── /engine/routes ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RouteRequest {
    pub prefix: String,
    pub face_id: u64,
    #[serde(default)]
    pub origin: u64,
    #[serde(default)]
    pub cost: u64,
    #[serde(default)]
    pub flags: u64,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub prefix: String,
    pub face_id: u64,
}

pub async fn handle_route_add(
    State(state): State<ApiState>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, String)> {
    if !req.prefix.starts_with('/') {
        return Err((StatusCode::BAD_REQUEST, "prefix must start with '/'".to_string()));
    }
    let route = Route {
        prefix: req.prefix.clone(),
        face_id: FaceId(req.face_id),
        origin: req.origin,
        cost: req.cost,
        flags: req.flags,
    };
    state.daemon.add_route(&route).map_err(daemon_error)?;
    tracing::info!(prefix = %req.prefix, face_id = req.face_id, "route added via API");
    Ok(Json(RouteResponse {
        prefix: req.prefix,
        face_id: req.face_id,
    }))
}

pub async fn handle_route_remove(
    State(state): State<ApiState>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, String)> {
    state
        .daemon
        .remove_route(&req.prefix, FaceId(req.face_id), req.origin)
        .map_err(daemon_error)?;
    tracing::info!(prefix = %req.prefix, face_id = req.face_id, "route removed via API");
    Ok(Json(RouteResponse {
        prefix: req.prefix,
        face_id: req.face_id,
    }))
}
