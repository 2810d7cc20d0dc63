//! Geofence API endpoints.
//!
//! Boundaries can be added and removed at runtime; they are never edited in place.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;
use aerowatch_core::{BoundaryConfig, BoundaryInfo, GeofenceError, Position};

/// List all boundaries in insertion order.
pub async fn list_boundaries(State(state): State<Arc<AppState>>) -> Json<Vec<BoundaryInfo>> {
    Json(state.geofence().read().list_boundaries())
}

/// Add a boundary.
pub async fn add_boundary(
    State(state): State<Arc<AppState>>,
    Json(config): Json<BoundaryConfig>,
) -> axum::response::Response {
    let result = state.geofence().write().add_boundary(&config);
    match result {
        Ok(info) => {
            tracing::info!("Added {:?} boundary '{}'", info.kind, info.name);
            (StatusCode::CREATED, Json(info)).into_response()
        }
        Err(err) => {
            let status = match err {
                GeofenceError::DuplicateBoundary(_) => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

/// Remove a boundary by name.
pub async fn remove_boundary(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> StatusCode {
    if state.geofence().write().remove_boundary(&name) {
        tracing::info!("Removed boundary '{}'", name);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub struct PointCheckQuery {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PointCheckResponse {
    pub inside: bool,
    pub boundaries: Vec<String>,
    pub breach_distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_safe_point: Option<Position>,
}

/// Check a point against the geofence.
pub async fn check_point(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PointCheckQuery>,
) -> Json<PointCheckResponse> {
    let mut pos = Position::new(query.lat, query.lon);
    if let Some(altitude) = query.altitude_m {
        pos = pos.with_altitude(altitude);
    }

    let geofence = state.geofence().read();
    let inside = geofence.is_inside(&pos);
    Json(PointCheckResponse {
        inside,
        boundaries: geofence
            .containing_boundaries(&pos)
            .into_iter()
            .map(str::to_string)
            .collect(),
        breach_distance_m: geofence.breach_distance(&pos),
        nearest_safe_point: (!inside).then(|| geofence.nearest_safe_point(&pos)),
    })
}
