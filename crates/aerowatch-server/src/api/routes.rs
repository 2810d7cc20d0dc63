//! REST API routes.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{geofences, ws};
use crate::state::AppState;
use aerowatch_core::{Command, Event, StatusSnapshot};

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/status", get(get_status))
        .route("/v1/commands", post(submit_command))
        .route("/v1/events", post(submit_event))
        .route(
            "/v1/geofence/boundaries",
            get(geofences::list_boundaries).post(geofences::add_boundary),
        )
        .route("/v1/geofence/boundaries/:name", delete(geofences::remove_boundary))
        .route("/v1/geofence/check", get(geofences::check_point))
        .route("/v1/stream", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Latest snapshot published by the control loop.
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, axum::response::Response> {
    state
        .latest_status()
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "No status published yet"))
}

/// Queue a ground-control command.
async fn submit_command(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> axum::response::Response {
    let command = match Command::from_value(payload.clone()) {
        Ok(command) => command,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid command: {}", err));
        }
    };

    if !state.submit_command(payload) {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Control loop is shutting down");
    }

    tracing::debug!("Queued {} command", command.name());
    (
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "command": command.name() })),
    )
        .into_response()
}

/// Queue a perception event.
async fn submit_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<Event>,
) -> axum::response::Response {
    if !(0.0..=1.0).contains(&event.confidence) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Confidence {} outside [0, 1]", event.confidence),
        );
    }

    let kind = event.kind.to_string();
    if !state.submit_event(event) {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Control loop is shutting down");
    }

    (StatusCode::ACCEPTED, Json(json!({ "queued": true, "type": kind }))).into_response()
}
