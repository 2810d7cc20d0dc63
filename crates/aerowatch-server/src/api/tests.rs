use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

use crate::config::Config;
use crate::link::SimulatedLink;
use crate::loops::control_loop::ControlCoordinator;
use crate::state::{AppState, SharedGeofence};
use crate::vehicle::{VehicleController, VehicleHandle};
use crate::api;
use aerowatch_core::GeofenceEngine;

fn setup_app() -> (axum::Router, Arc<AppState>, ControlCoordinator) {
    let config = Config::default();
    let geofence = SharedGeofence::new(GeofenceEngine::new(&config.geofence).unwrap());
    let link = Box::new(SimulatedLink::new(config.simulation.clone()));
    let controller = VehicleController::new(link, geofence.clone(), config.vehicle.clone());
    let (downlink, _) = broadcast::channel(16);
    let vehicle = VehicleHandle::new(controller, config.safety.clone(), downlink);
    let (coordinator, inputs) = ControlCoordinator::new(vehicle.clone(), config.emergency.clone());
    let state = Arc::new(AppState::new(vehicle, geofence, inputs));

    let app = api::routes().with_state(state.clone());
    (app, state, coordinator)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_check() {
    let (app, _state, _coordinator) = setup_app();
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_available_after_first_tick() {
    let (app, _state, mut coordinator) = setup_app();

    let res = app.clone().oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    coordinator.tick().await;

    let res = app.oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["waypoint_index"], 0);
}

#[tokio::test]
async fn commands_are_validated_before_queueing() {
    let (app, _state, _coordinator) = setup_app();

    let res = app
        .clone()
        .oneshot(post_json("/v1/commands", json!({ "type": "takeoff", "altitude": 12.0 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(read_json(res).await["command"], "takeoff");

    let res = app
        .oneshot(post_json("/v1/commands", json!({ "type": "barrel_roll" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn commands_rejected_after_intake_closed() {
    let (app, _state, coordinator) = setup_app();
    drop(coordinator);

    let res = app
        .oneshot(post_json("/v1/commands", json!({ "type": "land" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn events_require_valid_confidence() {
    let (app, _state, _coordinator) = setup_app();
    let location = json!({ "latitude": 37.7749, "longitude": -122.4194 });

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/events",
            json!({ "type": "fire", "confidence": 0.9, "location": location }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = app
        .oneshot(post_json(
            "/v1/events",
            json!({ "type": "fire", "confidence": 1.5, "location": location }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn boundary_lifecycle() {
    let (app, state, _coordinator) = setup_app();

    let res = app.clone().oneshot(get("/v1/geofence/boundaries")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let dock = json!({
        "type": "circle",
        "name": "Dock",
        "center": { "latitude": 37.7800, "longitude": -122.4100 },
        "radius_m": 20.0
    });
    let res = app
        .clone()
        .oneshot(post_json("/v1/geofence/boundaries", dock.clone()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(read_json(res).await["name"], "Dock");
    assert_eq!(state.geofence().read().boundary_count(), 3);

    let res = app
        .clone()
        .oneshot(post_json("/v1/geofence/boundaries", dock))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let degenerate = json!({
        "type": "polygon",
        "name": "Sliver",
        "coordinates": [
            { "latitude": 37.7800, "longitude": -122.4100 },
            { "latitude": 37.7801, "longitude": -122.4100 }
        ]
    });
    let res = app
        .clone()
        .oneshot(post_json("/v1/geofence/boundaries", degenerate))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/v1/geofence/boundaries/Dock")
            .body(Body::empty())
            .unwrap()
    };
    let res = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = app.oneshot(delete()).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn check_point_reports_containment() {
    let (app, _state, _coordinator) = setup_app();

    let res = app
        .clone()
        .oneshot(get("/v1/geofence/check?lat=37.7749&lon=-122.4194&altitude_m=10"))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["inside"], true);
    assert_eq!(body["breach_distance_m"], 0.0);
    assert!(body["boundaries"]
        .as_array()
        .unwrap()
        .iter()
        .any(|name| name == "Main Area"));
    assert!(body.get("nearest_safe_point").is_none());

    let res = app
        .oneshot(get("/v1/geofence/check?lat=37.7800&lon=-122.4194"))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["inside"], false);
    assert!(body["breach_distance_m"].as_f64().unwrap() > 400.0);
    assert!(body["nearest_safe_point"]["latitude"].as_f64().unwrap() < 37.7800);
}
