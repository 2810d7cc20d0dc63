mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use aerowatch_core::{
    Downlink, Event, EventKind, FlightMode, MissionDefinition, Position, VehicleState,
};
use aerowatch_server::backoff::Backoff;
use aerowatch_server::config::Config;
use aerowatch_server::error::{ControlError, LinkError};
use aerowatch_server::loops::control_loop::{ControlCoordinator, TickOutcome};
use serde_json::json;

use common::{Faults, Harness};

fn inside_point() -> Position {
    Position::new(37.7752, -122.4190)
}

fn outside_point() -> Position {
    Position::new(37.7800, -122.4194)
}

#[tokio::test]
async fn fire_event_triggers_single_move() {
    let mut h = Harness::new(Config::default());
    h.airborne().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs
        .events
        .send(Event::new(EventKind::Fire, 0.92, inside_point()))
        .unwrap();
    assert_eq!(coordinator.tick().await, TickOutcome::Continue);

    {
        let log = h.log();
        assert_eq!(log.gotos.len(), 1);
        assert_eq!(log.gotos[0], inside_point().with_altitude(15.0));
    }
    assert_eq!(h.alerts_of("fire"), 1);
}

#[tokio::test]
async fn events_only_alert_when_response_disabled() {
    let mut config = Config::default();
    config.emergency.automatic_response = false;
    let mut h = Harness::new(config);
    h.airborne().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs
        .events
        .send(Event::new(EventKind::BreakIn, 0.8, inside_point()))
        .unwrap();
    coordinator.tick().await;

    assert!(h.log().gotos.is_empty());
    assert_eq!(h.alerts_of("break_in"), 1);
}

#[tokio::test]
async fn unknown_event_kinds_only_alert() {
    let mut h = Harness::new(Config::default());
    h.airborne().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs
        .events
        .send(Event::new(EventKind::Other("smoke".into()), 0.6, inside_point()))
        .unwrap();
    coordinator.tick().await;

    assert!(h.log().gotos.is_empty());
    assert_eq!(h.alerts_of("smoke"), 1);
}

#[tokio::test]
async fn events_while_grounded_do_not_move() {
    let h = Harness::new(Config::default());
    h.connect().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs
        .events
        .send(Event::new(EventKind::Threat, 0.9, inside_point()))
        .unwrap();
    coordinator.tick().await;

    assert!(h.log().gotos.is_empty());
    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Connected);
}

#[tokio::test]
async fn takeoff_clamps_to_max_altitude() {
    let h = Harness::new(Config::default());
    h.connect().await;

    let altitude = h.vehicle.lock().await.takeoff(Some(50.0)).await.unwrap();
    assert_eq!(altitude, 30.0);
    assert_eq!(h.log().takeoffs, vec![30.0]);
    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Flying);
}

#[tokio::test(start_paused = true)]
async fn arm_timeout_keeps_vehicle_connected() {
    let faults = Faults {
        hang_on_arm: true,
        ..Faults::default()
    };
    let h = Harness::with_faults(Config::default(), faults, Duration::ZERO);
    h.connect().await;

    let result = h.vehicle.lock().await.takeoff(None).await;
    assert_eq!(result, Err(ControlError::ArmTimeout(Duration::from_secs(10))));
    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Connected);
    assert!(h.log().takeoffs.is_empty());
}

#[tokio::test]
async fn move_rejected_unless_flying() {
    let h = Harness::new(Config::default());
    h.connect().await;

    let result = h.vehicle.lock().await.move_to(inside_point(), None).await;
    assert!(matches!(result, Err(ControlError::CommandRejected(_))));
    assert_eq!(h.log().count("goto"), 0);
}

#[tokio::test]
async fn move_outside_geofence_is_corrected() {
    let h = Harness::new(Config::default());
    h.airborne().await;

    let commanded = h.vehicle.lock().await.move_to(outside_point(), None).await.unwrap();
    assert_ne!(commanded, outside_point().with_altitude(10.0));
    assert!(h.geofence.read().is_inside(&commanded));
    assert_eq!(commanded.altitude, Some(10.0));
    assert_eq!(h.log().gotos, vec![commanded]);
}

#[tokio::test]
async fn mission_waypoints_are_clipped_in_order() {
    let mut config = Config::default();
    let mut missions = BTreeMap::new();
    missions.insert(
        "perimeter".to_string(),
        MissionDefinition {
            name: "Perimeter".to_string(),
            waypoints: vec![
                Position::new(37.7750, -122.4190).with_altitude(12.0),
                outside_point().with_altitude(12.0),
                Position::new(37.7748, -122.4195),
            ],
        },
    );
    config.vehicle.missions = missions;
    let h = Harness::new(config);
    h.airborne().await;

    let mission = h.vehicle.lock().await.load_mission("perimeter").await.unwrap();
    assert_eq!(mission.corrected, vec![1]);
    assert_eq!(mission.current_waypoint, 0);

    let log = h.log();
    let uploaded = &log.uploads[0];
    assert_eq!(uploaded.len(), 3);
    assert_eq!(uploaded[0], Position::new(37.7750, -122.4190).with_altitude(12.0));
    assert!(h.geofence.read().is_inside(&uploaded[1]));
    assert_eq!(uploaded[2].altitude, Some(10.0));
    assert_eq!(log.modes.last(), Some(&FlightMode::Auto));
}

#[tokio::test]
async fn unknown_mission_is_reported() {
    let h = Harness::new(Config::default());
    h.airborne().await;

    let result = h.vehicle.lock().await.load_mission("nope").await;
    assert_eq!(result, Err(ControlError::MissionNotFound("nope".to_string())));
    assert!(h.log().uploads.is_empty());
}

#[tokio::test]
async fn malformed_commands_are_acked_as_rejected() {
    let mut h = Harness::new(Config::default());
    h.connect().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs.commands.send(json!({ "type": "barrel_roll" })).unwrap();
    inputs.commands.send(json!({ "type": "land" })).unwrap();
    coordinator.tick().await;

    let acks: Vec<_> = h
        .published()
        .into_iter()
        .filter_map(|m| match m {
            Downlink::Ack(ack) => Some(ack),
            _ => None,
        })
        .collect();
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].command, "barrel_roll");
    assert!(!acks[0].accepted);
    // Landing a grounded vehicle is an illegal transition
    assert_eq!(acks[1].command, "land");
    assert!(!acks[1].accepted);
}

#[tokio::test]
async fn takeoff_command_is_dispatched() {
    let h = Harness::new(Config::default());
    h.connect().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs
        .commands
        .send(json!({ "type": "takeoff", "altitude": 12.0 }))
        .unwrap();
    coordinator.tick().await;

    assert_eq!(h.log().takeoffs, vec![12.0]);
    let status = inputs.status.borrow().clone().unwrap();
    assert_eq!(status.state, VehicleState::Flying);
}

#[tokio::test]
async fn shutdown_command_lands_and_disconnects() {
    let h = Harness::new(Config::default());
    h.airborne().await;
    let (mut coordinator, inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());

    inputs.commands.send(json!({ "type": "shutdown" })).unwrap();
    let outcome = coordinator.tick().await;
    let TickOutcome::Shutdown(reason) = outcome else {
        panic!("expected shutdown, got {:?}", outcome);
    };
    coordinator.shutdown(&reason).await;

    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Disconnected);
    assert_eq!(h.log().mode_count(FlightMode::Land), 1);
    assert_eq!(h.log().count("disconnect"), 1);
    assert!(inputs.commands.send(json!({ "type": "land" })).is_err());
}

#[tokio::test]
async fn fatal_link_error_forces_safety_shutdown() {
    let faults = Faults {
        fatal_goto: true,
        ..Faults::default()
    };
    let h = Harness::with_faults(Config::default(), faults, Duration::ZERO);
    h.airborne().await;

    let result = h.vehicle.lock().await.move_to(inside_point(), None).await;
    assert!(matches!(result, Err(ControlError::Link(LinkError::Fatal(_)))));
    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Error);

    let (mut coordinator, _inputs) = ControlCoordinator::new(h.vehicle.clone(), h.config.emergency.clone());
    let outcome = coordinator.tick().await;
    assert_eq!(outcome, TickOutcome::Shutdown("vehicle fault".to_string()));
    coordinator.shutdown("vehicle fault").await;

    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Disconnected);
    assert_eq!(h.log().mode_count(FlightMode::Land), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_retries_unavailable_link() {
    let faults = Faults {
        connect_failures: 2,
        ..Faults::default()
    };
    let h = Harness::with_faults(Config::default(), faults, Duration::ZERO);

    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let home = h.vehicle.connect_with_retry(5, backoff).await.unwrap();

    assert_eq!(home, common::HOME.with_altitude(0.0));
    assert_eq!(h.log().count("connect"), 3);
    {
        let vehicle = h.vehicle.lock().await;
        assert_eq!(vehicle.state(), VehicleState::Connected);
        assert_eq!(vehicle.home(), Some(home));
    }
    h.vehicle.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect_gives_up_after_attempts() {
    let faults = Faults {
        connect_failures: 10,
        ..Faults::default()
    };
    let h = Harness::with_faults(Config::default(), faults, Duration::ZERO);

    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let result = h.vehicle.connect_with_retry(3, backoff).await;

    assert!(matches!(result, Err(ControlError::LinkUnavailable(_))));
    assert_eq!(h.log().count("connect"), 3);
    assert_eq!(h.vehicle.lock().await.state(), VehicleState::Disconnected);
}
