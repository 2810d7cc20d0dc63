//! In-memory state shared by the gateway, the control loop and the monitor.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aerowatch_core::{Downlink, Event, GeofenceEngine, StatusSnapshot};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::loops::control_loop::CoordinatorInputs;
use crate::vehicle::VehicleHandle;

/// Geofence engine shared between the controller and the gateway.
///
/// Lock guards are never held across an await point.
#[derive(Debug, Clone)]
pub struct SharedGeofence(Arc<RwLock<GeofenceEngine>>);

impl SharedGeofence {
    pub fn new(engine: GeofenceEngine) -> Self {
        Self(Arc::new(RwLock::new(engine)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GeofenceEngine> {
        // Boundary edits are single push/retain calls; a poisoned engine is still whole
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GeofenceEngine> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Application state handed to every gateway route.
pub struct AppState {
    vehicle: VehicleHandle,
    geofence: SharedGeofence,
    events: mpsc::UnboundedSender<Event>,
    commands: mpsc::UnboundedSender<Value>,
    status: watch::Receiver<Option<StatusSnapshot>>,
    pub tx: broadcast::Sender<Downlink>,
}

impl AppState {
    pub fn new(vehicle: VehicleHandle, geofence: SharedGeofence, inputs: CoordinatorInputs) -> Self {
        Self {
            tx: vehicle.downlink().clone(),
            vehicle,
            geofence,
            events: inputs.events,
            commands: inputs.commands,
            status: inputs.status,
        }
    }

    pub fn vehicle(&self) -> &VehicleHandle {
        &self.vehicle
    }

    pub fn geofence(&self) -> &SharedGeofence {
        &self.geofence
    }

    /// Queue an event for the control loop. Returns false once intake stopped.
    pub fn submit_event(&self, event: Event) -> bool {
        self.events.send(event).is_ok()
    }

    /// Queue a raw command for the control loop. Returns false once intake stopped.
    pub fn submit_command(&self, command: Value) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Latest snapshot published by the control loop.
    pub fn latest_status(&self) -> Option<StatusSnapshot> {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Downlink> {
        self.tx.subscribe()
    }
}
