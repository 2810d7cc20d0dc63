//! Shared fixtures: a scripted flight link that records every call.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aerowatch_core::{Battery, Downlink, FlightMode, GeofenceEngine, Position, Telemetry};
use aerowatch_server::config::Config;
use aerowatch_server::error::LinkError;
use aerowatch_server::link::FlightLink;
use aerowatch_server::state::SharedGeofence;
use aerowatch_server::vehicle::{VehicleController, VehicleHandle};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub const HOME: Position = Position {
    latitude: 37.7749,
    longitude: -122.4194,
    altitude: None,
};

#[derive(Debug, Default)]
pub struct LinkLog {
    pub calls: Vec<&'static str>,
    pub takeoffs: Vec<f64>,
    pub gotos: Vec<Position>,
    pub modes: Vec<FlightMode>,
    pub uploads: Vec<Vec<Position>>,
    in_flight: usize,
    pub max_in_flight: usize,
}

impl LinkLog {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn mode_count(&self, mode: FlightMode) -> usize {
        self.modes.iter().filter(|m| **m == mode).count()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Connect attempts that fail before one succeeds
    pub connect_failures: usize,
    /// `arm` never resolves
    pub hang_on_arm: bool,
    pub fatal_goto: bool,
    pub telemetry_error: bool,
}

pub struct RecordingLink {
    log: Arc<Mutex<LinkLog>>,
    telemetry: Arc<Mutex<Telemetry>>,
    faults: Arc<Mutex<Faults>>,
    call_delay: Duration,
}

pub fn initial_telemetry() -> Telemetry {
    Telemetry {
        mode: FlightMode::Stabilize,
        armed: false,
        battery: Battery {
            voltage: 12.6,
            current: 0.5,
            level_pct: Some(100.0),
        },
        position: HOME.with_altitude(10.0),
        heading_deg: 0.0,
        airspeed_mps: 0.0,
        next_waypoint_index: None,
    }
}

impl RecordingLink {
    async fn enter(&self, call: &'static str) {
        {
            let mut log = self.log.lock().unwrap();
            log.calls.push(call);
            log.in_flight += 1;
            log.max_in_flight = log.max_in_flight.max(log.in_flight);
        }
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.log.lock().unwrap().in_flight -= 1;
    }
}

#[async_trait]
impl FlightLink for RecordingLink {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn connect(&mut self, _connection: &str, _timeout: Duration) -> Result<Position, LinkError> {
        self.enter("connect").await;
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.connect_failures > 0 {
                faults.connect_failures -= 1;
                return Err(LinkError::Unavailable("no heartbeat".to_string()));
            }
        }
        Ok(HOME.with_altitude(0.0))
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.enter("disconnect").await;
        Ok(())
    }

    async fn arm(&mut self) -> Result<(), LinkError> {
        self.enter("arm").await;
        let hang = self.faults.lock().unwrap().hang_on_arm;
        if hang {
            std::future::pending::<()>().await;
        }
        self.telemetry.lock().unwrap().armed = true;
        Ok(())
    }

    async fn takeoff(&mut self, altitude_m: f64) -> Result<(), LinkError> {
        self.enter("takeoff").await;
        self.log.lock().unwrap().takeoffs.push(altitude_m);
        Ok(())
    }

    async fn goto(&mut self, target: Position, _airspeed_mps: f64) -> Result<(), LinkError> {
        self.enter("goto").await;
        let fatal = self.faults.lock().unwrap().fatal_goto;
        if fatal {
            return Err(LinkError::Fatal("autopilot stopped responding".to_string()));
        }
        self.log.lock().unwrap().gotos.push(target);
        Ok(())
    }

    async fn set_mode(&mut self, mode: FlightMode) -> Result<(), LinkError> {
        self.enter("set_mode").await;
        self.log.lock().unwrap().modes.push(mode.clone());
        self.telemetry.lock().unwrap().mode = mode;
        Ok(())
    }

    async fn upload_mission(&mut self, waypoints: &[Position]) -> Result<(), LinkError> {
        self.enter("upload_mission").await;
        self.log.lock().unwrap().uploads.push(waypoints.to_vec());
        Ok(())
    }

    async fn read_telemetry(&mut self) -> Result<Telemetry, LinkError> {
        self.enter("read_telemetry").await;
        let stalled = self.faults.lock().unwrap().telemetry_error;
        if stalled {
            return Err(LinkError::Unavailable("telemetry stream stalled".to_string()));
        }
        Ok(self.telemetry.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub vehicle: VehicleHandle,
    pub geofence: SharedGeofence,
    pub log: Arc<Mutex<LinkLog>>,
    pub telemetry: Arc<Mutex<Telemetry>>,
    pub faults: Arc<Mutex<Faults>>,
    pub downlink: broadcast::Receiver<Downlink>,
    pub config: Config,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_faults(config, Faults::default(), Duration::ZERO)
    }

    pub fn with_faults(config: Config, faults: Faults, call_delay: Duration) -> Self {
        let log = Arc::new(Mutex::new(LinkLog::default()));
        let telemetry = Arc::new(Mutex::new(initial_telemetry()));
        let faults = Arc::new(Mutex::new(faults));
        let link = RecordingLink {
            log: log.clone(),
            telemetry: telemetry.clone(),
            faults: faults.clone(),
            call_delay,
        };

        let geofence = SharedGeofence::new(GeofenceEngine::new(&config.geofence).unwrap());
        let controller = VehicleController::new(Box::new(link), geofence.clone(), config.vehicle.clone());
        let (tx, downlink) = broadcast::channel(64);
        let vehicle = VehicleHandle::new(controller, config.safety.clone(), tx);

        Self {
            vehicle,
            geofence,
            log,
            telemetry,
            faults,
            downlink,
            config,
        }
    }

    /// Connect without starting the background monitor.
    pub async fn connect(&self) {
        self.vehicle.lock().await.connect().await.unwrap();
    }

    pub async fn airborne(&self) {
        let mut vehicle = self.vehicle.lock().await;
        vehicle.connect().await.unwrap();
        vehicle.takeoff(Some(10.0)).await.unwrap();
    }

    pub fn set_telemetry(&self, update: impl FnOnce(&mut Telemetry)) {
        update(&mut self.telemetry.lock().unwrap());
    }

    pub fn set_faults(&self, update: impl FnOnce(&mut Faults)) {
        update(&mut self.faults.lock().unwrap());
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, LinkLog> {
        self.log.lock().unwrap()
    }

    /// Drain everything published so far.
    pub fn published(&mut self) -> Vec<Downlink> {
        let mut messages = Vec::new();
        while let Ok(message) = self.downlink.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn alerts_of(&mut self, kind: &str) -> usize {
        self.published()
            .iter()
            .filter(|m| matches!(m, Downlink::Alert(alert) if alert.kind == kind))
            .count()
    }
}
