//! Vehicle controller.
//!
//! [`VehicleController`] owns the flight link, the lifecycle state machine and
//! the mission planner. It is only reachable through [`VehicleHandle`], whose
//! FIFO-fair async mutex guarantees at most one link call in flight; the
//! control loop and the safety monitor both queue on it.

use std::sync::Arc;

use aerowatch_core::{
    Downlink, FlightMode, Mission, MissionPlanner, Position, StatusSnapshot, Telemetry,
    VehicleEvent, VehicleState, VehicleStateMachine,
};
use chrono::Utc;
use tokio::sync::{broadcast, Mutex, MutexGuard};

use crate::backoff::Backoff;
use crate::config::{SafetyConfig, VehicleConfig};
use crate::error::{ControlError, LinkError};
use crate::link::FlightLink;
use crate::loops::safety_monitor::run_safety_monitor;
use crate::state::SharedGeofence;

pub struct VehicleController {
    link: Box<dyn FlightLink>,
    machine: VehicleStateMachine,
    geofence: SharedGeofence,
    planner: MissionPlanner,
    config: VehicleConfig,
    home: Option<Position>,
    /// Last commanded or observed autopilot mode
    mode: Option<FlightMode>,
    telemetry: Option<Telemetry>,
    monitor_stop: Option<broadcast::Sender<()>>,
}

impl VehicleController {
    pub fn new(link: Box<dyn FlightLink>, geofence: SharedGeofence, config: VehicleConfig) -> Self {
        Self {
            planner: MissionPlanner::new(config.missions.clone(), config.default_altitude_m),
            link,
            machine: VehicleStateMachine::new(),
            geofence,
            config,
            home: None,
            mode: None,
            telemetry: None,
            monitor_stop: None,
        }
    }

    pub fn state(&self) -> VehicleState {
        self.machine.state()
    }

    pub fn link_kind(&self) -> &'static str {
        self.link.kind()
    }

    pub fn home(&self) -> Option<Position> {
        self.home
    }

    pub fn geofence(&self) -> &SharedGeofence {
        &self.geofence
    }

    pub fn current_mission(&self) -> Option<&Mission> {
        self.planner.current()
    }

    fn transition(&mut self, event: VehicleEvent) -> Result<VehicleState, ControlError> {
        let from = self.machine.state();
        match self.machine.apply(event) {
            Ok(to) => {
                tracing::info!("Vehicle state {} -> {} ({:?})", from, to, event);
                Ok(to)
            }
            Err(err) => {
                tracing::warn!("{}", err);
                Err(err.into())
            }
        }
    }

    fn ensure_state(&self, allowed: &[VehicleState], action: &str) -> Result<(), ControlError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(ControlError::CommandRejected(format!(
                "cannot {} while {}",
                action, state
            )))
        }
    }

    /// Fatal link errors fault the state machine; everything else passes through.
    fn link_failure(&mut self, err: LinkError) -> ControlError {
        if err.is_fatal() {
            tracing::error!("Flight link fault: {}", err);
            if let Err(transition) = self.machine.apply(VehicleEvent::LinkFault) {
                tracing::warn!("{}", transition);
            }
        } else {
            tracing::warn!("Flight link error: {}", err);
        }
        ControlError::Link(err)
    }

    async fn command_mode(&mut self, mode: FlightMode) -> Result<(), ControlError> {
        let result = self.link.set_mode(mode.clone()).await;
        if let Err(err) = result {
            return Err(self.link_failure(err));
        }
        self.mode = Some(mode);
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<Position, ControlError> {
        if self.state() != VehicleState::Disconnected {
            return Err(ControlError::CommandRejected(format!(
                "already {}",
                self.state()
            )));
        }

        let timeout = self.config.connect_timeout();
        let connection = self.config.connection_string.clone();
        tracing::info!("Connecting to vehicle at {} ({} link)", connection, self.link.kind());

        let home = match tokio::time::timeout(timeout, self.link.connect(&connection, timeout)).await {
            Ok(Ok(home)) => home,
            Ok(Err(err)) => return Err(ControlError::LinkUnavailable(err.to_string())),
            Err(_) => {
                return Err(ControlError::LinkUnavailable(format!(
                    "no response within {:?}",
                    timeout
                )))
            }
        };

        self.home = Some(home);
        self.transition(VehicleEvent::Connect)?;
        tracing::info!("Connected to vehicle, home {}", home);
        Ok(home)
    }

    /// Close the link, clear the mission and cancel the safety monitor.
    pub async fn disconnect(&mut self) -> Result<(), ControlError> {
        self.stop_monitor();
        if let Some(mission) = self.planner.clear() {
            tracing::info!("Cleared mission '{}'", mission.id);
        }

        if self.state() == VehicleState::Disconnected {
            return Ok(());
        }

        if let Err(err) = self.link.disconnect().await {
            tracing::warn!("Flight link disconnect failed: {}", err);
        }
        self.telemetry = None;
        self.mode = None;
        self.transition(VehicleEvent::Disconnect)?;
        Ok(())
    }

    /// Arm and climb. Returns the commanded altitude after clamping.
    pub async fn takeoff(&mut self, altitude_m: Option<f64>) -> Result<f64, ControlError> {
        self.ensure_state(&[VehicleState::Connected], "take off")?;

        let requested = altitude_m.unwrap_or(self.config.default_altitude_m);
        let altitude = self
            .geofence
            .read()
            .clamp_altitude(requested.min(self.config.max_altitude_m));
        if altitude != requested {
            tracing::warn!(
                "Requested altitude {}m outside limits, using {}m",
                requested,
                altitude
            );
        }

        self.command_mode(FlightMode::Guided).await?;

        let arm_timeout = self.config.arm_timeout();
        match tokio::time::timeout(arm_timeout, self.link.arm()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(self.link_failure(err)),
            Err(_) => {
                tracing::error!("Arming timeout after {:?}", arm_timeout);
                return Err(ControlError::ArmTimeout(arm_timeout));
            }
        }
        self.transition(VehicleEvent::ArmConfirmed)?;

        tracing::info!("Taking off to {}m", altitude);
        let result = self.link.takeoff(altitude).await;
        if let Err(err) = result {
            if err.is_fatal() {
                return Err(self.link_failure(err));
            }
            tracing::error!("Takeoff failed: {}", err);
            self.transition(VehicleEvent::ArmAborted)?;
            return Err(err.into());
        }

        self.transition(VehicleEvent::Airborne)?;
        tracing::info!("Target altitude of {}m reached", altitude);
        Ok(altitude)
    }

    /// Fly to `target`, corrected into the geofence. Returns the commanded position.
    pub async fn move_to(&mut self, target: Position, altitude_m: Option<f64>) -> Result<Position, ControlError> {
        self.ensure_state(&[VehicleState::Flying], "move")?;

        let requested_altitude = altitude_m
            .or(target.altitude)
            .unwrap_or(self.config.default_altitude_m);
        let (commanded, violation) = {
            let geofence = self.geofence.read();
            let altitude = geofence.clamp_altitude(requested_altitude.min(self.config.max_altitude_m));
            let candidate = target.with_altitude(altitude);
            if geofence.is_inside(&candidate) {
                (candidate, None)
            } else {
                let corrected = geofence.nearest_safe_point(&candidate);
                (
                    corrected,
                    Some(ControlError::GeofenceViolation {
                        target: candidate,
                        corrected,
                    }),
                )
            }
        };
        if let Some(violation) = violation {
            tracing::warn!("{}", violation);
        }

        if self.mode != Some(FlightMode::Guided) {
            self.command_mode(FlightMode::Guided).await?;
        }

        let result = self.link.goto(commanded, self.config.airspeed_mps).await;
        if let Err(err) = result {
            return Err(self.link_failure(err));
        }

        tracing::info!("Moving to {}", commanded);
        Ok(commanded)
    }

    pub async fn land(&mut self) -> Result<(), ControlError> {
        self.ensure_state(&[VehicleState::Flying, VehicleState::Returning], "land")?;
        self.command_mode(FlightMode::Land).await?;
        self.transition(VehicleEvent::Land)?;
        tracing::info!("Landing");
        Ok(())
    }

    /// Switch to RTL. Returns false when already returning.
    pub async fn return_to_home(&mut self) -> Result<bool, ControlError> {
        if self.state() == VehicleState::Returning {
            tracing::debug!("Already returning home");
            return Ok(false);
        }
        self.ensure_state(&[VehicleState::Flying], "return home")?;
        self.command_mode(FlightMode::Rtl).await?;
        self.transition(VehicleEvent::ReturnHome)?;
        tracing::info!("Returning to home location");
        Ok(true)
    }

    /// Prepare, upload and start a catalog mission, replacing any current one.
    pub async fn load_mission(&mut self, mission_id: &str) -> Result<Mission, ControlError> {
        self.ensure_state(&[VehicleState::Flying], "start a mission")?;

        let mission = {
            let geofence = self.geofence.read();
            self.planner.prepare(mission_id, &geofence)?
        };
        for index in &mission.corrected {
            tracing::warn!(
                "Waypoint {} of '{}' outside geofence, adjusted to {}",
                index,
                mission_id,
                mission.waypoints[*index]
            );
        }

        let result = self.link.upload_mission(&mission.waypoints).await;
        if let Err(err) = result {
            return Err(self.link_failure(err));
        }
        self.command_mode(FlightMode::Auto).await?;

        let mission = self.planner.activate(mission).clone();
        tracing::info!(
            "Starting mission '{}' with {} waypoints",
            mission.id,
            mission.waypoints.len()
        );
        Ok(mission)
    }

    pub async fn poll_telemetry(&mut self) -> Result<Telemetry, ControlError> {
        if self.state() == VehicleState::Disconnected {
            return Err(ControlError::LinkUnavailable("not connected".to_string()));
        }

        let result = self.link.read_telemetry().await;
        let telemetry = match result {
            Ok(telemetry) => telemetry,
            Err(err) => return Err(self.link_failure(err)),
        };

        self.mode = Some(telemetry.mode.clone());
        self.telemetry = Some(telemetry.clone());
        Ok(telemetry)
    }

    /// Align the state machine with externally observed mode and arming.
    ///
    /// Returns the new state when a transition was applied.
    pub fn reconcile(&mut self, telemetry: &Telemetry) -> Option<VehicleState> {
        let state = self.state();
        let event = if !telemetry.armed
            && matches!(
                state,
                VehicleState::Landing | VehicleState::Returning | VehicleState::Armed
            ) {
            VehicleEvent::Landed
        } else {
            match (&telemetry.mode, state) {
                (FlightMode::Land, VehicleState::Flying | VehicleState::Returning) => VehicleEvent::Land,
                (FlightMode::Rtl, VehicleState::Flying) => VehicleEvent::ReturnHome,
                _ => return None,
            }
        };

        tracing::info!("Detected {} mode (armed: {}) while {}", telemetry.mode, telemetry.armed, state);
        let next = self.transition(event).ok()?;
        if event == VehicleEvent::Landed {
            tracing::info!("Vehicle has landed");
            if let Some(mission) = self.planner.clear() {
                tracing::info!("Cleared mission '{}'", mission.id);
            }
        }
        Some(next)
    }

    /// Apply link-reported mission progress; returns the new index when it changed.
    pub fn record_progress(&mut self, telemetry: &Telemetry) -> Option<usize> {
        if telemetry.mode != FlightMode::Auto {
            return None;
        }
        let index = telemetry.next_waypoint_index?;
        if self.planner.record_progress(index) {
            tracing::info!("Moving to waypoint {}", index);
            Some(index)
        } else {
            None
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let telemetry = self.telemetry.as_ref();
        let mission = self.planner.current();
        StatusSnapshot {
            state: self.state(),
            position: telemetry.map(|t| t.position),
            battery: telemetry.map(|t| t.battery),
            airspeed: telemetry.map(|t| t.airspeed_mps).unwrap_or(0.0),
            heading: telemetry.map(|t| t.heading_deg).unwrap_or(0.0),
            mission_id: mission.map(|m| m.id.clone()),
            waypoint_index: mission.map(|m| m.current_waypoint).unwrap_or(0),
            timestamp: Utc::now(),
        }
    }

    /// Land if airborne, then disconnect. Never fails.
    pub async fn emergency_shutdown(&mut self) {
        match self.state() {
            VehicleState::Flying | VehicleState::Returning => {
                tracing::info!("Landing vehicle before shutdown");
                if let Err(err) = self.land().await {
                    tracing::error!("Landing before shutdown failed: {}", err);
                }
            }
            VehicleState::Error => {
                tracing::warn!("Forcing LAND on faulted vehicle");
                if let Err(err) = self.link.set_mode(FlightMode::Land).await {
                    tracing::error!("Forced landing failed: {}", err);
                }
            }
            _ => {}
        }

        if let Err(err) = self.disconnect().await {
            tracing::error!("Disconnect during shutdown failed: {}", err);
        }
    }

    fn attach_monitor(&mut self) -> broadcast::Receiver<()> {
        self.stop_monitor();
        let (tx, rx) = broadcast::channel(1);
        self.monitor_stop = Some(tx);
        rx
    }

    fn stop_monitor(&mut self) {
        if let Some(stop) = self.monitor_stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Shared, serialized access to the vehicle.
#[derive(Clone)]
pub struct VehicleHandle {
    inner: Arc<Mutex<VehicleController>>,
    safety: SafetyConfig,
    downlink: broadcast::Sender<Downlink>,
}

impl VehicleHandle {
    pub fn new(
        controller: VehicleController,
        safety: SafetyConfig,
        downlink: broadcast::Sender<Downlink>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
            safety,
            downlink,
        }
    }

    /// Wait for exclusive access; contenders are served in FIFO order.
    pub async fn lock(&self) -> MutexGuard<'_, VehicleController> {
        self.inner.lock().await
    }

    pub fn safety(&self) -> &SafetyConfig {
        &self.safety
    }

    pub fn downlink(&self) -> &broadcast::Sender<Downlink> {
        &self.downlink
    }

    /// Fan out to ground control; dropped when nobody is listening.
    pub fn publish(&self, message: Downlink) {
        let _ = self.downlink.send(message);
    }

    /// Connect and start the safety monitor for this connection.
    pub async fn connect(&self) -> Result<Position, ControlError> {
        let (home, stop) = {
            let mut vehicle = self.inner.lock().await;
            let home = vehicle.connect().await?;
            (home, vehicle.attach_monitor())
        };
        tokio::spawn(run_safety_monitor(self.clone(), stop));
        Ok(home)
    }

    /// Connect, retrying unavailable links with exponential backoff.
    pub async fn connect_with_retry(&self, attempts: u32, mut backoff: Backoff) -> Result<Position, ControlError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Ok(home) => return Ok(home),
                Err(ControlError::LinkUnavailable(reason)) if attempt < attempts => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        "Connection attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        reason,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), ControlError> {
        self.inner.lock().await.disconnect().await
    }
}
