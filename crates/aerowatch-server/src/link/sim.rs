//! In-process simulated vehicle.
//!
//! Kinematics are integrated lazily on every call from the elapsed tokio time,
//! so tests can drive the simulator with a paused clock.

use std::time::Duration;

use aerowatch_core::spatial::{degrees_to_meters, meters_to_degrees, PlanarPoint};
use aerowatch_core::{Battery, FlightMode, Position, Telemetry};
use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::SimulationConfig;
use crate::error::LinkError;
use crate::link::FlightLink;

const CRUISE_AIRSPEED_MPS: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Landing { started: Instant, from: Position },
    Returning { started: Instant, from: Position },
}

pub struct SimulatedLink {
    config: SimulationConfig,
    connected: bool,
    armed: bool,
    mode: FlightMode,
    home: Position,
    position: Position,
    target: Option<(Position, f64)>,
    mission: Vec<Position>,
    next_waypoint: usize,
    battery_pct: f64,
    heading_deg: f64,
    airspeed_mps: f64,
    phase: Phase,
    last_update: Instant,
}

fn altitude_of(pos: &Position) -> f64 {
    pos.altitude.unwrap_or(0.0)
}

fn progress(started: Instant, now: Instant, duration_s: f64) -> f64 {
    if duration_s <= 0.0 {
        return 1.0;
    }
    (now.saturating_duration_since(started).as_secs_f64() / duration_s).min(1.0)
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

impl SimulatedLink {
    pub fn new(config: SimulationConfig) -> Self {
        let home = config.home.with_altitude(0.0);
        Self {
            battery_pct: config.initial_battery_pct,
            config,
            connected: false,
            armed: false,
            mode: FlightMode::Stabilize,
            home,
            position: home,
            target: None,
            mission: Vec::new(),
            next_waypoint: 0,
            heading_deg: 0.0,
            airspeed_mps: 0.0,
            phase: Phase::Idle,
            last_update: Instant::now(),
        }
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.connected {
            Ok(())
        } else {
            Err(LinkError::Unavailable("simulated vehicle not connected".to_string()))
        }
    }

    fn ensure_armed(&self) -> Result<(), LinkError> {
        if self.armed {
            Ok(())
        } else {
            Err(LinkError::Rejected("vehicle is not armed".to_string()))
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        if self.armed {
            self.battery_pct = (self.battery_pct - self.config.battery_drain_pct_per_s * dt).max(0.0);
        }

        let phase = self.phase;
        match phase {
            Phase::Landing { started, from } => {
                let t = progress(started, now, self.config.land_duration_s);
                self.position.altitude = Some(altitude_of(&from) * (1.0 - t));
                if t >= 1.0 {
                    self.touchdown();
                }
            }
            Phase::Returning { started, from } => {
                let t = progress(started, now, self.config.rtl_duration_s);
                self.position = Position::new(
                    lerp(from.latitude, self.home.latitude, t),
                    lerp(from.longitude, self.home.longitude, t),
                )
                .with_altitude(altitude_of(&from) * (1.0 - t));
                if t >= 1.0 {
                    self.position = self.home;
                    self.touchdown();
                }
            }
            Phase::Idle if self.armed => match self.mode {
                FlightMode::Guided => {
                    if let Some((target, speed)) = self.target {
                        if self.fly_toward(target, speed, dt) {
                            self.target = None;
                        }
                    }
                }
                FlightMode::Auto => {
                    if let Some(waypoint) = self.mission.get(self.next_waypoint).copied() {
                        if self.fly_toward(waypoint, CRUISE_AIRSPEED_MPS, dt) {
                            self.next_waypoint += 1;
                        }
                    }
                }
                _ => {}
            },
            Phase::Idle => {}
        }
    }

    /// Move toward `target`; returns true once it is reached.
    fn fly_toward(&mut self, target: Position, speed_mps: f64, dt: f64) -> bool {
        let here = PlanarPoint::new(self.position.latitude, self.position.longitude);
        let there = PlanarPoint::new(target.latitude, target.longitude);
        let remaining_m = degrees_to_meters(here.distance_to(&there));
        let altitude = target.altitude.unwrap_or_else(|| altitude_of(&self.position));

        if remaining_m > f64::EPSILON {
            let heading = (there.lon - here.lon).atan2(there.lat - here.lat).to_degrees();
            self.heading_deg = heading.rem_euclid(360.0);
        }

        let step_m = speed_mps * dt;
        if step_m >= remaining_m {
            self.position = target.with_altitude(altitude);
            self.airspeed_mps = 0.0;
            return true;
        }

        let next = here.step_toward(&there, meters_to_degrees(step_m));
        self.position = Position::new(next.lat, next.lon).with_altitude(altitude);
        self.airspeed_mps = speed_mps;
        false
    }

    fn touchdown(&mut self) {
        self.armed = false;
        self.position.altitude = Some(0.0);
        self.phase = Phase::Idle;
        self.target = None;
        self.airspeed_mps = 0.0;
    }
}

#[async_trait]
impl FlightLink for SimulatedLink {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&mut self, connection: &str, _timeout: Duration) -> Result<Position, LinkError> {
        tracing::info!("SIMULATION: creating virtual vehicle (ignoring '{}')", connection);
        self.connected = true;
        self.position = self.home;
        self.last_update = Instant::now();
        Ok(self.home)
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.connected = false;
        Ok(())
    }

    async fn arm(&mut self) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.advance();
        self.armed = true;
        Ok(())
    }

    async fn takeoff(&mut self, altitude_m: f64) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.advance();
        self.ensure_armed()?;
        tracing::info!("SIMULATION: taking off to {}m", altitude_m);
        self.position.altitude = Some(altitude_m);
        self.mode = FlightMode::Guided;
        self.phase = Phase::Idle;
        Ok(())
    }

    async fn goto(&mut self, target: Position, airspeed_mps: f64) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.advance();
        self.ensure_armed()?;
        self.mode = FlightMode::Guided;
        self.phase = Phase::Idle;
        self.target = Some((target, airspeed_mps.max(0.1)));
        Ok(())
    }

    async fn set_mode(&mut self, mode: FlightMode) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.advance();
        let now = Instant::now();
        self.phase = match mode {
            FlightMode::Land if self.armed => Phase::Landing {
                started: now,
                from: self.position,
            },
            FlightMode::Rtl if self.armed => Phase::Returning {
                started: now,
                from: self.position,
            },
            _ => Phase::Idle,
        };
        self.mode = mode;
        Ok(())
    }

    async fn upload_mission(&mut self, waypoints: &[Position]) -> Result<(), LinkError> {
        self.ensure_connected()?;
        self.mission = waypoints.to_vec();
        self.next_waypoint = 0;
        Ok(())
    }

    async fn read_telemetry(&mut self) -> Result<Telemetry, LinkError> {
        self.ensure_connected()?;
        self.advance();
        Ok(Telemetry {
            mode: self.mode.clone(),
            armed: self.armed,
            battery: Battery {
                voltage: 10.5 + 2.1 * self.battery_pct / 100.0,
                current: if self.armed { 8.0 } else { 0.5 },
                level_pct: Some(self.battery_pct),
            },
            position: self.position,
            heading_deg: self.heading_deg,
            airspeed_mps: self.airspeed_mps,
            next_waypoint_index: (!self.mission.is_empty()).then_some(self.next_waypoint),
        })
    }
}
