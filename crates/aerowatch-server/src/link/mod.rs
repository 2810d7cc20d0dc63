//! Flight link abstraction.
//!
//! The vehicle controller talks to the autopilot only through [`FlightLink`].
//! Two backends ship: an in-process simulator and a JSON/HTTP client for a
//! vehicle-side bridge service.

pub mod http;
pub mod sim;

use std::time::Duration;

use aerowatch_core::{FlightMode, Position, Telemetry};
use async_trait::async_trait;

use crate::config::Config;
use crate::error::LinkError;

pub use http::HttpLink;
pub use sim::SimulatedLink;

/// Low-level vehicle capability.
///
/// Implementations must be `Send + Sync` so the controller can own them as
/// `Box<dyn FlightLink>`. Every method is called with the controller lock
/// held, so at most one call is in flight at a time.
#[async_trait]
pub trait FlightLink: Send + Sync {
    /// Backend identifier (e.g. "simulated", "http").
    fn kind(&self) -> &'static str;

    /// Open the link and return the vehicle's home position.
    async fn connect(&mut self, connection: &str, timeout: Duration) -> Result<Position, LinkError>;

    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Arm the motors; resolves once the autopilot reports armed.
    async fn arm(&mut self) -> Result<(), LinkError>;

    /// Climb to `altitude_m`; resolves once the target is reached.
    async fn takeoff(&mut self, altitude_m: f64) -> Result<(), LinkError>;

    async fn goto(&mut self, target: Position, airspeed_mps: f64) -> Result<(), LinkError>;

    async fn set_mode(&mut self, mode: FlightMode) -> Result<(), LinkError>;

    /// Replace the autopilot's mission with `waypoints`.
    async fn upload_mission(&mut self, waypoints: &[Position]) -> Result<(), LinkError>;

    async fn read_telemetry(&mut self) -> Result<Telemetry, LinkError>;
}

/// Pick the link backend for the configured connection.
pub fn from_config(config: &Config) -> Result<Box<dyn FlightLink>, LinkError> {
    if config.simulation.enabled {
        return Ok(Box::new(SimulatedLink::new(config.simulation.clone())));
    }

    let connection = config.vehicle.connection_string.as_str();
    if connection.starts_with("http://") || connection.starts_with("https://") {
        return Ok(Box::new(HttpLink::new(config.vehicle.connect_timeout())?));
    }

    Err(LinkError::Unavailable(format!(
        "no link backend for '{}'; use an http(s):// bridge or enable simulation",
        connection
    )))
}
