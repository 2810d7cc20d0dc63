//! Server configuration.
//!
//! Built-in defaults, optionally merged with a JSON file, then overridden by
//! environment variables.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use aerowatch_core::{
    BatteryThresholds, BoundaryConfig, EventKind, GeofenceConfig, MissionDefinition, Position,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vehicle: VehicleConfig,
    pub geofence: GeofenceConfig,
    pub safety: SafetyConfig,
    pub emergency: EmergencyConfig,
    pub gateway: GatewayConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// `http(s)://` selects the HTTP bridge link
    pub connection_string: String,
    pub connect_timeout_s: u64,
    pub default_altitude_m: f64,
    pub max_altitude_m: f64,
    pub airspeed_mps: f64,
    pub arm_timeout_s: u64,
    /// Startup connect attempts before giving up
    pub connect_attempts: u32,
    pub missions: BTreeMap<String, MissionDefinition>,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let mut missions = BTreeMap::new();
        missions.insert(
            "patrol".to_string(),
            MissionDefinition {
                name: "Standard Patrol".to_string(),
                waypoints: vec![
                    Position::new(37.7749, -122.4194).with_altitude(10.0),
                    Position::new(37.7750, -122.4190).with_altitude(15.0),
                    Position::new(37.7755, -122.4185).with_altitude(10.0),
                    Position::new(37.7753, -122.4192).with_altitude(15.0),
                ],
            },
        );

        Self {
            connection_string: "udp:127.0.0.1:14550".to_string(),
            connect_timeout_s: 30,
            default_altitude_m: 10.0,
            max_altitude_m: 30.0,
            airspeed_mps: 3.0,
            arm_timeout_s: 10,
            connect_attempts: 5,
            missions,
        }
    }
}

impl VehicleConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub fn arm_timeout(&self) -> Duration {
        Duration::from_secs(self.arm_timeout_s)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vehicle: VehicleConfig::default(),
            geofence: default_geofence(),
            safety: SafetyConfig::default(),
            emergency: EmergencyConfig::default(),
            gateway: GatewayConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_geofence() -> GeofenceConfig {
    let center = Position::new(37.7749, -122.4194);
    GeofenceConfig {
        min_altitude_m: 2.0,
        max_altitude_m: 30.0,
        buffer_distance_m: 5.0,
        boundaries: vec![
            BoundaryConfig::Circle {
                name: Some("Main Area".to_string()),
                center,
                radius_m: 100.0,
                buffer_m: 0.0,
            },
            BoundaryConfig::Polygon {
                name: Some("Secondary Area".to_string()),
                coordinates: vec![
                    Position::new(37.7760, -122.4190),
                    Position::new(37.7765, -122.4180),
                    Position::new(37.7755, -122.4175),
                    Position::new(37.7750, -122.4185),
                ],
                buffer_m: 5.0,
            },
        ],
        default_center: Some(center),
        default_radius_m: 100.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    #[serde(flatten)]
    pub battery: BatteryThresholds,
    pub monitor_interval_ms: u64,
    /// Pause after a failed monitor tick
    pub error_backoff_s: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            battery: BatteryThresholds::default(),
            monitor_interval_ms: 1000,
            error_backoff_s: 5,
        }
    }
}

impl SafetyConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub fire_inspection_altitude_m: f64,
    /// Break-in tracking
    pub tracking_altitude_m: f64,
    /// Suspicious activity
    pub investigation_altitude_m: f64,
    pub threat_observation_altitude_m: f64,
    /// Move toward events; alerts are raised either way
    pub automatic_response: bool,
    pub control_interval_ms: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            fire_inspection_altitude_m: 15.0,
            tracking_altitude_m: 10.0,
            investigation_altitude_m: 12.0,
            threat_observation_altitude_m: 20.0,
            automatic_response: true,
            control_interval_ms: 100,
        }
    }
}

impl EmergencyConfig {
    /// Observation altitude for an event kind; `None` for alert-only kinds.
    pub fn altitude_for(&self, kind: &EventKind) -> Option<f64> {
        match kind {
            EventKind::Fire => Some(self.fire_inspection_altitude_m),
            EventKind::BreakIn => Some(self.tracking_altitude_m),
            EventKind::Suspicious => Some(self.investigation_altitude_m),
            EventKind::Threat => Some(self.threat_observation_altitude_m),
            EventKind::Other(_) => None,
        }
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub home: Position,
    pub initial_battery_pct: f64,
    pub battery_drain_pct_per_s: f64,
    pub land_duration_s: f64,
    pub rtl_duration_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            home: Position::new(37.7749, -122.4194).with_altitude(0.0),
            initial_battery_pct: 100.0,
            battery_drain_pct_per_s: 0.05,
            land_duration_s: 5.0,
            rtl_duration_s: 10.0,
        }
    }
}

impl Config {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::from_env());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let overlay: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        let mut config = Self::from_overlay(overlay)?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Deep-merge a partial JSON document over the built-in defaults.
    pub fn from_overlay(overlay: Value) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default()).context("Failed to encode defaults")?;
        merge_json(&mut merged, overlay);
        serde_json::from_value(merged).context("Invalid configuration")
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("AEROWATCH_PORT").and_then(|s| s.parse().ok()) {
            self.gateway.port = port;
        }
        if let Some(connection) = lookup("AEROWATCH_CONNECTION").filter(|s| !s.trim().is_empty()) {
            self.vehicle.connection_string = connection;
        }
        if let Some(simulation) = lookup("AEROWATCH_SIMULATION") {
            self.simulation.enabled = matches!(
                simulation.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }
}

/// Objects merge key by key; every other value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
