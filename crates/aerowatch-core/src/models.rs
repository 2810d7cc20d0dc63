//! Core data models shared by the geofence engine, the vehicle controller
//! and the ground-control transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::state_machine::VehicleState;

/// A geographic position in decimal degrees with optional altitude (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude = Some(altitude_m);
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.altitude {
            Some(alt) => write!(f, "({:.6}, {:.6}, {:.1}m)", self.latitude, self.longitude, alt),
            None => write!(f, "({:.6}, {:.6})", self.latitude, self.longitude),
        }
    }
}

// ========== EVENTS & ALERTS ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Kind of event reported by the perception pipeline.
///
/// Unknown kinds are preserved verbatim so they can still be alerted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Fire,
    BreakIn,
    Suspicious,
    Threat,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fire => "fire",
            Self::BreakIn => "break_in",
            Self::Suspicious => "suspicious",
            Self::Threat => "threat",
            Self::Other(other) => other,
        }
    }

    /// Severity used when the producer did not set one.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Fire => Severity::Critical,
            Self::BreakIn | Self::Threat => Severity::High,
            Self::Suspicious | Self::Other(_) => Severity::Medium,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fire" => Self::Fire,
            "break_in" | "break-in" | "breakin" => Self::BreakIn,
            "suspicious" => Self::Suspicious,
            "threat" => Self::Threat,
            _ => Self::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detection produced by the perception collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub confidence: f64,
    pub location: Position,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, confidence: f64, location: Position) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            location,
            severity: None,
            timestamp: Utc::now(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity.unwrap_or_else(|| self.kind.default_severity())
    }
}

/// Ad-hoc notification published to ground control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub location: Option<Position>,
    pub message: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: impl Into<String>,
        severity: Severity,
        location: Option<Position>,
        message: impl Into<String>,
    ) -> Self {
        let kind = kind.into();
        let now = Utc::now();
        Self {
            alert_id: format!("{}-{}", kind.to_uppercase(), Uuid::new_v4()),
            kind,
            severity,
            location,
            message: message.into(),
            confidence: None,
            timestamp: now,
        }
    }

    pub fn from_event(event: &Event) -> Self {
        let mut alert = Self::new(
            event.kind.as_str(),
            event.severity(),
            Some(event.location),
            format!(
                "{} detected at {} (confidence {:.2})",
                event.kind, event.location, event.confidence
            ),
        );
        alert.confidence = Some(event.confidence);
        alert.timestamp = event.timestamp;
        alert
    }
}

// ========== COMMANDS ==========

/// Command received from ground control.
///
/// Wire schema is `{"type": "...", ...kind-specific fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Fly to coordinates, optionally at a new altitude
    Move {
        coordinates: Position,
        #[serde(default)]
        altitude: Option<f64>,
    },
    /// Arm and climb (default altitude when absent)
    Takeoff {
        #[serde(default)]
        altitude: Option<f64>,
    },
    Land,
    /// Return to launch
    Return,
    /// Load and start a predefined mission
    Mission { mission_id: String },
    /// Safe shutdown of the whole system
    Shutdown,
}

impl Command {
    /// Parse a raw wire command, rejecting unknown or malformed kinds.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Takeoff { .. } => "takeoff",
            Self::Land => "land",
            Self::Return => "return",
            Self::Mission { .. } => "mission",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Outcome of a processed command, published back to ground control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandAck {
    pub fn accepted(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            accepted: true,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            accepted: false,
            reason: Some(reason.into()),
            timestamp: Utc::now(),
        }
    }
}

// ========== TELEMETRY & STATUS ==========

/// Autopilot flight mode as reported by the flight link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlightMode {
    Guided,
    Auto,
    Land,
    Rtl,
    Loiter,
    Stabilize,
    Other(String),
}

impl FlightMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Guided => "GUIDED",
            Self::Auto => "AUTO",
            Self::Land => "LAND",
            Self::Rtl => "RTL",
            Self::Loiter => "LOITER",
            Self::Stabilize => "STABILIZE",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for FlightMode {
    fn from(value: String) -> Self {
        match value.trim().to_uppercase().as_str() {
            "GUIDED" => Self::Guided,
            "AUTO" => Self::Auto,
            "LAND" => Self::Land,
            "RTL" => Self::Rtl,
            "LOITER" => Self::Loiter,
            "STABILIZE" => Self::Stabilize,
            _ => Self::Other(value),
        }
    }
}

impl From<FlightMode> for String {
    fn from(mode: FlightMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Battery {
    pub voltage: f64,
    pub current: f64,
    /// Remaining charge in percent, when the autopilot reports it
    pub level_pct: Option<f64>,
}

/// Point-in-time vehicle state reported by the flight link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub mode: FlightMode,
    pub armed: bool,
    pub battery: Battery,
    pub position: Position,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub airspeed_mps: f64,
    /// Index of the mission item the autopilot is flying towards
    #[serde(default)]
    pub next_waypoint_index: Option<usize>,
}

/// Read-only projection of the vehicle, recomputed every control tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: VehicleState,
    pub position: Option<Position>,
    pub battery: Option<Battery>,
    pub airspeed: f64,
    pub heading: f64,
    pub mission_id: Option<String>,
    pub waypoint_index: usize,
    pub timestamp: DateTime<Utc>,
}

/// Everything published from the core to ground control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum Downlink {
    Status(StatusSnapshot),
    Alert(Alert),
    Ack(CommandAck),
}

// ========== MISSIONS ==========

/// A named waypoint sequence from the mission catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub name: String,
    pub waypoints: Vec<Position>,
}

/// A mission validated against the geofence and ready for (or already) uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub name: String,
    pub waypoints: Vec<Position>,
    /// Indices of waypoints replaced by a geofence correction
    pub corrected: Vec<usize>,
    pub current_waypoint: usize,
}
