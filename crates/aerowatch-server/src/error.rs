//! Error types for the flight link and the vehicle controller.

use aerowatch_core::{MissionError, TransitionError};
use thiserror::Error;

/// Failure reported by a [`crate::link::FlightLink`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("Flight link unavailable: {0}")]
    Unavailable(String),

    #[error("Vehicle rejected request: {0}")]
    Rejected(String),

    /// Link state can no longer be trusted
    #[error("Fatal flight link error: {0}")]
    Fatal(String),

    #[error("Bridge HTTP error: {0}")]
    Http(String),
}

impl LinkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unavailable(format!("timeout: {}", err))
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("Could not connect to vehicle: {0}")]
    LinkUnavailable(String),

    #[error("Vehicle did not arm within {0:?}")]
    ArmTimeout(std::time::Duration),

    /// Target outside the geofence; always corrected before reaching the link
    #[error("Target {target} outside geofence, corrected to {corrected}")]
    GeofenceViolation {
        target: aerowatch_core::Position,
        corrected: aerowatch_core::Position,
    },

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Mission '{0}' not found")]
    MissionNotFound(String),

    #[error("Safety monitor tick failed: {0}")]
    MonitorTick(String),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<TransitionError> for ControlError {
    fn from(err: TransitionError) -> Self {
        Self::CommandRejected(err.to_string())
    }
}

impl From<MissionError> for ControlError {
    fn from(err: MissionError) -> Self {
        match err {
            MissionError::NotFound(id) => Self::MissionNotFound(id),
            other => Self::CommandRejected(other.to_string()),
        }
    }
}
