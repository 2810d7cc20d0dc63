//! Core error types.

use thiserror::Error;

use crate::state_machine::{VehicleEvent, VehicleState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceError {
    #[error("Boundary '{0}' already exists")]
    DuplicateBoundary(String),

    #[error("Polygon '{name}' needs at least 3 distinct vertices, got {vertices}")]
    DegeneratePolygon { name: String, vertices: usize },

    #[error("Circle '{name}' has invalid radius {radius_m}m")]
    InvalidRadius { name: String, radius_m: f64 },

    #[error("Boundary '{name}' has invalid buffer {buffer_m}m")]
    InvalidBuffer { name: String, buffer_m: f64 },

    #[error("Minimum altitude ({min_m}m) must be below maximum altitude ({max_m}m)")]
    InvalidAltitudeLimits { min_m: f64, max_m: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissionError {
    #[error("Mission '{0}' not found")]
    NotFound(String),

    #[error("Mission '{0}' has no waypoints")]
    Empty(String),
}

/// Rejected state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal transition: {event:?} while {from:?}")]
pub struct TransitionError {
    pub from: VehicleState,
    pub event: VehicleEvent,
}
