pub mod error;
pub mod geofence;
pub mod mission;
pub mod models;
pub mod rules;
pub mod spatial;
pub mod state_machine;

pub use error::{GeofenceError, MissionError, TransitionError};
pub use geofence::{
    AltitudeLimits, BoundaryConfig, BoundaryInfo, BoundaryKind, GeofenceConfig, GeofenceEngine,
};
pub use mission::MissionPlanner;
pub use models::{
    Alert, Battery, Command, CommandAck, Downlink, Event, EventKind, FlightMode, Mission,
    MissionDefinition, Position, Severity, StatusSnapshot, Telemetry,
};
pub use rules::{BatteryAction, BatteryGuard, BatteryThresholds};
pub use state_machine::{VehicleEvent, VehicleState, VehicleStateMachine};
