//! Vehicle lifecycle state machine.
//!
//! Every state change of the vehicle controller goes through
//! [`VehicleStateMachine::apply`]; transitions outside the table are rejected
//! and leave the state untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    #[default]
    Disconnected,
    Connected,
    Armed,
    Flying,
    Returning,
    Landing,
    Error,
}

impl VehicleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Armed => "armed",
            Self::Flying => "flying",
            Self::Returning => "returning",
            Self::Landing => "landing",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleEvent {
    /// Link established
    Connect,
    /// Autopilot reports armed
    ArmConfirmed,
    /// Takeoff target reached
    Airborne,
    /// Arm or takeoff did not complete
    ArmAborted,
    Land,
    ReturnHome,
    /// Autopilot reports disarmed on the ground
    Landed,
    Disconnect,
    /// Unrecoverable link failure
    LinkFault,
}

/// Pure transition table.
pub fn next_state(from: VehicleState, event: VehicleEvent) -> Option<VehicleState> {
    use VehicleEvent as E;
    use VehicleState as S;

    match (from, event) {
        (S::Disconnected, E::Connect) => Some(S::Connected),

        (S::Connected, E::ArmConfirmed) => Some(S::Armed),

        (S::Armed, E::Airborne) => Some(S::Flying),
        (S::Armed, E::ArmAborted) | (S::Armed, E::Landed) => Some(S::Connected),

        (S::Flying, E::Land) => Some(S::Landing),
        (S::Flying, E::ReturnHome) => Some(S::Returning),

        (S::Returning, E::Land) => Some(S::Landing),
        (S::Returning, E::Landed) => Some(S::Connected),

        (S::Landing, E::Landed) => Some(S::Connected),

        (_, E::Disconnect) => Some(S::Disconnected),

        (S::Disconnected, E::LinkFault) => None,
        (_, E::LinkFault) => Some(S::Error),

        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct VehicleStateMachine {
    state: VehicleState,
}

impl VehicleStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn apply(&mut self, event: VehicleEvent) -> Result<VehicleState, TransitionError> {
        match next_state(self.state, event) {
            Some(next) => {
                self.state = next;
                Ok(next)
            }
            None => Err(TransitionError {
                from: self.state,
                event,
            }),
        }
    }
}
