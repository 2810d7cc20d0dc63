//! AeroWatch server: vehicle control, safety monitoring and the ground-control gateway.

pub mod api;
pub mod backoff;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod loops;
pub mod state;
pub mod vehicle;
