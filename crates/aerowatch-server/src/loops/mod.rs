//! Background loops for continuous processing.

pub mod control_loop;
pub mod safety_monitor;
