//! Fan control engine modules
//!
//! Contains the control law and the fail-safe actuator guard.

mod failsafe;
mod law;

pub use failsafe::FailSafe;
pub use law::{linear_duty, ControlLaw, ControlOutput, ControllerState};
