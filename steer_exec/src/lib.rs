//! # Steering library.
//!
//! This library allows the executable, benchmarks and host integrations to
//! access the steering controller and the simulation host.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Steering control module - turns error measurements into steering and speed commands
pub mod steer_ctrl;

/// Simulation - a kinematic vehicle following a route, driven by the steering controller
pub mod sim;
