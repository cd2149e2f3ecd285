//! # Simulation module
//!
//! A minimal host for the steering controller. A kinematic vehicle drives
//! around a closed route of waypoints. Each tick the vehicle measures its
//! errors to the current waypoint:
//!
//! - the angular error, the bearing to the waypoint less the vehicle's
//!   heading, wrapped into [-180, 180) degrees,
//! - the distance error, the straight line distance to the waypoint.
//!
//! These are turned into error states by trackers, passed to the controller,
//! and the returned commands applied. The steering command is saturated and
//! turns the vehicle, positive to the right. A negative speed command brakes,
//! a speed command above the current speed accelerates towards it.
//!
//! Once the vehicle comes within the capture radius of a waypoint it targets
//! the next one, wrapping back to the first at the end of the route.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::*;
