//! Simulation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the simulation host
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Period of one tick.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Number of ticks to run for.
    pub num_ticks: u64,

    /// The route's waypoints, visited in order and looping back to the first.
    ///
    /// Units: meters
    pub waypoints_m: Vec<[f64; 2]>,

    /// Distance from the aim point under which the target counts as reached.
    ///
    /// Units: meters
    pub capture_radius_m: f64,

    /// Radius of the disc in which the aim point is displaced from each
    /// waypoint. A new displacement is drawn every time the target changes.
    /// Zero aims at the waypoints themselves.
    ///
    /// Units: meters
    #[serde(default)]
    pub target_jitter_m: f64,

    /// Seed for the aim point displacements, drawn at random if not given.
    #[serde(default)]
    pub jitter_seed: Option<u64>,

    /// Starting position of the vehicle.
    ///
    /// Units: meters
    pub start_position_m: [f64; 2],

    /// Starting heading of the vehicle, anticlockwise from the X axis.
    ///
    /// Units: degrees
    pub start_heading_deg: f64,

    /// Saturation limit on the magnitude of the steering command.
    pub max_steer_control: f64,

    /// Turn rate at a steering command of 1.
    ///
    /// Units: degrees/second
    pub turn_rate_degs: f64,

    /// Acceleration when the speed command is above the current speed.
    ///
    /// Units: km/h per second
    pub accel_kmhs: f64,

    /// Deceleration when the speed command is negative.
    ///
    /// Units: km/h per second
    pub brake_kmhs: f64
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
