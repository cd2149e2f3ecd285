//! Simulation host state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::TAU;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

// Internal
use super::Params;
use crate::steer_ctrl::{
    ChannelLayout, ControlOutput, Controller, ErrorInputs, ErrorTracker, SteerCtrlError
};
use util::{
    archive::{ArchiveError, Archiver},
    maths::{norm, wrap_deg_180}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Conversion factor from km/h to m/s.
const KMH_TO_MS: f64 = 1.0 / 3.6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematic state of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vehicle {
    /// Units: meters
    pub position_m: [f64; 2],

    /// Heading anticlockwise from the X axis, in [-180, 180).
    ///
    /// Units: degrees
    pub heading_deg: f64,

    /// Units: km/h
    pub speed_kmh: f64
}

/// The simulation host.
pub struct Sim {
    params: Params,

    vehicle: Vehicle,

    /// Index of the waypoint currently targeted
    target_index: usize,

    /// Displacement of the aim point from the targeted waypoint
    aim_offset_m: [f64; 2],

    rng: ChaCha8Rng,

    /// Raw errors measured on the last tick
    angular_error_deg: f64,
    distance_error_m: f64,

    angular: ErrorTracker,
    distance: ErrorTracker,

    stats: RunSummary,

    arch_trace: Option<Archiver>
}

/// Statistics over all ticks run so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub num_ticks: u64,

    pub waypoints_reached: u64,

    /// Units: degrees
    pub mean_abs_angular_error_deg: f64,

    /// Units: degrees
    pub max_abs_angular_error_deg: f64,

    /// Units: meters
    pub distance_travelled_m: f64
}

/// One row of the vehicle trace archive.
#[derive(Serialize)]
struct TraceRecord {
    tick: u64,
    x_m: f64,
    y_m: f64,
    heading_deg: f64,
    speed_kmh: f64,
    target_index: usize,
    angular_error_deg: f64,
    distance_error_m: f64,
    steer_control: f64,
    speed_control: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while running the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("The route needs at least 2 waypoints, found {0}")]
    TooFewWaypoints(usize),

    #[error("The parameter {0} must be positive")]
    NonPositiveParam(&'static str),

    #[error("The parameter {0} must be finite and not negative")]
    NegativeParam(&'static str),

    #[error("Steering control failed on tick {tick}: {source}")]
    ControlError {
        tick: u64,
        #[source]
        source: SteerCtrlError
    },

    #[error("Could not archive the vehicle trace: {0}")]
    ArchiveError(ArchiveError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Sim {
    /// Create a new simulation with the vehicle at its start pose.
    pub fn new(params: Params) -> Result<Self, SimError> {
        if params.waypoints_m.len() < 2 {
            return Err(SimError::TooFewWaypoints(params.waypoints_m.len()));
        }

        for &(name, value) in &[
            ("cycle_period_s", params.cycle_period_s),
            ("capture_radius_m", params.capture_radius_m),
            ("max_steer_control", params.max_steer_control)
        ] {
            if !(value > 0.0) {
                return Err(SimError::NonPositiveParam(name));
            }
        }

        if !(params.target_jitter_m.is_finite() && params.target_jitter_m >= 0.0) {
            return Err(SimError::NegativeParam("target_jitter_m"));
        }

        let vehicle = Vehicle {
            position_m: params.start_position_m,
            heading_deg: wrap_deg_180(params.start_heading_deg),
            speed_kmh: 0.0
        };

        let seed = params.jitter_seed.unwrap_or_else(rand::random);
        debug!("Aim point jitter {} m, seed {}", params.target_jitter_m, seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let aim_offset_m = random_offset(&mut rng, params.target_jitter_m);

        Ok(Self {
            params,
            vehicle,
            target_index: 0,
            aim_offset_m,
            rng,
            angular_error_deg: 0.0,
            distance_error_m: 0.0,
            angular: ErrorTracker::new(),
            distance: ErrorTracker::new(),
            stats: RunSummary::default(),
            arch_trace: None
        })
    }

    /// Archive the vehicle state every tick with the given archiver.
    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.arch_trace = Some(archiver);
        self
    }

    /// Run `num_ticks` ticks, stopping at the first error.
    pub fn run(
        &mut self,
        controller: &mut Controller,
        num_ticks: u64
    ) -> Result<RunSummary, SimError> {
        info!("Running simulation for {} ticks", num_ticks);

        for _ in 0..num_ticks {
            self.step(controller)?;
        }

        info!("Simulation complete: {:?}", self.stats);

        Ok(self.stats)
    }

    /// Run a single tick: measure, control, apply.
    pub fn step(&mut self, controller: &mut Controller) -> Result<ControlOutput, SimError> {
        let tick = self.stats.num_ticks;
        let ctrl_err = |source| SimError::ControlError { tick, source };

        let inputs = self.measure(controller.layout()).map_err(ctrl_err)?;
        let output = controller.tick(inputs).map_err(ctrl_err)?;
        self.apply(&output).map_err(ctrl_err)?;

        if let Some(ref mut a) = self.arch_trace {
            a.serialise(TraceRecord {
                tick,
                x_m: self.vehicle.position_m[0],
                y_m: self.vehicle.position_m[1],
                heading_deg: self.vehicle.heading_deg,
                speed_kmh: self.vehicle.speed_kmh,
                target_index: self.target_index,
                angular_error_deg: self.angular_error_deg,
                distance_error_m: self.distance_error_m,
                steer_control: output.steer_control,
                speed_control: output.speed_control
            }).map_err(SimError::ArchiveError)?;
        }

        Ok(output)
    }

    /// Measure the errors to the current aim point, advancing to the next
    /// waypoint first if the current one has been reached.
    ///
    /// The inputs carry the vehicle speed as well as the error channels.
    pub fn measure(&mut self, layout: ChannelLayout) -> Result<ErrorInputs, SteerCtrlError> {
        if self.distance_to_target() < self.params.capture_radius_m {
            self.target_index = (self.target_index + 1) % self.params.waypoints_m.len();
            self.aim_offset_m = random_offset(&mut self.rng, self.params.target_jitter_m);
            self.stats.waypoints_reached += 1;
            debug!("Waypoint reached, now targeting waypoint {}", self.target_index);
        }

        let target = self.aim_point_m();
        let dx = target[0] - self.vehicle.position_m[0];
        let dy = target[1] - self.vehicle.position_m[1];

        self.angular_error_deg =
            wrap_deg_180(dy.atan2(dx).to_degrees() - self.vehicle.heading_deg);
        self.distance_error_m = self.distance_to_target();

        let angular = self.angular.update(self.angular_error_deg)?;
        let distance = self.distance.update(self.distance_error_m)?;

        let inputs = match layout {
            ChannelLayout::Single => ErrorInputs::single(angular),
            ChannelLayout::Dual => ErrorInputs::dual(angular, distance)
        };

        inputs.with_vehicle_speed(self.vehicle.speed_kmh)
    }

    /// Apply the commands to the vehicle and advance it by one tick.
    pub fn apply(&mut self, output: &ControlOutput) -> Result<(), SteerCtrlError> {
        self.angular.record_control(output.steer_control)?;
        self.distance.record_control(output.speed_control)?;

        let dt = self.params.cycle_period_s;

        // Positive steering turns right, which is clockwise
        let steer = output.steer_control.clamp(
            -self.params.max_steer_control, self.params.max_steer_control
        );
        self.vehicle.heading_deg = wrap_deg_180(
            self.vehicle.heading_deg - steer * self.params.turn_rate_degs * dt
        );

        let speed = self.vehicle.speed_kmh;
        if output.speed_control < 0.0 {
            self.vehicle.speed_kmh = (speed - self.params.brake_kmhs * dt).max(0.0);
        }
        else if output.speed_control > speed {
            self.vehicle.speed_kmh = (speed + self.params.accel_kmhs * dt)
                .min(output.speed_control);
        }

        let step_m = self.vehicle.speed_kmh * KMH_TO_MS * dt;
        let heading_rad = self.vehicle.heading_deg.to_radians();
        self.vehicle.position_m[0] += step_m * heading_rad.cos();
        self.vehicle.position_m[1] += step_m * heading_rad.sin();

        // Update statistics
        let s = &mut self.stats;
        let abs_err = self.angular_error_deg.abs();
        s.mean_abs_angular_error_deg =
            (s.mean_abs_angular_error_deg * s.num_ticks as f64 + abs_err)
            / (s.num_ticks + 1) as f64;
        s.max_abs_angular_error_deg = s.max_abs_angular_error_deg.max(abs_err);
        s.distance_travelled_m += step_m;
        s.num_ticks += 1;

        Ok(())
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn target_index(&self) -> usize {
        self.target_index
    }

    pub fn summary(&self) -> &RunSummary {
        &self.stats
    }

    /// The point the vehicle is steering for: the targeted waypoint plus its
    /// random displacement.
    pub fn aim_point_m(&self) -> [f64; 2] {
        let wp = self.params.waypoints_m[self.target_index];
        [wp[0] + self.aim_offset_m[0], wp[1] + self.aim_offset_m[1]]
    }

    fn distance_to_target(&self) -> f64 {
        norm(&self.vehicle.position_m, &self.aim_point_m()).unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Draw a displacement uniformly distributed over a disc of the given radius.
fn random_offset<R: Rng>(rng: &mut R, radius_m: f64) -> [f64; 2] {
    if radius_m == 0.0 {
        return [0.0, 0.0];
    }

    let r = radius_m * rng.gen::<f64>().sqrt();
    let theta = rng.gen_range(0.0..TAU);
    [r * theta.cos(), r * theta.sin()]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::steer_ctrl::{self, LawRegistry, PdLaw};

    fn params() -> Params {
        Params {
            cycle_period_s: 0.1,
            num_ticks: 100,
            waypoints_m: vec![[40.0, 0.0], [40.0, 40.0], [0.0, 40.0], [0.0, 0.0]],
            capture_radius_m: 3.0,
            target_jitter_m: 0.0,
            jitter_seed: Some(1),
            start_position_m: [0.0, 0.0],
            start_heading_deg: 0.0,
            max_steer_control: 1.5,
            turn_rate_degs: 60.0,
            accel_kmhs: 20.0,
            brake_kmhs: 40.0
        }
    }

    fn controller() -> Controller {
        Controller::from_parts(
            ChannelLayout::Single,
            Box::new(PdLaw::new(0.025, 0.025, 60.0)),
            None
        )
    }

    fn command(steer_control: f64, speed_control: f64) -> ControlOutput {
        ControlOutput { steer_control, speed_control }
    }

    #[test]
    fn test_invalid_params() {
        let p = Params { waypoints_m: vec![[1.0, 1.0]], ..params() };
        assert!(matches!(Sim::new(p), Err(SimError::TooFewWaypoints(1))));

        let p = Params { cycle_period_s: 0.0, ..params() };
        assert!(matches!(Sim::new(p), Err(SimError::NonPositiveParam("cycle_period_s"))));

        let p = Params { target_jitter_m: -1.0, ..params() };
        assert!(matches!(Sim::new(p), Err(SimError::NegativeParam("target_jitter_m"))));
    }

    #[test]
    fn test_measure_errors() {
        let p = Params {
            waypoints_m: vec![[0.0, 10.0], [10.0, 10.0]],
            start_heading_deg: 170.0,
            ..params()
        };
        let mut sim = Sim::new(p).unwrap();

        // Target is straight up (90 deg), heading 170 deg
        let inputs = sim.measure(ChannelLayout::Dual).unwrap();
        assert!((inputs.angular.error() - -80.0).abs() < 1e-9);
        assert!((inputs.distance.unwrap().error() - 10.0).abs() < 1e-9);

        // Errors wrap across +/-180
        let p = Params {
            waypoints_m: vec![[-10.0, -1.0], [10.0, 10.0]],
            start_heading_deg: 170.0,
            ..params()
        };
        let mut sim = Sim::new(p).unwrap();
        let inputs = sim.measure(ChannelLayout::Single).unwrap();
        let bearing = (-1f64).atan2(-10.0).to_degrees();
        assert!((inputs.angular.error() - (bearing + 360.0 - 170.0)).abs() < 1e-9);
        assert!(inputs.distance.is_none());
    }

    #[test]
    fn test_steering_saturates() {
        let mut sim = Sim::new(params()).unwrap();

        // Left turn, saturated at 1.5
        sim.apply(&command(-10.0, 0.0)).unwrap();
        assert!((sim.vehicle().heading_deg - 1.5 * 60.0 * 0.1).abs() < 1e-9);

        // Right turn, unsaturated
        sim.apply(&command(0.5, 0.0)).unwrap();
        assert!((sim.vehicle().heading_deg - (9.0 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_speed_response() {
        let mut sim = Sim::new(params()).unwrap();

        sim.apply(&command(0.0, 60.0)).unwrap();
        assert!((sim.vehicle().speed_kmh - 2.0).abs() < 1e-9);

        // Accelerating never overshoots the command
        sim.apply(&command(0.0, 3.0)).unwrap();
        assert!((sim.vehicle().speed_kmh - 3.0).abs() < 1e-9);

        // Lower positive commands coast
        sim.apply(&command(0.0, 1.0)).unwrap();
        assert!((sim.vehicle().speed_kmh - 3.0).abs() < 1e-9);

        // Negative commands brake, down to a stop
        sim.apply(&command(0.0, -1.0)).unwrap();
        assert_eq!(sim.vehicle().speed_kmh, 0.0);
    }

    #[test]
    fn test_prev_control_carried() {
        let mut sim = Sim::new(params()).unwrap();

        sim.measure(ChannelLayout::Dual).unwrap();
        sim.apply(&command(0.25, 60.0)).unwrap();

        let inputs = sim.measure(ChannelLayout::Dual).unwrap();
        assert_eq!(inputs.angular.prev_control(), 0.25);
        assert_eq!(inputs.distance.unwrap().prev_control(), 60.0);
    }

    #[test]
    fn test_pd_reaches_waypoints() {
        let mut sim = Sim::new(params()).unwrap();
        let mut ctrl = controller();

        let summary = sim.run(&mut ctrl, 200).unwrap();

        assert_eq!(summary.num_ticks, 200);
        assert_eq!(ctrl.num_ticks(), 200);
        assert!(summary.waypoints_reached >= 1);
        assert!(summary.distance_travelled_m > 40.0);
    }

    #[test]
    fn test_run_records_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl_params = steer_ctrl::Params {
            channels: ChannelLayout::Dual,
            telemetry_path: dir.path().join("data.csv"),
            ..steer_ctrl::Params::default()
        };
        let mut ctrl = Controller::with_registry(&ctrl_params, &LawRegistry::default()).unwrap();

        let trace_path = dir.path().join("trace.csv");
        let mut sim = Sim::new(params())
            .unwrap()
            .with_archiver(Archiver::new(&trace_path).unwrap());

        sim.run(&mut ctrl, 25).unwrap();
        ctrl.close().unwrap();

        let telemetry = std::fs::read_to_string(&ctrl_params.telemetry_path).unwrap();
        assert_eq!(telemetry.lines().count(), 25);
        assert!(telemetry.lines().all(|l| l.split(',').count() == 8));

        // Header plus one line per tick
        let trace = std::fs::read_to_string(&trace_path).unwrap();
        assert_eq!(trace.lines().count(), 26);
    }

    #[test]
    fn test_control_error_names_tick() {
        let mut sim = Sim::new(params()).unwrap();
        let mut ctrl = controller();

        sim.run(&mut ctrl, 3).unwrap();
        ctrl.close().unwrap();

        match sim.step(&mut ctrl) {
            Err(SimError::ControlError { tick: 3, source: SteerCtrlError::RecorderClosedError }) => (),
            other => panic!("Expected a control error, got {:?}", other)
        }
    }

    #[test]
    fn test_inputs_carry_vehicle_speed() {
        let mut sim = Sim::new(params()).unwrap();
        sim.apply(&command(0.0, 60.0)).unwrap();

        let inputs = sim.measure(ChannelLayout::Single).unwrap();
        assert_eq!(inputs.vehicle_speed_kmh, Some(2.0));
    }

    #[test]
    fn test_exact_aim_without_jitter() {
        let sim = Sim::new(params()).unwrap();
        assert_eq!(sim.aim_point_m(), [40.0, 0.0]);
    }

    #[test]
    fn test_aim_point_jitter() {
        let p = Params {
            target_jitter_m: 2.0,
            jitter_seed: Some(7),
            start_position_m: [40.0, 0.0],
            ..params()
        };

        let mut sim = Sim::new(p.clone()).unwrap();
        let first = sim.aim_point_m();
        assert_ne!(first, [40.0, 0.0]);
        assert!(norm(&first, &[40.0, 0.0]).unwrap() <= 2.0);

        // The same seed gives the same displacements
        assert_eq!(Sim::new(p).unwrap().aim_point_m(), first);

        // The vehicle starts within the capture radius of the first aim point,
        // so the first measurement moves on and draws a new displacement
        sim.measure(ChannelLayout::Single).unwrap();
        assert_eq!(sim.target_index(), 1);
        assert_eq!(sim.summary().waypoints_reached, 1);

        let second = sim.aim_point_m();
        let offset = [second[0] - 40.0, second[1] - 40.0];
        let first_offset = [first[0] - 40.0, first[1]];
        assert!(norm(&second, &[40.0, 40.0]).unwrap() <= 2.0);
        assert_ne!(offset, first_offset);
    }
}
