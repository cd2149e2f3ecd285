//! Error channel state and per-tick control samples

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::SteerCtrlError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Snapshot of one error channel for a single tick.
///
/// All fields are finite, construction rejects NaN and infinities.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorState {
    error: f64,
    delta_error: f64,
    delta_error2: f64,
    prev_control: f64
}

/// The error channels supplied by the host for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorInputs {
    /// Angular error channel, always present.
    pub angular: ErrorState,

    /// Distance error channel, present only in the dual layout.
    pub distance: Option<ErrorState>,

    /// Measured vehicle speed, if the host supplies it. It is not part of the
    /// channel layout and is not recorded.
    ///
    /// Units: km/h
    pub vehicle_speed_kmh: Option<f64>
}

/// The commands produced for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ControlOutput {
    /// Steering command. Negative means left.
    pub steer_control: f64,

    /// Speed command. Negative means braking.
    pub speed_control: f64
}

/// A completed tick: the error inputs together with the commands the law
/// produced for them.
///
/// Samples can only be built once the outputs are known, so a partially
/// populated sample never exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlSample {
    inputs: ErrorInputs,
    output: ControlOutput
}

/// Derives an [`ErrorState`] from a stream of raw error measurements.
///
/// Each update computes the first difference against the previous measurement
/// and the second difference against the previous first difference. The last
/// control output applied on the channel is carried as `prev_control`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorTracker {
    state: ErrorState
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The error channels known to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Angular,
    Distance
}

/// How many error channels are supplied each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// Angular channel only.
    Single,

    /// Angular and distance channels.
    Dual
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ErrorState {
    /// Create a new state with a zero previous control.
    pub fn new(
        error: f64,
        delta_error: f64,
        delta_error2: f64
    ) -> Result<Self, SteerCtrlError> {
        Ok(Self {
            error: check_finite("error", error)?,
            delta_error: check_finite("delta_error", delta_error)?,
            delta_error2: check_finite("delta_error2", delta_error2)?,
            prev_control: 0.0
        })
    }

    /// Return a copy of this state with the given previous control.
    pub fn with_prev_control(self, prev_control: f64) -> Result<Self, SteerCtrlError> {
        Ok(Self {
            prev_control: check_finite("prev_control", prev_control)?,
            ..self
        })
    }

    /// Proportional term.
    pub fn error(&self) -> f64 {
        self.error
    }

    /// First difference of the error.
    pub fn delta_error(&self) -> f64 {
        self.delta_error
    }

    /// Second difference of the error.
    pub fn delta_error2(&self) -> f64 {
        self.delta_error2
    }

    /// Control output on this channel during the previous tick.
    pub fn prev_control(&self) -> f64 {
        self.prev_control
    }
}

impl ErrorInputs {
    /// Inputs for the single channel layout.
    pub fn single(angular: ErrorState) -> Self {
        Self {
            angular,
            distance: None,
            vehicle_speed_kmh: None
        }
    }

    /// Inputs for the dual channel layout.
    pub fn dual(angular: ErrorState, distance: ErrorState) -> Self {
        Self {
            angular,
            distance: Some(distance),
            vehicle_speed_kmh: None
        }
    }

    /// Return a copy of these inputs carrying the vehicle speed.
    pub fn with_vehicle_speed(self, speed_kmh: f64) -> Result<Self, SteerCtrlError> {
        Ok(Self {
            vehicle_speed_kmh: Some(check_finite("vehicle_speed_kmh", speed_kmh)?),
            ..self
        })
    }

    /// The layout these inputs match.
    pub fn layout(&self) -> ChannelLayout {
        match self.distance {
            Some(_) => ChannelLayout::Dual,
            None => ChannelLayout::Single
        }
    }

    /// Get a channel, or `None` if it's not present.
    pub fn channel(&self, channel: Channel) -> Option<&ErrorState> {
        match channel {
            Channel::Angular => Some(&self.angular),
            Channel::Distance => self.distance.as_ref()
        }
    }
}

impl ControlOutput {
    /// True if both commands are finite.
    pub fn is_finite(&self) -> bool {
        self.steer_control.is_finite() && self.speed_control.is_finite()
    }
}

impl ControlSample {
    pub fn new(inputs: ErrorInputs, output: ControlOutput) -> Self {
        Self { inputs, output }
    }

    pub fn inputs(&self) -> &ErrorInputs {
        &self.inputs
    }

    pub fn output(&self) -> &ControlOutput {
        &self.output
    }

    pub fn layout(&self) -> ChannelLayout {
        self.inputs.layout()
    }

    /// Append this sample's telemetry row to `row`.
    ///
    /// The row is each channel's `error, delta_error, delta_error2` (angular
    /// first, then distance if present) followed by `steer_control,
    /// speed_control`.
    pub fn extend_row(&self, row: &mut Vec<f64>) {
        let mut push_channel = |s: &ErrorState| {
            row.extend_from_slice(&[s.error, s.delta_error, s.delta_error2]);
        };

        push_channel(&self.inputs.angular);
        if let Some(ref d) = self.inputs.distance {
            push_channel(d);
        }

        row.extend_from_slice(&[self.output.steer_control, self.output.speed_control]);
    }

    /// This sample's telemetry row, see [`ControlSample::extend_row`].
    pub fn row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.layout().num_columns());
        self.extend_row(&mut row);
        row
    }
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a new raw error measurement and return the updated state.
    ///
    /// A non-finite measurement is rejected and leaves the tracker unchanged.
    pub fn update(&mut self, error: f64) -> Result<ErrorState, SteerCtrlError> {
        let error = check_finite("error", error)?;

        let delta = error - self.state.error;
        let state = ErrorState::new(error, delta, delta - self.state.delta_error)?;
        self.state = state.with_prev_control(self.state.prev_control)?;

        Ok(self.state)
    }

    /// Remember the control output applied on this channel so the next state
    /// carries it as `prev_control`.
    pub fn record_control(&mut self, control: f64) -> Result<(), SteerCtrlError> {
        self.state = self.state.with_prev_control(control)?;
        Ok(())
    }

    /// The current state of the channel.
    pub fn state(&self) -> ErrorState {
        self.state
    }
}

impl ChannelLayout {
    /// Number of error channels in the layout.
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Single => 1,
            ChannelLayout::Dual => 2
        }
    }

    /// Number of columns in a telemetry row for the layout.
    pub fn num_columns(&self) -> usize {
        3 * self.num_channels() + 2
    }

    /// True if the layout provides the given channel.
    pub fn has_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Angular => true,
            Channel::Distance => *self == ChannelLayout::Dual
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        ChannelLayout::Single
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_finite(field: &'static str, value: f64) -> Result<f64, SteerCtrlError> {
    if value.is_finite() {
        Ok(value)
    }
    else {
        Err(SteerCtrlError::InvalidErrorInput { field, value })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_state_rejects_non_finite() {
        assert!(ErrorState::new(1.0, 2.0, 3.0).is_ok());

        match ErrorState::new(f64::NAN, 0.0, 0.0) {
            Err(SteerCtrlError::InvalidErrorInput { field, .. }) => assert_eq!(field, "error"),
            other => panic!("Expected invalid input, got {:?}", other)
        }
        match ErrorState::new(0.0, 0.0, f64::NEG_INFINITY) {
            Err(SteerCtrlError::InvalidErrorInput { field, .. }) => {
                assert_eq!(field, "delta_error2")
            },
            other => panic!("Expected invalid input, got {:?}", other)
        }

        let s = ErrorState::default();
        assert!(s.with_prev_control(f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_state_defaults() {
        let s = ErrorState::new(1.0, 2.0, 3.0).unwrap();
        assert_eq!(s.prev_control(), 0.0);

        let s = s.with_prev_control(-0.5).unwrap();
        assert_eq!(
            (s.error(), s.delta_error(), s.delta_error2(), s.prev_control()),
            (1.0, 2.0, 3.0, -0.5)
        );
    }

    #[test]
    fn test_layout() {
        let a = ErrorState::new(1.0, 0.0, 0.0).unwrap();
        let d = ErrorState::new(10.0, 0.0, 0.0).unwrap();

        let single = ErrorInputs::single(a);
        assert_eq!(single.layout(), ChannelLayout::Single);
        assert!(single.channel(Channel::Distance).is_none());

        let dual = ErrorInputs::dual(a, d);
        assert_eq!(dual.layout(), ChannelLayout::Dual);
        assert_eq!(dual.channel(Channel::Distance), Some(&d));

        assert_eq!(ChannelLayout::Single.num_columns(), 5);
        assert_eq!(ChannelLayout::Dual.num_columns(), 8);
        assert!(!ChannelLayout::Single.has_channel(Channel::Distance));
    }

    #[test]
    fn test_vehicle_speed_not_recorded() {
        let a = ErrorState::new(1.0, 2.0, 3.0).unwrap();
        let inputs = ErrorInputs::single(a).with_vehicle_speed(42.0).unwrap();

        assert_eq!(inputs.vehicle_speed_kmh, Some(42.0));
        assert_eq!(inputs.layout(), ChannelLayout::Single);
        assert!(ErrorInputs::single(a).with_vehicle_speed(f64::NAN).is_err());

        let out = ControlOutput { steer_control: 0.5, speed_control: 60.0 };
        assert_eq!(ControlSample::new(inputs, out).row(), vec![1.0, 2.0, 3.0, 0.5, 60.0]);
    }

    #[test]
    fn test_sample_row_order() {
        let a = ErrorState::new(1.0, 2.0, 3.0).unwrap();
        let d = ErrorState::new(4.0, 5.0, 6.0).unwrap().with_prev_control(9.0).unwrap();
        let out = ControlOutput { steer_control: -0.075, speed_control: 60.0 };

        let single = ControlSample::new(ErrorInputs::single(a), out);
        assert_eq!(single.row(), vec![1.0, 2.0, 3.0, -0.075, 60.0]);

        let dual = ControlSample::new(ErrorInputs::dual(a, d), out);
        assert_eq!(dual.row(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, -0.075, 60.0]);
    }

    #[test]
    fn test_tracker_differences() {
        let mut t = ErrorTracker::new();

        let s = t.update(10.0).unwrap();
        assert_eq!((s.error(), s.delta_error(), s.delta_error2()), (10.0, 10.0, 10.0));

        let s = t.update(15.0).unwrap();
        assert_eq!((s.error(), s.delta_error(), s.delta_error2()), (15.0, 5.0, -5.0));

        let s = t.update(15.0).unwrap();
        assert_eq!((s.error(), s.delta_error(), s.delta_error2()), (15.0, 0.0, -5.0));
    }

    #[test]
    fn test_tracker_prev_control() {
        let mut t = ErrorTracker::new();
        t.update(1.0).unwrap();
        t.record_control(0.25).unwrap();

        assert_eq!(t.update(2.0).unwrap().prev_control(), 0.25);

        // Bad measurements leave the tracker untouched
        assert!(t.update(f64::NAN).is_err());
        assert_eq!(t.state().error(), 2.0);
    }
}
