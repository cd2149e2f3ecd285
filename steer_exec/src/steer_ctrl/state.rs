//! Steering control facade called by the host every tick

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::Path;
use log::{info, trace};

// Internal
use super::*;
use util::params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The steering controller.
///
/// Owns one control law and optionally one telemetry recorder. The host must
/// call `tick` from a single thread.
pub struct Controller {
    /// Channel layout every tick's inputs must match
    layout: ChannelLayout,

    law: Box<dyn ControlLaw>,

    recorder: Option<TelemetryRecorder>,

    /// Number of completed ticks
    num_ticks: u64,

    closed: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Controller {
    /// Initialise the controller from a parameter file, using the built in
    /// laws.
    pub fn from_params_file<P: AsRef<Path>>(params_path: P) -> Result<Self, SteerCtrlError> {
        let params: Params = match params::load(params_path) {
            Ok(p) => p,
            Err(e) => return Err(SteerCtrlError::ParamLoadError(e))
        };

        Self::init(&params)
    }

    /// Initialise the controller using the built in laws.
    pub fn init(params: &Params) -> Result<Self, SteerCtrlError> {
        Self::with_registry(params, &LawRegistry::default())
    }

    /// Initialise the controller, building the law from the given registry.
    ///
    /// Fails without accepting any tick if the law cannot be built, for
    /// instance because a learned law's model is missing.
    pub fn with_registry(
        params: &Params,
        registry: &LawRegistry
    ) -> Result<Self, SteerCtrlError> {
        let law = registry.build(params)?;

        let recorder = if params.telemetry_enabled {
            Some(TelemetryRecorder::new(&params.telemetry_path, params.channels))
        }
        else {
            None
        };

        info!("Steering controller initialised");
        info!("    Law: {}", law.name());
        info!("    Channels: {:?}", params.channels);
        match recorder {
            Some(ref r) => info!("    Telemetry: {:?}", r.path()),
            None => info!("    Telemetry: disabled")
        }

        Ok(Self::from_parts(params.channels, law, recorder))
    }

    /// Assemble a controller from an already built law and recorder.
    pub fn from_parts(
        layout: ChannelLayout,
        law: Box<dyn ControlLaw>,
        recorder: Option<TelemetryRecorder>
    ) -> Self {
        Self {
            layout,
            law,
            recorder,
            num_ticks: 0,
            closed: false
        }
    }

    /// Process one tick.
    ///
    /// Processing involves:
    ///  1. Checking the inputs match the configured channel layout
    ///  1. Asking the law for the steering and speed commands
    ///  1. Rejecting non-finite commands
    ///  1. Reporting the completed sample to the recorder, if there is one
    ///
    /// No I/O is performed. Once the controller has been closed every tick
    /// fails with `RecorderClosedError`, even when telemetry is disabled and
    /// there is no recorder.
    pub fn tick(&mut self, inputs: ErrorInputs) -> Result<ControlOutput, SteerCtrlError> {
        if self.closed {
            return Err(SteerCtrlError::RecorderClosedError);
        }

        if inputs.layout() != self.layout {
            return Err(SteerCtrlError::ChannelMismatch {
                expected: self.layout,
                found: inputs.layout()
            });
        }

        let output = self.law.controls(&inputs)?;
        if !output.is_finite() {
            return Err(SteerCtrlError::NonFiniteOutput {
                steer: output.steer_control,
                speed: output.speed_control
            });
        }

        if let Some(ref mut r) = self.recorder {
            r.report(&ControlSample::new(inputs, output))?;
        }

        self.num_ticks += 1;
        trace!(
            "Tick {}: steer {:.4}, speed {:.2}",
            self.num_ticks, output.steer_control, output.speed_control
        );

        Ok(output)
    }

    /// Close the controller, flushing any recorded telemetry.
    ///
    /// Calling this more than once has no further effect. If it's never
    /// called the telemetry is flushed when the controller is dropped, but
    /// write errors can then only be logged.
    pub fn close(&mut self) -> Result<(), SteerCtrlError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        info!("Closing steering controller after {} ticks", self.num_ticks);

        match self.recorder {
            Some(ref mut r) => r.close(),
            None => Ok(())
        }
    }

    pub fn law_name(&self) -> &str {
        self.law.name()
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The telemetry recorder, if telemetry is enabled.
    pub fn recorder(&self) -> Option<&TelemetryRecorder> {
        self.recorder.as_ref()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn angular(e: f64, d: f64, d2: f64) -> ErrorInputs {
        ErrorInputs::single(ErrorState::new(e, d, d2).unwrap())
    }

    fn params_in(dir: &Path) -> Params {
        Params {
            telemetry_path: dir.join("data.csv"),
            ..Params::default()
        }
    }

    /// Produces NaN steering.
    struct BrokenLaw;

    impl ControlLaw for BrokenLaw {
        fn name(&self) -> &str {
            "broken"
        }

        fn steer_control(&self, _: &ErrorInputs) -> Result<f64, SteerCtrlError> {
            Ok(f64::NAN)
        }

        fn speed_control(&self, _: &ErrorInputs) -> Result<f64, SteerCtrlError> {
            Ok(60.0)
        }
    }

    #[test]
    fn test_default_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::init(&params_in(dir.path())).unwrap();

        let out = ctrl.tick(angular(1.0, 2.0, 0.0)).unwrap();
        assert!((out.steer_control - -0.075).abs() < 1e-12);
        assert_eq!(out.speed_control, 60.0);
        assert_eq!(ctrl.law_name(), "pd");
        assert_eq!(ctrl.num_ticks(), 1);
    }

    #[test]
    fn test_three_ticks_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let params = params_in(dir.path());
        let mut ctrl = Controller::init(&params).unwrap();

        let inputs = [angular(1.0, 2.0, 3.0), angular(-4.0, 0.5, 0.0), angular(10.0, -1.0, 2.0)];
        let mut outputs = Vec::new();
        for i in inputs.iter() {
            outputs.push(ctrl.tick(*i).unwrap());
        }
        ctrl.close().unwrap();

        let text = fs::read_to_string(&params.telemetry_path).unwrap();
        let rows: Vec<Vec<f64>> = text
            .lines()
            .map(|l| l.split(',').map(|v| v.parse().unwrap()).collect())
            .collect();

        assert_eq!(rows.len(), 3);
        for ((row, i), o) in rows.iter().zip(inputs.iter()).zip(outputs.iter()) {
            assert_eq!(
                *row,
                vec![
                    i.angular.error(), i.angular.delta_error(), i.angular.delta_error2(),
                    o.steer_control, o.speed_control
                ]
            );
        }
    }

    #[test]
    fn test_tick_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = Controller::init(&params_in(dir.path())).unwrap();

        ctrl.tick(angular(1.0, 0.0, 0.0)).unwrap();
        ctrl.close().unwrap();
        ctrl.close().unwrap();

        assert!(ctrl.is_closed());
        assert!(matches!(
            ctrl.tick(angular(1.0, 0.0, 0.0)),
            Err(SteerCtrlError::RecorderClosedError)
        ));
        assert_eq!(ctrl.recorder().map(|r| r.num_rows()), Some(1));
    }

    #[test]
    fn test_learned_missing_model_fails_at_init() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            law: "learned".into(),
            model_path: PathBuf::from("/nonexistent/network.json"),
            ..params_in(dir.path())
        };

        match Controller::init(&params) {
            Err(SteerCtrlError::ModelLoadError { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/network.json"))
            },
            Err(e) => panic!("Expected a model load error, got {:?}", e),
            Ok(_) => panic!("Expected a model load error")
        }
    }

    #[test]
    fn test_learned_tick() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("network.json");
        fs::write(
            &model_path,
            r#"{ "layers": [ { "weights": [[-0.025, -0.025, 0.0]], "bias": [0.0] } ] }"#
        ).unwrap();

        let params = Params {
            law: "learned".into(),
            model_path,
            ..params_in(dir.path())
        };
        let mut ctrl = Controller::init(&params).unwrap();

        let out = ctrl.tick(angular(1.0, 2.0, 50.0)).unwrap();
        assert!((out.steer_control - -0.075).abs() < 1e-12);
        assert_eq!(out.speed_control, 60.0);
    }

    #[test]
    fn test_layout_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            channels: ChannelLayout::Dual,
            ..params_in(dir.path())
        };
        let mut ctrl = Controller::init(&params).unwrap();

        assert!(matches!(
            ctrl.tick(angular(1.0, 0.0, 0.0)),
            Err(SteerCtrlError::ChannelMismatch { .. })
        ));

        let s = ErrorState::new(1.0, 0.0, 0.0).unwrap();
        assert!(ctrl.tick(ErrorInputs::dual(s, s)).is_ok());
    }

    #[test]
    fn test_non_finite_output_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut ctrl = Controller::from_parts(
            ChannelLayout::Single,
            Box::new(BrokenLaw),
            Some(TelemetryRecorder::new(&path, ChannelLayout::Single))
        );

        assert!(matches!(
            ctrl.tick(angular(1.0, 0.0, 0.0)),
            Err(SteerCtrlError::NonFiniteOutput { .. })
        ));
        assert_eq!(ctrl.recorder().map(|r| r.num_rows()), Some(0));
        assert_eq!(ctrl.num_ticks(), 0);
    }

    #[test]
    fn test_telemetry_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            telemetry_enabled: false,
            ..params_in(dir.path())
        };
        let mut ctrl = Controller::init(&params).unwrap();

        ctrl.tick(angular(1.0, 0.0, 0.0)).unwrap();
        ctrl.close().unwrap();

        assert!(ctrl.recorder().is_none());
        assert!(!params.telemetry_path.exists());
    }

    #[test]
    fn test_tick_after_close_without_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            telemetry_enabled: false,
            ..params_in(dir.path())
        };
        let mut ctrl = Controller::init(&params).unwrap();

        ctrl.tick(angular(1.0, 0.0, 0.0)).unwrap();
        ctrl.close().unwrap();

        assert!(ctrl.is_closed());
        assert!(matches!(
            ctrl.tick(angular(1.0, 0.0, 0.0)),
            Err(SteerCtrlError::RecorderClosedError)
        ));
        assert_eq!(ctrl.num_ticks(), 1);
        assert!(!params.telemetry_path.exists());
    }

    #[test]
    fn test_fuzzy_tick() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            law: "fuzzy".into(),
            model_path: PathBuf::from("../data/default_fis.json"),
            ..params_in(dir.path())
        };
        let mut ctrl = Controller::init(&params).unwrap();
        assert_eq!(ctrl.law_name(), "fuzzy");

        let out = ctrl.tick(angular(0.0, 0.0, 0.0)).unwrap();
        assert!(out.steer_control.abs() < 1e-12);
        assert_eq!(out.speed_control, params.fallback_speed);

        // Target well to the right, steer right
        assert!(ctrl.tick(angular(-90.0, 0.0, 0.0)).unwrap().steer_control > 1.0);

        ctrl.close().unwrap();
        let text = fs::read_to_string(&params.telemetry_path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_from_params_file() {
        let dir = tempfile::tempdir().unwrap();
        let params_path = dir.path().join("steer_ctrl.toml");
        fs::write(&params_path, "k_p = 1.0\nk_d = 0.0\ntelemetry_enabled = false\n").unwrap();

        let mut ctrl = Controller::from_params_file(&params_path).unwrap();
        assert_eq!(ctrl.tick(angular(2.0, 5.0, 0.0)).unwrap().steer_control, -2.0);

        assert!(matches!(
            Controller::from_params_file(dir.path().join("missing.toml")),
            Err(SteerCtrlError::ParamLoadError(_))
        ));
    }
}
