//! # Control laws
//!
//! This module provides the laws mapping a tick's error inputs onto steering
//! and speed commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::{
    Channel, ChannelLayout, ControlOutput, ErrorInputs, Predictor, SteerCtrlError
};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A law mapping error inputs to commands.
pub trait ControlLaw {
    /// Short name of the law, used in logs.
    fn name(&self) -> &str;

    /// Steering command for the given inputs. Negative means left.
    fn steer_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError>;

    /// Speed command for the given inputs. Negative means braking.
    fn speed_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError>;

    /// Both commands for the given inputs.
    ///
    /// Steering is always evaluated before speed.
    fn controls(&self, inputs: &ErrorInputs) -> Result<ControlOutput, SteerCtrlError> {
        let steer_control = self.steer_control(inputs)?;
        let speed_control = self.speed_control(inputs)?;

        Ok(ControlOutput {
            steer_control,
            speed_control
        })
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Proportional-derivative steering on the angular channel with a constant
/// speed command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PdLaw {
    /// Proportional gain
    k_p: f64,

    /// Derivative gain
    k_d: f64,

    /// Constant speed command
    speed: f64
}

/// A law delegating to trained models.
pub struct LearnedLaw {
    steer_model: Box<dyn Predictor>,
    features: Vec<Feature>,
    speed_source: SpeedSource
}

/// A law driven by a fuzzy inference system.
///
/// The system's input count picks the inputs fed to it:
///
/// - 1 input: the angular error, a P controller
/// - 2 inputs: the angular error and its first difference, a PD controller
/// - 3 inputs: as above plus the vehicle speed in km/h
///
/// The first output is the steering command. If the system has a second
/// output it is the speed command, otherwise the constant fallback speed is
/// used.
pub struct FuzzyLaw {
    system: Box<dyn Predictor>,
    fallback_speed: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single term of an error channel which can be fed to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AngularError,
    AngularDeltaError,
    AngularDeltaError2,
    AngularPrevControl,
    DistanceError,
    DistanceDeltaError,
    DistanceDeltaError2,
    DistancePrevControl
}

/// Where a learned law takes its speed command from.
pub enum SpeedSource {
    /// A constant speed.
    Constant(f64),

    /// The steering model's second output.
    SecondOutput,

    /// The first output of a separate model fed the same features.
    Model(Box<dyn Predictor>)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PdLaw {
    pub fn new(k_p: f64, k_d: f64, speed: f64) -> Self {
        Self { k_p, k_d, speed }
    }
}

impl ControlLaw for PdLaw {
    fn name(&self) -> &str {
        "pd"
    }

    fn steer_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        let a = &inputs.angular;
        Ok(-(a.error() * self.k_p + a.delta_error() * self.k_d))
    }

    fn speed_control(&self, _inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        Ok(self.speed)
    }
}

impl Feature {
    /// The channel this feature is taken from.
    pub fn channel(&self) -> Channel {
        match self {
            Feature::AngularError
            | Feature::AngularDeltaError
            | Feature::AngularDeltaError2
            | Feature::AngularPrevControl => Channel::Angular,
            Feature::DistanceError
            | Feature::DistanceDeltaError
            | Feature::DistanceDeltaError2
            | Feature::DistancePrevControl => Channel::Distance
        }
    }

    /// Read the feature from the inputs, or `None` if its channel is absent.
    pub fn extract(&self, inputs: &ErrorInputs) -> Option<f64> {
        let s = inputs.channel(self.channel())?;
        Some(match self {
            Feature::AngularError | Feature::DistanceError => s.error(),
            Feature::AngularDeltaError | Feature::DistanceDeltaError => s.delta_error(),
            Feature::AngularDeltaError2 | Feature::DistanceDeltaError2 => s.delta_error2(),
            Feature::AngularPrevControl | Feature::DistancePrevControl => s.prev_control()
        })
    }
}

impl LearnedLaw {
    /// Create a new learned law.
    ///
    /// The features must all be available in `layout`, and each model must
    /// take exactly as many inputs as there are features. A `SecondOutput`
    /// speed source needs a steering model with at least two outputs.
    pub fn new(
        steer_model: Box<dyn Predictor>,
        features: Vec<Feature>,
        speed_source: SpeedSource,
        layout: ChannelLayout
    ) -> Result<Self, SteerCtrlError> {
        if let Some(f) = features.iter().find(|f| !layout.has_channel(f.channel())) {
            return Err(SteerCtrlError::FeatureUnavailable(*f, layout));
        }

        check_shape("steering model inputs", features.len(), steer_model.num_inputs())?;
        if steer_model.num_outputs() < 1 {
            return Err(SteerCtrlError::PredictionShape {
                what: "steering model outputs",
                expected: 1,
                found: 0
            });
        }

        match speed_source {
            SpeedSource::SecondOutput if steer_model.num_outputs() < 2 => {
                return Err(SteerCtrlError::PredictionShape {
                    what: "steering model outputs",
                    expected: 2,
                    found: steer_model.num_outputs()
                });
            },
            SpeedSource::Model(ref m) => {
                check_shape("speed model inputs", features.len(), m.num_inputs())?;
            },
            _ => ()
        }

        Ok(Self {
            steer_model,
            features,
            speed_source
        })
    }

    /// The ordered features fed to the models.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Build the feature vector for the given inputs.
    fn feature_vector(&self, inputs: &ErrorInputs) -> Result<Vec<f64>, SteerCtrlError> {
        self.features
            .iter()
            .map(|f| f.extract(inputs)
                .ok_or(SteerCtrlError::FeatureUnavailable(*f, inputs.layout())))
            .collect()
    }

    /// Evaluate the steering model.
    fn predict_steer(&self, features: &[f64]) -> Result<Vec<f64>, SteerCtrlError> {
        let out = self.steer_model
            .predict(features)
            .map_err(SteerCtrlError::PredictError)?;

        let needed = match self.speed_source {
            SpeedSource::SecondOutput => 2,
            _ => 1
        };
        if out.len() < needed {
            return Err(SteerCtrlError::PredictionShape {
                what: "steering model outputs",
                expected: needed,
                found: out.len()
            });
        }

        Ok(out)
    }

    /// Speed command given the features and the steering model's outputs.
    fn speed_from(&self, features: &[f64], steer_out: &[f64]) -> Result<f64, SteerCtrlError> {
        match self.speed_source {
            SpeedSource::Constant(s) => Ok(s),
            SpeedSource::SecondOutput => Ok(steer_out[1]),
            SpeedSource::Model(ref m) => {
                let out = m.predict(features).map_err(SteerCtrlError::PredictError)?;
                out.first().copied().ok_or(SteerCtrlError::PredictionShape {
                    what: "speed model outputs",
                    expected: 1,
                    found: 0
                })
            }
        }
    }
}

impl ControlLaw for LearnedLaw {
    fn name(&self) -> &str {
        "learned"
    }

    fn steer_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        let features = self.feature_vector(inputs)?;
        Ok(self.predict_steer(&features)?[0])
    }

    fn speed_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        match self.speed_source {
            SpeedSource::Constant(s) => Ok(s),
            _ => {
                let features = self.feature_vector(inputs)?;
                let steer_out = match self.speed_source {
                    SpeedSource::SecondOutput => self.predict_steer(&features)?,
                    _ => Vec::new()
                };
                self.speed_from(&features, &steer_out)
            }
        }
    }

    /// Evaluates the steering model once for both commands.
    fn controls(&self, inputs: &ErrorInputs) -> Result<ControlOutput, SteerCtrlError> {
        let features = self.feature_vector(inputs)?;
        let steer_out = self.predict_steer(&features)?;

        Ok(ControlOutput {
            steer_control: steer_out[0],
            speed_control: self.speed_from(&features, &steer_out)?
        })
    }
}

impl FuzzyLaw {
    /// Create a new fuzzy law, the system must have 1 to 3 inputs and at
    /// least one output.
    pub fn new(system: Box<dyn Predictor>, fallback_speed: f64) -> Result<Self, SteerCtrlError> {
        let num_inputs = system.num_inputs();
        if num_inputs < 1 || num_inputs > 3 {
            return Err(SteerCtrlError::PredictionShape {
                what: "fuzzy system inputs",
                expected: num_inputs.max(1).min(3),
                found: num_inputs
            });
        }
        if system.num_outputs() < 1 {
            return Err(SteerCtrlError::PredictionShape {
                what: "fuzzy system outputs",
                expected: 1,
                found: 0
            });
        }

        Ok(Self {
            system,
            fallback_speed
        })
    }

    /// True if the speed command comes from the system's second output.
    pub fn has_speed_output(&self) -> bool {
        self.system.num_outputs() >= 2
    }

    fn system_inputs(&self, inputs: &ErrorInputs) -> Result<Vec<f64>, SteerCtrlError> {
        let a = &inputs.angular;
        Ok(match self.system.num_inputs() {
            1 => vec![a.error()],
            2 => vec![a.error(), a.delta_error()],
            _ => vec![
                a.error(),
                a.delta_error(),
                inputs.vehicle_speed_kmh.ok_or(SteerCtrlError::VehicleSpeedUnavailable)?
            ]
        })
    }

    fn evaluate(&self, inputs: &ErrorInputs) -> Result<Vec<f64>, SteerCtrlError> {
        let x = self.system_inputs(inputs)?;
        self.system.predict(&x).map_err(SteerCtrlError::PredictError)
    }
}

impl ControlLaw for FuzzyLaw {
    fn name(&self) -> &str {
        "fuzzy"
    }

    fn steer_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        Ok(self.evaluate(inputs)?[0])
    }

    fn speed_control(&self, inputs: &ErrorInputs) -> Result<f64, SteerCtrlError> {
        if self.has_speed_output() {
            Ok(self.evaluate(inputs)?[1])
        }
        else {
            Ok(self.fallback_speed)
        }
    }

    /// Evaluates the system once for both commands.
    fn controls(&self, inputs: &ErrorInputs) -> Result<ControlOutput, SteerCtrlError> {
        let out = self.evaluate(inputs)?;

        Ok(ControlOutput {
            steer_control: out[0],
            speed_control: if self.has_speed_output() { out[1] } else { self.fallback_speed }
        })
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_shape(what: &'static str, expected: usize, found: usize) -> Result<(), SteerCtrlError> {
    if expected == found {
        Ok(())
    }
    else {
        Err(SteerCtrlError::PredictionShape { what, expected, found })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
