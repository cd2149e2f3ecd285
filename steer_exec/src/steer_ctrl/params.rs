//! Steering control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::PathBuf;
use serde::Deserialize;

// Internal
use super::{ChannelLayout, Feature};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default proportional and derivative gain of the PD law.
pub const DEFAULT_GAIN: f64 = 0.025;

/// Default constant speed command.
pub const DEFAULT_SPEED: f64 = 60.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for steering control.
///
/// Every field is optional in the parameter file and falls back to the value
/// given by `Params::default()`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Name of the control law to use, as registered in the law registry.
    pub law: String,

    /// PD law proportional gain
    pub k_p: f64,

    /// PD law derivative gain
    pub k_d: f64,

    /// Constant speed command, used by the PD law and by the learned law when
    /// `speed_source` is `constant`.
    pub fallback_speed: f64,

    /// Number of error channels the host supplies each tick.
    pub channels: ChannelLayout,

    /// If false no telemetry is recorded.
    pub telemetry_enabled: bool,

    /// Path to write the telemetry file to when the controller is closed.
    pub telemetry_path: PathBuf,

    /// Path to the steering model of the learned law.
    pub model_path: PathBuf,

    /// Ordered list of the features fed to the learned law's models.
    ///
    /// A trained model's weights depend on this order, so it must match the
    /// order the model was trained with.
    pub features: Vec<Feature>,

    /// Where the learned law takes its speed command from.
    pub speed_source: SpeedSourceParams
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Source of the learned law's speed command.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpeedSourceParams {
    /// Use `fallback_speed`.
    Constant,

    /// Use the steering model's second output.
    SecondOutput,

    /// Use the first output of a second model, fed the same features.
    SeparateModel {
        model_path: PathBuf
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            law: String::from("pd"),
            k_p: DEFAULT_GAIN,
            k_d: DEFAULT_GAIN,
            fallback_speed: DEFAULT_SPEED,
            channels: ChannelLayout::Single,
            telemetry_enabled: true,
            telemetry_path: PathBuf::from("data.csv"),
            model_path: PathBuf::from("data/default_net.json"),
            features: vec![
                Feature::AngularError,
                Feature::AngularDeltaError,
                Feature::AngularDeltaError2
            ],
            speed_source: SpeedSourceParams::Constant
        }
    }
}

impl Default for SpeedSourceParams {
    fn default() -> Self {
        SpeedSourceParams::Constant
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
