//! # Steering control module
//!
//! Steering control turns the error measurements supplied by the host each
//! tick into a steering command and a speed command. Two error channels are
//! understood:
//!
//! - The angular channel, the difference between the bearing to the current
//!   target and the vehicle's heading. This channel is always present.
//! - The distance channel, the distance to the current target. This channel
//!   is only present in the dual channel layout and is used by richer laws.
//!
//! Each channel is described by an [`ErrorState`] holding the error, its first
//! and second differences and the previous control output on that channel.
//!
//! The mapping from errors to commands is a [`ControlLaw`]. The PD law is
//! always available and needs no trained artifact. The learned law delegates
//! to a [`Predictor`], typically a network trained offline from telemetry
//! recorded by a [`TelemetryRecorder`] while a PD law was driving. Laws are
//! registered by name in a [`LawRegistry`] and picked by the `law` parameter.
//! The fuzzy law evaluates a [`FuzzySystem`] rule base, choosing its inputs
//! from the number of input variables the rule base declares.
//!
//! The [`Controller`] facade is what the host calls every tick. It owns one
//! law and optionally one recorder, which buffers one row per tick in memory
//! and writes them all out once when the controller is closed.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod error_state;
pub mod fuzzy;
pub mod laws;
pub mod params;
pub mod predictor;
pub mod registry;
pub mod state;
pub mod telemetry;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::PathBuf;

// Internal
pub use error_state::*;
pub use fuzzy::*;
pub use laws::*;
pub use params::*;
pub use predictor::*;
pub use registry::*;
pub use state::*;
pub use telemetry::*;
use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during steering control.
#[derive(Debug, thiserror::Error)]
pub enum SteerCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    /// The model file for a learned law is missing or could not be loaded.
    #[error("Model unavailable at {path:?}: {source}")]
    ModelLoadError {
        path: PathBuf,
        #[source]
        source: ModelError
    },

    /// The host supplied a NaN or infinite error value.
    #[error("Received a non-finite value for {field}: {value}")]
    InvalidErrorInput {
        field: &'static str,
        value: f64
    },

    /// The final telemetry flush failed.
    #[error("Could not write telemetry to {path:?}: {source}")]
    TelemetryWriteError {
        path: PathBuf,
        #[source]
        source: ArchiveError
    },

    /// A sample was reported, or a tick requested, after the controller or
    /// its recorder was closed.
    #[error("The controller or its telemetry recorder has already been closed")]
    RecorderClosedError,

    #[error("No control law is registered under the name \"{0}\"")]
    UnknownLaw(String),

    #[error("Expected the {expected:?} channel layout, found {found:?}")]
    ChannelMismatch {
        expected: ChannelLayout,
        found: ChannelLayout
    },

    #[error("Feature {0:?} needs a channel which the {1:?} layout does not provide")]
    FeatureUnavailable(Feature, ChannelLayout),

    #[error("Predictor shape mismatch for the {what}: expected {expected}, found {found}")]
    PredictionShape {
        what: &'static str,
        expected: usize,
        found: usize
    },

    #[error("The control law produced a non-finite output (steer {steer}, speed {speed})")]
    NonFiniteOutput {
        steer: f64,
        speed: f64
    },

    #[error("The law needs the vehicle speed but the host did not supply it")]
    VehicleSpeedUnavailable,

    #[error("Prediction failed: {0}")]
    PredictError(PredictError)
}
