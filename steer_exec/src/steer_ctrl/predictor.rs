//! Regression model interface used by the learned control law
//!
//! A [`Predictor`] maps a fixed size feature vector onto a fixed size output
//! vector. Models are loaded once before the control loop starts and are never
//! reloaded mid-run.
//!
//! [`NetworkPredictor`] is the bundled implementation, a feed-forward network
//! of dense layers read from a JSON file of the form:
//!
//! ```json
//! {
//!     "layers": [
//!         { "weights": [[0.1, 0.2, 0.0], [0.3, 0.4, 0.0]], "bias": [0.0, 0.0], "activation": "tanh" },
//!         { "weights": [[-1.0, 0.5]], "bias": [0.0] }
//!     ]
//! }
//! ```
//!
//! `weights` has one row per layer output and one column per layer input.
//! `activation` is one of `identity` (default), `tanh` or `relu`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::fs::read_to_string;
use std::path::Path;
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trained regression model.
///
/// Predictions must be deterministic for a given model and input.
pub trait Predictor {
    /// Length of the feature vector the model expects.
    fn num_inputs(&self) -> usize;

    /// Length of the output vector the model produces.
    fn num_outputs(&self) -> usize;

    /// Evaluate the model.
    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, PredictError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A feed-forward network of dense layers.
#[derive(Debug, Clone)]
pub struct NetworkPredictor {
    layers: Vec<Layer>
}

/// A dense layer computing `activation(weights * x + bias)`.
#[derive(Debug, Clone)]
pub struct Layer {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    activation: Activation
}

/// On-disk form of a network.
#[derive(Deserialize)]
struct NetworkFile {
    layers: Vec<LayerFile>
}

#[derive(Deserialize)]
struct LayerFile {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    activation: Activation
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Element-wise layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Tanh,
    Relu
}

/// Errors raised while loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Cannot read the model file: {0}")]
    Io(std::io::Error),

    #[error("Cannot parse the model file: {0}")]
    Parse(serde_json::Error),

    #[error("The model has no layers")]
    NoLayers,

    #[error("Layer {layer} is malformed: {reason}")]
    BadLayer {
        layer: usize,
        reason: String
    },

    /// A fuzzy rule base failed validation.
    #[error("The rule base is not ready: {0}")]
    NotReady(String)
}

/// Errors raised while evaluating a model.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Expected {expected} features, found {found}")]
    InputWidth {
        expected: usize,
        found: usize
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NetworkPredictor {
    /// Load a network from a JSON model file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = read_to_string(path).map_err(ModelError::Io)?;
        Self::from_json(&json)
    }

    /// Parse a network from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let file: NetworkFile = serde_json::from_str(json).map_err(ModelError::Parse)?;

        let mut layers = Vec::with_capacity(file.layers.len());
        for (i, l) in file.layers.into_iter().enumerate() {
            let rows = l.weights.len();
            let cols = l.weights.first().map(|r| r.len()).unwrap_or(0);

            if rows == 0 || cols == 0 {
                return Err(ModelError::BadLayer {
                    layer: i,
                    reason: "empty weight matrix".into()
                });
            }
            if l.weights.iter().any(|r| r.len() != cols) {
                return Err(ModelError::BadLayer {
                    layer: i,
                    reason: "weight rows have different lengths".into()
                });
            }

            let flat: Vec<f64> = l.weights.into_iter().flatten().collect();
            layers.push(Layer::new(
                DMatrix::from_row_slice(rows, cols, &flat),
                DVector::from_vec(l.bias),
                l.activation
            ).map_err(|reason| ModelError::BadLayer { layer: i, reason })?);
        }

        Self::from_layers(layers)
    }

    /// Build a network from layers, checking that consecutive layers connect.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, ModelError> {
        if layers.is_empty() {
            return Err(ModelError::NoLayers);
        }

        for (i, pair) in layers.windows(2).enumerate() {
            if pair[1].num_inputs() != pair[0].num_outputs() {
                return Err(ModelError::BadLayer {
                    layer: i + 1,
                    reason: format!(
                        "takes {} inputs but the previous layer has {} outputs",
                        pair[1].num_inputs(),
                        pair[0].num_outputs()
                    )
                });
            }
        }

        Ok(Self { layers })
    }
}

impl Predictor for NetworkPredictor {
    fn num_inputs(&self) -> usize {
        self.layers[0].num_inputs()
    }

    fn num_outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].num_outputs()
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, PredictError> {
        if features.len() != self.num_inputs() {
            return Err(PredictError::InputWidth {
                expected: self.num_inputs(),
                found: features.len()
            });
        }

        let mut x = DVector::from_column_slice(features);
        for layer in &self.layers {
            x = layer.forward(&x);
        }

        Ok(x.iter().copied().collect())
    }
}

impl Layer {
    /// Create a new layer, the bias must have one entry per weight row.
    pub fn new(
        weights: DMatrix<f64>,
        bias: DVector<f64>,
        activation: Activation
    ) -> Result<Self, String> {
        if bias.len() != weights.nrows() {
            return Err(format!(
                "bias has {} entries for {} outputs",
                bias.len(),
                weights.nrows()
            ));
        }

        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err("contains non-finite values".into());
        }

        Ok(Self { weights, bias, activation })
    }

    pub fn num_inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn num_outputs(&self) -> usize {
        self.weights.nrows()
    }

    fn forward(&self, x: &DVector<f64>) -> DVector<f64> {
        let z = &self.weights * x + &self.bias;
        match self.activation {
            Activation::Identity => z,
            Activation::Tanh => z.map(f64::tanh),
            Activation::Relu => z.map(|v| v.max(0.0))
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Identity
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
