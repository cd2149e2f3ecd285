//! Registry of named control law constructors
//!
//! The `law` parameter names the law to run. Hosts may register their own
//! laws alongside the built in `pd`, `learned` and `fuzzy` laws before
//! building the controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::BTreeMap;
use std::path::Path;
use log::debug;

// Internal
use super::{
    ControlLaw, FuzzyLaw, FuzzySystem, LearnedLaw, ModelError, NetworkPredictor, Params,
    PdLaw, Predictor, SpeedSource, SpeedSourceParams, SteerCtrlError
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Function building a control law from the parameters.
pub type LawBuilder = Box<dyn Fn(&Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError>>;

/// Named control law constructors.
pub struct LawRegistry {
    builders: BTreeMap<String, LawBuilder>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LawRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new()
        }
    }

    /// Register a builder under the given name, replacing any existing
    /// builder with that name.
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError> + 'static
    {
        self.builders.insert(name.to_string(), Box::new(builder));
    }

    /// Build the law named by `params.law`.
    pub fn build(&self, params: &Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError> {
        match self.builders.get(&params.law) {
            Some(b) => {
                debug!("Building control law \"{}\"", params.law);
                b(params)
            },
            None => Err(SteerCtrlError::UnknownLaw(params.law.clone()))
        }
    }

    /// Names of all registered laws, in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|k| k.as_str())
    }
}

impl Default for LawRegistry {
    /// A registry holding the `pd`, `learned` and `fuzzy` laws.
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register("pd", build_pd);
        reg.register("learned", build_learned);
        reg.register("fuzzy", build_fuzzy);
        reg
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn build_pd(params: &Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError> {
    Ok(Box::new(PdLaw::new(params.k_p, params.k_d, params.fallback_speed)))
}

fn build_learned(params: &Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError> {
    let steer_model = load_model(&params.model_path)?;

    let speed_source = match params.speed_source {
        SpeedSourceParams::Constant => SpeedSource::Constant(params.fallback_speed),
        SpeedSourceParams::SecondOutput => SpeedSource::SecondOutput,
        SpeedSourceParams::SeparateModel { ref model_path } => {
            SpeedSource::Model(load_model(model_path)?)
        }
    };

    Ok(Box::new(LearnedLaw::new(
        steer_model,
        params.features.clone(),
        speed_source,
        params.channels
    )?))
}

/// The fuzzy law reads its rule base from `model_path`.
fn build_fuzzy(params: &Params) -> Result<Box<dyn ControlLaw>, SteerCtrlError> {
    let system = with_path(&params.model_path, FuzzySystem::load(&params.model_path))?;

    debug!(
        "Fuzzy rule base inputs: {:?}, outputs: {:?}",
        system.input_names().collect::<Vec<_>>(),
        system.output_names().collect::<Vec<_>>()
    );

    Ok(Box::new(FuzzyLaw::new(Box::new(system), params.fallback_speed)?))
}

/// Load a network model, failing with `ModelLoadError` naming the path.
pub fn load_model(path: &Path) -> Result<Box<dyn Predictor>, SteerCtrlError> {
    let net = with_path(path, NetworkPredictor::load(path))?;
    Ok(Box::new(net))
}

fn with_path<T>(path: &Path, res: Result<T, ModelError>) -> Result<T, SteerCtrlError> {
    res.map_err(|e| SteerCtrlError::ModelLoadError {
        path: path.to_path_buf(),
        source: e
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
