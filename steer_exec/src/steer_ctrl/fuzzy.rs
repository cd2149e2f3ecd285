//! Fuzzy inference systems
//!
//! A [`FuzzySystem`] is a zero-order Sugeno rule base: each input variable
//! has named membership functions, each output variable has named constant
//! terms, and each rule maps a conjunction of input terms to output terms.
//! Evaluation takes the minimum membership over a rule's conditions as its
//! firing strength and returns, per output, the firing-weighted average of the
//! terms the firing rules point at.
//!
//! Rule bases are loaded from JSON files of the form:
//!
//! ```json
//! {
//!     "inputs": [
//!         { "name": "error", "range": [-180, 180], "terms": [
//!             { "name": "left", "shape": { "kind": "trapezoid", "a": -180, "b": -180, "c": -30, "d": 0 } }
//!         ] }
//!     ],
//!     "outputs": [
//!         { "name": "steer", "terms": [ { "name": "hard_left", "value": -1.5 } ], "default": 0.0 }
//!     ],
//!     "rules": [
//!         { "if": { "error": "left" }, "then": { "steer": "hard_left" } }
//!     ]
//! }
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;
use serde::Deserialize;

// Internal
use super::{ModelError, PredictError, Predictor};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A validated fuzzy rule base, ready for evaluation.
#[derive(Debug, Clone)]
pub struct FuzzySystem {
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    rules: Vec<Rule>
}

#[derive(Debug, Clone, Deserialize)]
struct InputVariable {
    name: String,

    /// Inputs are clamped into this range before fuzzification.
    range: [f64; 2],

    terms: Vec<InputTerm>
}

#[derive(Debug, Clone, Deserialize)]
struct InputTerm {
    name: String,
    shape: Membership
}

#[derive(Debug, Clone, Deserialize)]
struct OutputVariable {
    name: String,

    terms: Vec<OutputTerm>,

    /// Value used when no rule fires. Without one the output is NaN.
    #[serde(default)]
    default: Option<f64>
}

#[derive(Debug, Clone, Deserialize)]
struct OutputTerm {
    name: String,
    value: f64
}

/// On-disk form of a rule, naming variables and terms.
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(rename = "if")]
    conditions: BTreeMap<String, String>,

    #[serde(rename = "then")]
    conclusions: BTreeMap<String, String>,

    #[serde(default = "default_weight")]
    weight: f64
}

#[derive(Deserialize)]
struct SystemFile {
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    rules: Vec<RuleFile>
}

/// A rule resolved to variable and term indices.
#[derive(Debug, Clone)]
struct Rule {
    /// `(input, term)` pairs
    conditions: Vec<(usize, usize)>,

    /// `(output, term value)` pairs
    conclusions: Vec<(usize, f64)>,

    weight: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Membership function of an input term.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Membership {
    /// Rises from `a` to a peak at `b`, falls to zero at `c`.
    Triangle { a: f64, b: f64, c: f64 },

    /// Rises from `a` to `b`, flat at one until `c`, falls to zero at `d`.
    Trapezoid { a: f64, b: f64, c: f64, d: f64 },

    Gaussian { mean: f64, sigma: f64 }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FuzzySystem {
    /// Load a rule base from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = read_to_string(path).map_err(ModelError::Io)?;
        Self::from_json(&json)
    }

    /// Parse and validate a rule base from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let file: SystemFile = serde_json::from_str(json).map_err(ModelError::Parse)?;

        if file.inputs.is_empty() || file.outputs.is_empty() {
            return Err(not_ready("the system needs at least one input and one output"));
        }
        if file.rules.is_empty() {
            return Err(not_ready("the system has no rules"));
        }

        for var in &file.inputs {
            let [min, max] = var.range;
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(not_ready(format!("input {} has an invalid range", var.name)));
            }
            check_terms(&var.name, var.terms.iter().map(|t| t.name.as_str()))?;
            for t in &var.terms {
                if !t.shape.is_valid() {
                    return Err(not_ready(format!(
                        "term {} of input {} has an invalid shape", t.name, var.name
                    )));
                }
            }
        }

        for var in &file.outputs {
            check_terms(&var.name, var.terms.iter().map(|t| t.name.as_str()))?;
            let values = var.terms.iter().map(|t| t.value).chain(var.default);
            if values.into_iter().any(|v| !v.is_finite()) {
                return Err(not_ready(format!("output {} has a non-finite value", var.name)));
            }
        }

        check_terms("the system", file.inputs.iter().map(|v| v.name.as_str()))?;
        check_terms("the system", file.outputs.iter().map(|v| v.name.as_str()))?;

        let mut rules = Vec::with_capacity(file.rules.len());
        for (i, r) in file.rules.into_iter().enumerate() {
            rules.push(resolve_rule(i, r, &file.inputs, &file.outputs)?);
        }

        Ok(Self {
            inputs: file.inputs,
            outputs: file.outputs,
            rules
        })
    }

    /// Names of the input variables, in evaluation order.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|v| v.name.as_str())
    }

    /// Names of the output variables, in evaluation order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|v| v.name.as_str())
    }
}

impl Predictor for FuzzySystem {
    fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, PredictError> {
        if features.len() != self.inputs.len() {
            return Err(PredictError::InputWidth {
                expected: self.inputs.len(),
                found: features.len()
            });
        }

        // Membership degree of every term of every input
        let degrees: Vec<Vec<f64>> = self.inputs
            .iter()
            .zip(features)
            .map(|(var, &x)| {
                let x = x.max(var.range[0]).min(var.range[1]);
                var.terms.iter().map(|t| t.shape.degree(x)).collect()
            })
            .collect();

        let mut num = vec![0.0; self.outputs.len()];
        let mut den = vec![0.0; self.outputs.len()];

        for rule in &self.rules {
            let strength = rule.weight * rule.conditions
                .iter()
                .map(|&(i, t)| degrees[i][t])
                .fold(1.0, f64::min);

            if strength > 0.0 {
                for &(o, value) in &rule.conclusions {
                    num[o] += strength * value;
                    den[o] += strength;
                }
            }
        }

        Ok(self.outputs
            .iter()
            .enumerate()
            .map(|(o, var)| {
                if den[o] > 0.0 {
                    num[o] / den[o]
                }
                else {
                    var.default.unwrap_or(std::f64::NAN)
                }
            })
            .collect())
    }
}

impl Membership {
    /// Degree of membership of `x`, in [0, 1].
    pub fn degree(&self, x: f64) -> f64 {
        match *self {
            Membership::Triangle { a, b, c } => {
                if x < a || x > c {
                    0.0
                }
                else if x < b {
                    (x - a) / (b - a)
                }
                else if x > b {
                    (c - x) / (c - b)
                }
                else {
                    1.0
                }
            },
            Membership::Trapezoid { a, b, c, d } => {
                if x < a || x > d {
                    0.0
                }
                else if x < b {
                    (x - a) / (b - a)
                }
                else if x <= c {
                    1.0
                }
                else {
                    (d - x) / (d - c)
                }
            },
            Membership::Gaussian { mean, sigma } => {
                (-(x - mean).powi(2) / (2.0 * sigma * sigma)).exp()
            }
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            Membership::Triangle { a, b, c } => {
                [a, b, c].iter().all(|v| v.is_finite()) && a <= b && b <= c
            },
            Membership::Trapezoid { a, b, c, d } => {
                [a, b, c, d].iter().all(|v| v.is_finite()) && a <= b && b <= c && c <= d
            },
            Membership::Gaussian { mean, sigma } => mean.is_finite() && sigma.is_finite() && sigma > 0.0
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn default_weight() -> f64 {
    1.0
}

fn not_ready<S: Into<String>>(reason: S) -> ModelError {
    ModelError::NotReady(reason.into())
}

/// Check a list of names is non-empty and has no duplicates.
fn check_terms<'a, I>(owner: &str, names: I) -> Result<(), ModelError>
where
    I: Iterator<Item = &'a str>
{
    let mut seen = Vec::new();
    for n in names {
        if seen.contains(&n) {
            return Err(not_ready(format!("{} defines {} twice", owner, n)));
        }
        seen.push(n);
    }

    if seen.is_empty() {
        return Err(not_ready(format!("{} has no terms", owner)));
    }

    Ok(())
}

fn resolve_rule(
    index: usize,
    rule: RuleFile,
    inputs: &[InputVariable],
    outputs: &[OutputVariable]
) -> Result<Rule, ModelError> {
    if rule.conditions.is_empty() || rule.conclusions.is_empty() {
        return Err(not_ready(format!("rule {} needs at least one condition and conclusion", index)));
    }
    if !(rule.weight.is_finite() && rule.weight >= 0.0 && rule.weight <= 1.0) {
        return Err(not_ready(format!("rule {} has a weight outside [0, 1]", index)));
    }

    let mut conditions = Vec::with_capacity(rule.conditions.len());
    for (var_name, term_name) in &rule.conditions {
        let i = inputs.iter().position(|v| &v.name == var_name).ok_or_else(|| {
            not_ready(format!("rule {} refers to unknown input {}", index, var_name))
        })?;
        let t = inputs[i].terms.iter().position(|t| &t.name == term_name).ok_or_else(|| {
            not_ready(format!("rule {} refers to unknown term {} of {}", index, term_name, var_name))
        })?;
        conditions.push((i, t));
    }

    let mut conclusions = Vec::with_capacity(rule.conclusions.len());
    for (var_name, term_name) in &rule.conclusions {
        let o = outputs.iter().position(|v| &v.name == var_name).ok_or_else(|| {
            not_ready(format!("rule {} refers to unknown output {}", index, var_name))
        })?;
        let term = outputs[o].terms.iter().find(|t| &t.name == term_name).ok_or_else(|| {
            not_ready(format!("rule {} refers to unknown term {} of {}", index, term_name, var_name))
        })?;
        conclusions.push((o, term.value));
    }

    Ok(Rule {
        conditions,
        conclusions,
        weight: rule.weight
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Single input, single output: steer against the error.
    const ONE_INPUT: &str = r#"{
        "inputs": [
            { "name": "error", "range": [-90, 90], "terms": [
                { "name": "left", "shape": { "kind": "trapezoid", "a": -90, "b": -90, "c": -45, "d": 0 } },
                { "name": "zero", "shape": { "kind": "triangle", "a": -45, "b": 0, "c": 45 } },
                { "name": "right", "shape": { "kind": "trapezoid", "a": 0, "b": 45, "c": 90, "d": 90 } }
            ] }
        ],
        "outputs": [
            { "name": "steer", "terms": [
                { "name": "left", "value": -1.0 },
                { "name": "straight", "value": 0.0 },
                { "name": "right", "value": 1.0 }
            ] }
        ],
        "rules": [
            { "if": { "error": "left" }, "then": { "steer": "right" } },
            { "if": { "error": "zero" }, "then": { "steer": "straight" } },
            { "if": { "error": "right" }, "then": { "steer": "left" } }
        ]
    }"#;

    #[test]
    fn test_membership_shapes() {
        let tri = Membership::Triangle { a: 0.0, b: 1.0, c: 3.0 };
        assert_eq!(tri.degree(-1.0), 0.0);
        assert_eq!(tri.degree(0.5), 0.5);
        assert_eq!(tri.degree(1.0), 1.0);
        assert_eq!(tri.degree(2.0), 0.5);
        assert_eq!(tri.degree(3.5), 0.0);

        // Left shoulder
        let trap = Membership::Trapezoid { a: 0.0, b: 0.0, c: 1.0, d: 2.0 };
        assert_eq!(trap.degree(0.0), 1.0);
        assert_eq!(trap.degree(1.5), 0.5);
        assert_eq!(trap.degree(-0.1), 0.0);

        let gauss = Membership::Gaussian { mean: 1.0, sigma: 2.0 };
        assert_eq!(gauss.degree(1.0), 1.0);
        assert!((gauss.degree(3.0) - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_average() {
        let fis = FuzzySystem::from_json(ONE_INPUT).unwrap();
        assert_eq!(fis.num_inputs(), 1);
        assert_eq!(fis.num_outputs(), 1);
        assert_eq!(fis.input_names().collect::<Vec<_>>(), vec!["error"]);

        assert_eq!(fis.predict(&[0.0]).unwrap(), vec![0.0]);

        // zero = 0.5, right = 0.5 -> (0.5 * 0 + 0.5 * -1) / 1
        assert_eq!(fis.predict(&[22.5]).unwrap(), vec![-0.5]);

        // Inputs beyond the range are clamped onto the shoulder
        assert_eq!(fis.predict(&[500.0]).unwrap(), vec![-1.0]);
        assert_eq!(fis.predict(&[-500.0]).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_no_rule_fires() {
        let json = ONE_INPUT.replace(
            r#"{ "if": { "error": "zero" }, "then": { "steer": "straight" } },"#,
            ""
        );
        let fis = FuzzySystem::from_json(&json).unwrap();
        assert!(fis.predict(&[0.0]).unwrap()[0].is_nan());

        let json = json.replace(
            r#""name": "steer", "terms""#,
            r#""name": "steer", "default": 0.25, "terms""#
        );
        let fis = FuzzySystem::from_json(&json).unwrap();
        assert_eq!(fis.predict(&[0.0]).unwrap(), vec![0.25]);
    }

    #[test]
    fn test_input_width() {
        let fis = FuzzySystem::from_json(ONE_INPUT).unwrap();
        assert!(matches!(
            fis.predict(&[1.0, 2.0]),
            Err(PredictError::InputWidth { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_not_ready() {
        let cases = vec![
            ONE_INPUT.replace(r#""then": { "steer": "left" }"#, r#""then": { "steer": "sideways" }"#),
            ONE_INPUT.replace(r#""if": { "error": "left" }"#, r#""if": { "heading": "left" }"#),
            ONE_INPUT.replace(r#""a": -45, "b": 0, "c": 45"#, r#""a": 45, "b": 0, "c": -45"#),
            ONE_INPUT.replace(r#""range": [-90, 90]"#, r#""range": [90, -90]"#),
            ONE_INPUT.replace(r#""name": "straight""#, r#""name": "left""#),
            ONE_INPUT.replace(r#"{ "if": { "error": "left" }, "then": { "steer": "right" } }"#,
                r#"{ "if": { "error": "left" }, "then": { "steer": "right" }, "weight": 2.0 }"#)
        ];

        for json in cases {
            match FuzzySystem::from_json(&json) {
                Err(ModelError::NotReady(_)) => (),
                other => panic!("Expected a not ready error, got {:?}", other.map(|_| ()))
            }
        }

        assert!(matches!(FuzzySystem::from_json("{}"), Err(ModelError::Parse(_))));
    }
}
