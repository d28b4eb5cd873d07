//! Search space and grid definitions for hyperparameters

use crate::error::{HarnessError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float { low: f64, high: f64, log_scale: bool },
    /// Integer parameter
    Int { low: i64, high: i64, log_scale: bool },
    /// Categorical parameter
    Categorical { choices: Vec<String> },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float { low, high, log_scale: false },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float { low, high, log_scale: true },
        }
    }

    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high, log_scale: false },
        }
    }

    /// Create a log-scale integer parameter
    pub fn log_int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high, log_scale: true },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(String::from).collect(),
            },
        }
    }

    /// Check bounds and choices
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| HarnessError::InvalidParameter {
            name: self.name.clone(),
            value: format!("{:?}", self.param_type),
            reason: reason.to_string(),
        };

        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(invalid("bounds must be finite with low <= high"));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(invalid("log-scale bounds must be positive"));
                }
            }
            ParameterType::Int { low, high, log_scale } => {
                if low > high {
                    return Err(invalid("low must not exceed high"));
                }
                if *log_scale && *low <= 0 {
                    return Err(invalid("log-scale bounds must be positive"));
                }
            }
            ParameterType::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("at least one choice is required"));
                }
            }
        }
        Ok(())
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let (log_low, log_high) = (low.ln(), high.ln());
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    ((rng.gen::<f64>() * (log_high - log_low) + log_low).exp().floor() as i64)
                        .clamp(*low, *high)
                } else {
                    rng.gen_range(*low..=*high)
                };
                ParameterValue::Int(val)
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
        }
    }
}

/// Concrete hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    String(String),
    Bool(bool),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

/// One hyperparameter configuration. Ordered so rendering and iteration
/// are deterministic.
pub type ParamSet = BTreeMap<String, ParameterValue>;

/// Render a configuration as `{a=1, b=0.5}`
pub fn format_params(params: &ParamSet) -> String {
    let body = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

/// Search space for sequential hyperparameter optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the search space
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    pub fn log_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::log_int(name, low, high))
    }

    pub fn categorical(self, name: impl Into<String>, choices: Vec<&str>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> ParamSet {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Check every parameter and reject duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for p in &self.parameters {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(HarnessError::ConfigError(format!(
                    "parameter '{}' is declared twice in the search space",
                    p.name
                )));
            }
        }
        Ok(())
    }
}

/// Finite hyperparameter grid.
///
/// Enumeration is the cartesian product of the declared value lists with the
/// first-declared name varying slowest. An empty grid enumerates exactly one
/// empty configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    entries: Vec<(String, Vec<ParameterValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named list of candidate values
    pub fn add<V: Into<ParameterValue>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        self.entries
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of configurations enumerated
    pub fn n_points(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).product()
    }

    /// Reject empty value lists and duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for (name, values) in &self.entries {
            if values.is_empty() {
                return Err(HarnessError::ConfigError(format!(
                    "grid entry '{}' has no candidate values",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(HarnessError::ConfigError(format!(
                    "grid entry '{}' is declared twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Enumerate every configuration in order
    pub fn points(&self) -> Vec<ParamSet> {
        let mut points = vec![ParamSet::new()];
        for (name, values) in &self.entries {
            points = points
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |v| {
                        let mut p = base.clone();
                        p.insert(name.clone(), v.clone());
                        p
                    })
                })
                .collect();
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_sample_within_bounds() {
        let space = SearchSpace::new()
            .float("x", -1.0, 1.0)
            .log_float("lr", 1e-3, 1e-1)
            .int("n", 2, 8)
            .categorical("kind", vec!["a", "b"]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);

        for _ in 0..200 {
            let p = space.sample(&mut rng);
            let x = p["x"].as_float().unwrap();
            let lr = p["lr"].as_float().unwrap();
            let n = p["n"].as_int().unwrap();
            assert!((-1.0..=1.0).contains(&x));
            assert!((1e-3..=1e-1).contains(&lr));
            assert!((2..=8).contains(&n));
            assert!(matches!(p["kind"].as_string(), Some("a") | Some("b")));
        }
    }

    #[test]
    fn test_grid_order() {
        let grid = ParamGrid::new()
            .add("a", vec![1i64, 2])
            .add("b", vec![10.0, 20.0, 30.0]);
        let points = grid.points();
        assert_eq!(points.len(), 6);
        assert_eq!(grid.n_points(), 6);
        assert_eq!(points[0]["a"], ParameterValue::Int(1));
        assert_eq!(points[0]["b"], ParameterValue::Float(10.0));
        assert_eq!(points[1]["b"], ParameterValue::Float(20.0));
        assert_eq!(points[3]["a"], ParameterValue::Int(2));
    }

    #[test]
    fn test_empty_grid_has_one_point() {
        let grid = ParamGrid::new();
        assert_eq!(grid.points(), vec![ParamSet::new()]);
        assert_eq!(grid.n_points(), 1);
    }

    #[test]
    fn test_grid_validation() {
        let empty: Vec<f64> = Vec::new();
        assert!(ParamGrid::new().add("a", empty).validate().is_err());
        assert!(ParamGrid::new()
            .add("a", vec![1.0])
            .add("a", vec![2.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_invalid_log_bounds() {
        let space = SearchSpace::new().log_float("lr", 0.0, 1.0);
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_format_params() {
        let mut p = ParamSet::new();
        p.insert("b".into(), ParameterValue::Float(0.5));
        p.insert("a".into(), ParameterValue::Int(3));
        assert_eq!(format_params(&p), "{a=3, b=0.5}");
        assert_eq!(format_params(&ParamSet::new()), "{}");
    }
}
