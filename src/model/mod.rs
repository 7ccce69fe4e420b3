//! Model specifications and engines
//!
//! A [`ModelSpec`] names a model family plus a [`ParameterSpace`]: every
//! argument is either fixed, tunable over a [`TuneRange`], or left to the
//! family default. Specs are stateless; fitting goes through
//! [`ModelFamily::fit`], which returns a [`TrainedModel`].

pub mod forest;
pub mod logistic;
pub mod tree;

pub use forest::RandomForest;
pub use logistic::LogisticRegression;

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    LogisticRegression,
    RandomForest,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::LogisticRegression => write!(f, "logistic_regression"),
            ModelFamily::RandomForest => write!(f, "random_forest"),
        }
    }
}

/// Space in which a tunable is gridded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    Identity,
    Log10,
}

impl Transform {
    /// Natural units → grid space
    pub fn forward(&self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Log10 => value.log10(),
        }
    }

    /// Grid space → natural units
    pub fn inverse(&self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Log10 => 10f64.powf(value),
        }
    }
}

/// Which end of a range gives the simpler model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Simplicity {
    /// e.g. a larger regularization penalty
    HigherIsSimpler,
    /// e.g. fewer features sampled per split
    LowerIsSimpler,
}

/// Upper bound of a tune range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Bound {
    Value(f64),
    /// Number of predictors after preprocessing
    Predictors,
}

/// Search range of a tunable parameter, bounds in natural units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneRange {
    pub lower: f64,
    pub upper: Bound,
    pub transform: Transform,
    pub integer: bool,
    pub simplicity: Simplicity,
}

impl TuneRange {
    pub fn new(lower: f64, upper: f64, simplicity: Simplicity) -> Self {
        Self {
            lower,
            upper: Bound::Value(upper),
            transform: Transform::Identity,
            integer: false,
            simplicity,
        }
    }

    /// Range gridded in log10 space
    pub fn log10(lower: f64, upper: f64, simplicity: Simplicity) -> Self {
        Self {
            transform: Transform::Log10,
            ..Self::new(lower, upper, simplicity)
        }
    }

    /// Integer range from `lower` up to the predictor count
    pub fn up_to_predictors(lower: f64, simplicity: Simplicity) -> Self {
        Self {
            upper: Bound::Predictors,
            integer: true,
            ..Self::new(lower, lower, simplicity)
        }
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    /// Upper bound in natural units, if resolved
    pub fn upper_value(&self) -> Option<f64> {
        match self.upper {
            Bound::Value(v) => Some(v),
            Bound::Predictors => None,
        }
    }

    /// Bounds in grid space; fails while the upper bound is unresolved
    pub fn transformed_bounds(&self, name: &str) -> Result<(f64, f64)> {
        let upper = self.upper_value().ok_or_else(|| {
            KolosalError::ConfigError(format!(
                "range of '{}' depends on the predictor count; finalize the parameter space first",
                name
            ))
        })?;
        Ok((self.transform.forward(self.lower), self.transform.forward(upper)))
    }

    /// Map a grid-space value back to natural units, rounding integers
    pub fn from_transformed(&self, value: f64) -> f64 {
        let natural = self.transform.inverse(value);
        if self.integer {
            natural.round()
        } else {
            natural
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let upper = self.upper_value().unwrap_or(f64::INFINITY);
        if !self.lower.is_finite() || upper.is_nan() || self.lower > upper {
            return Err(KolosalError::invalid_parameter(
                name,
                format!("[{}, {}]", self.lower, upper),
                "lower bound must not exceed upper bound",
            ));
        }
        if self.transform == Transform::Log10 && self.lower <= 0.0 {
            return Err(KolosalError::invalid_parameter(
                name,
                self.lower,
                "log10 ranges need a positive lower bound",
            ));
        }
        Ok(())
    }
}

/// How a caller sets a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamSlot {
    Fixed(f64),
    /// Tunable; `None` uses the family default range
    Tune(Option<TuneRange>),
}

impl ParamSlot {
    /// Tunable over the family default range
    pub fn tune() -> Self {
        ParamSlot::Tune(None)
    }

    /// Tunable over a caller-supplied range
    pub fn tune_in(range: TuneRange) -> Self {
        ParamSlot::Tune(Some(range))
    }
}

/// A resolved parameter entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamEntry {
    Fixed(f64),
    Tune(TuneRange),
    /// Family default computed from the training data at fit time
    Auto,
}

/// Ordered parameter name → entry mapping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    entries: Vec<(String, ParamEntry)>,
}

impl ParameterSpace {
    pub fn get(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn entries(&self) -> &[(String, ParamEntry)] {
        &self.entries
    }

    /// Tunable parameters in declaration order
    pub fn tunables(&self) -> impl Iterator<Item = (&str, &TuneRange)> {
        self.entries.iter().filter_map(|(n, e)| match e {
            ParamEntry::Tune(r) => Some((n.as_str(), r)),
            _ => None,
        })
    }

    pub fn tunable_names(&self) -> Vec<String> {
        self.tunables().map(|(n, _)| n.to_string()).collect()
    }

    pub fn is_tunable(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ParamEntry::Tune(_)))
    }

    /// Whether any tunable bound still depends on the predictor count
    pub fn needs_finalize(&self) -> bool {
        self.tunables().any(|(_, r)| r.upper == Bound::Predictors)
    }

    /// Resolve predictor-dependent bounds
    pub fn finalize(&self, n_predictors: usize) -> Result<ParameterSpace> {
        let entries = self
            .entries
            .iter()
            .map(|(name, entry)| {
                let entry = match entry {
                    ParamEntry::Tune(range) if range.upper == Bound::Predictors => {
                        let resolved = TuneRange {
                            upper: Bound::Value(n_predictors as f64),
                            ..*range
                        };
                        resolved.validate(name)?;
                        ParamEntry::Tune(resolved)
                    }
                    other => *other,
                };
                Ok((name.clone(), entry))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ParameterSpace { entries })
    }

    fn set(&mut self, name: &str, entry: ParamEntry) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = entry;
        } else {
            self.entries.push((name.to_string(), entry));
        }
    }
}

impl ModelFamily {
    /// Parameter names with their default entries, in declaration order
    fn defaults(&self) -> Vec<(&'static str, ParamEntry)> {
        match self {
            ModelFamily::LogisticRegression => vec![
                ("penalty", ParamEntry::Fixed(0.0)),
                ("mixture", ParamEntry::Fixed(0.0)),
                ("max_iter", ParamEntry::Fixed(1000.0)),
                ("tol", ParamEntry::Fixed(1e-6)),
            ],
            ModelFamily::RandomForest => vec![
                ("mtry", ParamEntry::Auto),
                ("trees", ParamEntry::Fixed(100.0)),
                ("min_n", ParamEntry::Fixed(2.0)),
                ("seed", ParamEntry::Fixed(42.0)),
            ],
        }
    }

    /// Default tune range of a parameter, if it has one
    pub fn default_range(&self, name: &str) -> Option<TuneRange> {
        use Simplicity::*;
        match (self, name) {
            (ModelFamily::LogisticRegression, "penalty") => {
                Some(TuneRange::log10(1e-10, 1.0, HigherIsSimpler))
            }
            (ModelFamily::LogisticRegression, "mixture") => {
                Some(TuneRange::new(0.0, 1.0, HigherIsSimpler))
            }
            (ModelFamily::RandomForest, "mtry") => {
                Some(TuneRange::up_to_predictors(1.0, LowerIsSimpler))
            }
            (ModelFamily::RandomForest, "trees") => {
                Some(TuneRange::new(1.0, 2000.0, LowerIsSimpler).integer())
            }
            (ModelFamily::RandomForest, "min_n") => {
                Some(TuneRange::new(2.0, 40.0, HigherIsSimpler).integer())
            }
            _ => None,
        }
    }

    /// Train an engine of this family with fully resolved parameters
    pub fn fit(
        &self,
        params: &BTreeMap<String, f64>,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<TrainedModel> {
        let get = |name: &str, default: f64| params.get(name).copied().unwrap_or(default);
        let count = |name: &str, default: f64| -> Result<usize> {
            let v = get(name, default).round();
            if !v.is_finite() || v < 0.0 {
                return Err(KolosalError::invalid_parameter(name, v, "must be a non-negative integer"));
            }
            Ok(v as usize)
        };

        match self {
            ModelFamily::LogisticRegression => {
                let mut model = LogisticRegression::new()
                    .with_penalty(get("penalty", 0.0))
                    .with_mixture(get("mixture", 0.0))
                    .with_max_iter(count("max_iter", 1000.0)?)
                    .with_tol(get("tol", 1e-6));
                model.fit(x, y)?;
                Ok(TrainedModel::Logistic(model))
            }
            ModelFamily::RandomForest => {
                let default_mtry = (x.ncols() as f64).sqrt().floor().max(1.0);
                let seed = get("seed", 42.0);
                if !seed.is_finite() || seed < 0.0 {
                    return Err(KolosalError::invalid_parameter("seed", seed, "must be a non-negative integer"));
                }
                let mut model = RandomForest::new(
                    count("mtry", default_mtry)?,
                    count("trees", 100.0)?,
                    count("min_n", 2.0)?,
                    seed as u64,
                );
                model.fit(x, y)?;
                Ok(TrainedModel::Forest(model))
            }
        }
    }
}

/// Model family, arguments and tunable placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    family: ModelFamily,
    space: ParameterSpace,
}

impl ModelSpec {
    pub fn new(family: ModelFamily) -> Self {
        let mut space = ParameterSpace::default();
        for (name, entry) in family.defaults() {
            space.set(name, entry);
        }
        Self { family, space }
    }

    /// Elastic-net logistic regression
    pub fn logistic_regression() -> Self {
        Self::new(ModelFamily::LogisticRegression)
    }

    /// Random forest classifier
    pub fn random_forest() -> Self {
        Self::new(ModelFamily::RandomForest)
    }

    /// Fix or mark a parameter tunable
    pub fn set(mut self, name: &str, slot: ParamSlot) -> Result<Self> {
        if self.space.get(name).is_none() {
            return Err(KolosalError::invalid_parameter(
                name,
                format!("{:?}", slot),
                format!("unknown parameter for {}", self.family),
            ));
        }
        let entry = match slot {
            ParamSlot::Fixed(v) => ParamEntry::Fixed(v),
            ParamSlot::Tune(Some(range)) => ParamEntry::Tune(range),
            ParamSlot::Tune(None) => {
                ParamEntry::Tune(self.family.default_range(name).ok_or_else(|| {
                    KolosalError::invalid_parameter(
                        name,
                        "tune()",
                        "no default range; supply one with ParamSlot::tune_in",
                    )
                })?)
            }
        };
        if let ParamEntry::Tune(range) = &entry {
            range.validate(name)?;
        }
        self.space.set(name, entry);
        Ok(self)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn parameters(&self) -> &ParameterSpace {
        &self.space
    }

    /// Fixed values merged with `tuned`; every tunable must be present
    pub fn resolve(&self, tuned: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
        let mut params = BTreeMap::new();
        for (name, entry) in self.space.entries() {
            match entry {
                ParamEntry::Fixed(v) => {
                    params.insert(name.clone(), *v);
                }
                ParamEntry::Tune(_) => {
                    let v = tuned
                        .get(name)
                        .ok_or_else(|| KolosalError::MissingParameter(name.clone()))?;
                    params.insert(name.clone(), *v);
                }
                ParamEntry::Auto => {
                    if let Some(v) = tuned.get(name) {
                        params.insert(name.clone(), *v);
                    }
                }
            }
        }
        Ok(params)
    }
}

/// Reject rows an engine cannot score; the index is of the first bad row
pub(crate) fn check_finite_rows(x: &Array2<f64>) -> Result<()> {
    match x
        .rows()
        .into_iter()
        .position(|row| row.iter().any(|v| !v.is_finite()))
    {
        Some(row) => Err(KolosalError::PredictionError(format!(
            "row {} has missing or non-finite predictors",
            row
        ))),
        None => Ok(()),
    }
}

/// A trained engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    Logistic(LogisticRegression),
    Forest(RandomForest),
}

impl TrainedModel {
    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::Logistic(m) => m.predict_proba(x),
            TrainedModel::Forest(m) => m.predict_proba(x),
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            TrainedModel::Logistic(_) => ModelFamily::LogisticRegression,
            TrainedModel::Forest(_) => ModelFamily::RandomForest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_unknown_parameter() {
        let err = ModelSpec::logistic_regression()
            .set("depth", ParamSlot::Fixed(3.0))
            .unwrap_err();
        assert!(matches!(err, KolosalError::InvalidParameter { .. }));
    }

    #[test]
    fn test_tune_default_range() {
        let spec = ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap();
        let (_, range) = spec.parameters().tunables().next().unwrap();
        assert_eq!(range.transform, Transform::Log10);
        assert_eq!(range.transformed_bounds("penalty").unwrap(), (-10.0, 0.0));
        assert_eq!(range.simplicity, Simplicity::HigherIsSimpler);
    }

    #[test]
    fn test_tune_without_default_range() {
        let err = ModelSpec::logistic_regression()
            .set("tol", ParamSlot::tune())
            .unwrap_err();
        assert!(matches!(err, KolosalError::InvalidParameter { .. }));
    }

    #[test]
    fn test_finalize_resolves_predictor_bound() {
        let spec = ModelSpec::random_forest()
            .set("mtry", ParamSlot::tune())
            .unwrap();
        assert!(spec.parameters().needs_finalize());
        let (_, range) = spec.parameters().tunables().next().unwrap();
        assert!(range.transformed_bounds("mtry").is_err());

        let space = spec.parameters().finalize(8).unwrap();
        assert!(!space.needs_finalize());
        let (_, range) = space.tunables().next().unwrap();
        assert_eq!(range.upper, Bound::Value(8.0));
    }

    #[test]
    fn test_resolve_missing_parameter() {
        let spec = ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap();
        let err = spec.resolve(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, KolosalError::MissingParameter(p) if p == "penalty"));

        let mut tuned = BTreeMap::new();
        tuned.insert("penalty".to_string(), 0.01);
        let params = spec.resolve(&tuned).unwrap();
        assert_eq!(params["penalty"], 0.01);
        assert_eq!(params["max_iter"], 1000.0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = ModelSpec::logistic_regression()
            .set(
                "mixture",
                ParamSlot::tune_in(TuneRange::new(1.0, 0.0, Simplicity::HigherIsSimpler)),
            )
            .unwrap_err();
        assert!(matches!(err, KolosalError::InvalidParameter { .. }));
    }
}
