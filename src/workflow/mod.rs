//! Workflows: a recipe and a model spec fit and predicted as one unit
//!
//! A [`Workflow`] still carries tunable placeholders. Materializing it with a
//! [`Candidate`] yields a [`ConcreteWorkflow`] whose fit produces an
//! immutable [`FitResult`].

use crate::data::{Column, Dataset, Schema};
use crate::error::{KolosalError, Result};
use crate::model::{ModelFamily, ModelSpec, ParameterSpace, TrainedModel};
use crate::recipe::Recipe;
use crate::tune::Candidate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// The two outcome levels, with the one treated as the event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLevels {
    pub negative: String,
    pub positive: String,
}

impl OutcomeLevels {
    /// Read the levels of `outcome` from `data`.
    ///
    /// Without an explicit `positive` level the last level in sorted order is
    /// the event (`Y` over `N`, `1` over `0`).
    pub fn from_data(data: &Dataset, outcome: &str, positive: Option<&str>) -> Result<Self> {
        let levels: BTreeSet<String> = data.keys(outcome)?.into_iter().collect();
        if levels.len() != 2 {
            return Err(KolosalError::DataError(format!(
                "outcome '{}' must have exactly 2 levels, found {}",
                outcome,
                levels.len()
            )));
        }
        let levels: Vec<String> = levels.into_iter().collect();
        match positive {
            None => Ok(Self {
                negative: levels[0].clone(),
                positive: levels[1].clone(),
            }),
            Some(p) => {
                let pos = levels.iter().position(|l| l == p).ok_or_else(|| {
                    KolosalError::DataError(format!(
                        "positive level '{}' not among outcome levels {:?}",
                        p, levels
                    ))
                })?;
                Ok(Self {
                    negative: levels[1 - pos].clone(),
                    positive: levels[pos].clone(),
                })
            }
        }
    }

    /// Encode labels as 0/1
    pub fn encode(&self, labels: &[String]) -> Result<Array1<f64>> {
        labels
            .iter()
            .map(|l| {
                if *l == self.positive {
                    Ok(1.0)
                } else if *l == self.negative {
                    Ok(0.0)
                } else {
                    Err(KolosalError::DataError(format!("unknown outcome level '{}'", l)))
                }
            })
            .collect()
    }

    pub fn label(&self, positive: bool) -> &str {
        if positive {
            &self.positive
        } else {
            &self.negative
        }
    }
}

/// A trained recipe with its baked training matrices
#[derive(Debug, Clone)]
pub struct PreparedData {
    recipe: Recipe,
    predictors: Schema,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl PreparedData {
    /// Fit `recipe` on `data` and bake it into a predictor matrix and 0/1
    /// outcome
    pub fn new(recipe: &Recipe, data: &Dataset, levels: &OutcomeLevels) -> Result<Self> {
        let trained = recipe.fit(data)?;
        let processed = trained.apply(data)?;
        let predictors = trained.predictor_schema(&processed)?;
        let x = processed.to_matrix(trained.predictors()?)?;
        let y = levels.encode(&processed.keys(trained.outcome())?)?;
        Ok(Self {
            recipe: trained,
            predictors,
            x,
            y,
        })
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn predictors(&self) -> &Schema {
        &self.predictors
    }
}

/// Apply a trained recipe and build the predictor matrix, checking the
/// post-recipe schema against `expected`
pub(crate) fn bake(recipe: &Recipe, data: &Dataset, expected: &Schema) -> Result<(Dataset, Array2<f64>)> {
    let processed = recipe.apply(data)?;
    let schema = recipe.predictor_schema(&processed)?;
    if &schema != expected {
        return Err(KolosalError::SchemaMismatch(format!(
            "predictors after preprocessing {:?} differ from fit time {:?}",
            schema.names().collect::<Vec<_>>(),
            expected.names().collect::<Vec<_>>()
        )));
    }
    let x = processed.to_matrix(recipe.predictors()?)?;
    Ok((processed, x))
}

/// Recipe plus model spec, possibly with tunable placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    recipe: Recipe,
    spec: ModelSpec,
    positive: Option<String>,
}

impl Workflow {
    pub fn bind(recipe: Recipe, spec: ModelSpec) -> Self {
        Self {
            recipe,
            spec,
            positive: None,
        }
    }

    /// Treat `level` of the outcome as the event
    pub fn with_positive_level(mut self, level: impl Into<String>) -> Self {
        self.positive = Some(level.into());
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn positive_level(&self) -> Option<&str> {
        self.positive.as_deref()
    }

    /// Outcome levels of `data` under this workflow
    pub fn levels(&self, data: &Dataset) -> Result<OutcomeLevels> {
        OutcomeLevels::from_data(data, self.recipe.outcome(), self.positive.as_deref())
    }

    /// The model's parameter space with predictor-dependent bounds resolved
    /// against the recipe's output on `data`
    pub fn finalize_parameters(&self, data: &Dataset) -> Result<ParameterSpace> {
        let space = self.spec.parameters();
        if !space.needs_finalize() {
            return Ok(space.clone());
        }
        let trained = self.recipe.fit(data)?;
        let n = trained.predictors()?.len();
        debug!(predictors = n, "Finalized parameter ranges");
        space.finalize(n)
    }

    /// Substitute every tunable placeholder with the candidate's value
    pub fn materialize(&self, candidate: &Candidate) -> Result<ConcreteWorkflow> {
        let params = self.spec.resolve(&candidate.values)?;
        Ok(ConcreteWorkflow {
            recipe: self.recipe.clone(),
            family: self.spec.family(),
            params,
            positive: self.positive.clone(),
            candidate_id: Some(candidate.id),
        })
    }

    /// Materialize a workflow that has no tunable parameters
    pub fn into_concrete(self) -> Result<ConcreteWorkflow> {
        let params = self.spec.resolve(&BTreeMap::new())?;
        Ok(ConcreteWorkflow {
            family: self.spec.family(),
            recipe: self.recipe,
            params,
            positive: self.positive,
            candidate_id: None,
        })
    }
}

/// A workflow with every parameter resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteWorkflow {
    recipe: Recipe,
    family: ModelFamily,
    params: BTreeMap<String, f64>,
    positive: Option<String>,
    candidate_id: Option<usize>,
}

impl ConcreteWorkflow {
    pub fn params(&self) -> &BTreeMap<String, f64> {
        &self.params
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn candidate_id(&self) -> Option<usize> {
        self.candidate_id
    }

    /// Train the engine on already prepared data
    pub fn fit_prepared(&self, prepared: &PreparedData) -> Result<TrainedModel> {
        self.family.fit(&self.params, prepared.x(), prepared.y())
    }

    /// Fit the recipe, bake the training data and train the engine
    pub fn fit(&self, training: &Dataset) -> Result<FitResult> {
        let levels =
            OutcomeLevels::from_data(training, self.recipe.outcome(), self.positive.as_deref())?;
        let prepared = PreparedData::new(&self.recipe, training, &levels)?;
        let model = self.fit_prepared(&prepared)?;
        debug!(
            family = %self.family,
            rows = training.n_rows(),
            predictors = prepared.predictors().len(),
            "Fit workflow"
        );
        Ok(FitResult {
            recipe: prepared.recipe,
            model,
            predictors: prepared.predictors,
            levels,
            params: self.params.clone(),
            threshold: 0.5,
        })
    }
}

/// Output of [`FitResult::predict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictMode {
    Class,
    Probability,
}

/// Predictions in input row order
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    Class(Vec<String>),
    /// Positive-class probabilities
    Probability(Vec<f64>),
}

/// A trained workflow, ready to predict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    recipe: Recipe,
    model: TrainedModel,
    predictors: Schema,
    levels: OutcomeLevels,
    params: BTreeMap<String, f64>,
    threshold: f64,
}

impl FitResult {
    /// Classification threshold on the positive-class probability
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    pub fn predictors(&self) -> &Schema {
        &self.predictors
    }

    pub fn levels(&self) -> &OutcomeLevels {
        &self.levels
    }

    pub fn params(&self) -> &BTreeMap<String, f64> {
        &self.params
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Positive-class probabilities for every row of `data`
    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f64>> {
        let (_, x) = bake(&self.recipe, data, &self.predictors)?;
        Ok(self.model.predict_proba(&x)?.to_vec())
    }

    pub fn predict(&self, data: &Dataset, mode: PredictMode) -> Result<Predictions> {
        let proba = self.predict_proba(data)?;
        Ok(match mode {
            PredictMode::Probability => Predictions::Probability(proba),
            PredictMode::Class => Predictions::Class(
                proba
                    .iter()
                    .map(|&p| self.levels.label(p >= self.threshold).to_string())
                    .collect(),
            ),
        })
    }

    /// `data` with `.pred_class` and `.pred_<positive>` columns appended
    pub fn augment(&self, data: &Dataset) -> Result<Dataset> {
        let proba = self.predict_proba(data)?;
        let classes: Vec<String> = proba
            .iter()
            .map(|&p| self.levels.label(p >= self.threshold).to_string())
            .collect();
        data.with_column(Column::categorical(".pred_class", classes))?
            .with_column(Column::numeric(format!(".pred_{}", self.levels.positive), proba))
    }

    /// Save as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load from JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
