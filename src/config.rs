//! Experiment configuration
//!
//! Everything a tuning run needs besides the data, loadable from JSON.
//! Missing fields take their defaults.

use crate::error::{KolosalError, Result};
use crate::metrics::{MetricKind, MetricSet, TieBreak};
use crate::model::{ModelFamily, ModelSpec, ParamSlot};
use crate::recipe::{Recipe, Role, Selector, Step};
use crate::tune::{GridStrategy, TuneConfig};
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Configuration of one split → tune → finalize run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Outcome column
    pub outcome: String,

    /// Columns kept for joining but never used as predictors
    pub identifiers: Vec<String>,

    /// Outcome level treated as the event; defaults to the last sorted level
    pub positive_level: Option<String>,

    /// Stratify the split and folds on this column
    pub strata: Option<String>,

    pub train_fraction: f64,
    pub seed: u64,
    pub folds: usize,
    pub repeats: usize,

    pub model: ModelFamily,

    /// Parameters to tune; empty means the family's usual set
    pub tune: Vec<String>,

    /// Fixed overrides of family defaults
    pub fixed: BTreeMap<String, f64>,

    pub grid: GridStrategy,
    pub metrics: Vec<MetricKind>,

    /// Metric used to select the final candidate
    pub select_by: MetricKind,
    pub tie_break: TieBreak,

    /// Pick the simplest candidate within one standard error instead of the best
    pub one_std_err: bool,

    pub parallelism: usize,
    pub threshold: f64,
    pub steps: Vec<Step>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            outcome: String::new(),
            identifiers: Vec::new(),
            positive_level: None,
            strata: None,
            train_fraction: 0.75,
            seed: 42,
            folds: 5,
            repeats: 1,
            model: ModelFamily::LogisticRegression,
            tune: Vec::new(),
            fixed: BTreeMap::new(),
            grid: GridStrategy::default(),
            metrics: vec![MetricKind::Accuracy, MetricKind::RocAuc],
            select_by: MetricKind::RocAuc,
            tie_break: TieBreak::default(),
            one_std_err: false,
            parallelism: 1,
            threshold: crate::metrics::DEFAULT_THRESHOLD,
            steps: vec![
                Step::Dummy(Selector::AllPredictors),
                Step::ZeroVariance(Selector::AllPredictors),
                Step::Normalize(Selector::AllNumericPredictors),
            ],
        }
    }
}

impl ExperimentConfig {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, name: impl Into<String>) -> Self {
        self.identifiers.push(name.into());
        self
    }

    pub fn with_strata(mut self, column: impl Into<String>) -> Self {
        self.strata = Some(column.into());
        self
    }

    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_model(mut self, model: ModelFamily) -> Self {
        self.model = model;
        self
    }

    pub fn with_tuned(mut self, names: Vec<String>) -> Self {
        self.tune = names;
        self
    }

    pub fn with_grid(mut self, grid: GridStrategy) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Save as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.outcome.is_empty() {
            return Err(KolosalError::ConfigError("outcome column not set".to_string()));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(KolosalError::InvalidFraction(self.train_fraction));
        }
        if self.metrics.is_empty() {
            return Err(KolosalError::ConfigError("no metrics requested".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(KolosalError::invalid_parameter(
                "threshold",
                self.threshold,
                "must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Parameters tuned by default for a family
    pub fn default_tuned(family: ModelFamily) -> Vec<String> {
        let names: &[&str] = match family {
            ModelFamily::LogisticRegression => &["penalty"],
            ModelFamily::RandomForest => &["mtry", "min_n"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    pub fn recipe(&self) -> Recipe {
        let recipe = self
            .identifiers
            .iter()
            .fold(Recipe::new(self.outcome.clone()), |r, id| {
                r.update_role(id.clone(), Role::Identifier)
            });
        self.steps
            .iter()
            .cloned()
            .fold(recipe, |r, step| r.add_step(step))
    }

    pub fn model_spec(&self) -> Result<ModelSpec> {
        let mut spec = ModelSpec::new(self.model);
        for (name, value) in &self.fixed {
            spec = spec.set(name, ParamSlot::Fixed(*value))?;
        }
        let tuned = if self.tune.is_empty() {
            Self::default_tuned(self.model)
        } else {
            self.tune.clone()
        };
        for name in &tuned {
            spec = spec.set(name, ParamSlot::tune())?;
        }
        Ok(spec)
    }

    pub fn workflow(&self) -> Result<Workflow> {
        let workflow = Workflow::bind(self.recipe(), self.model_spec()?);
        Ok(match &self.positive_level {
            Some(level) => workflow.with_positive_level(level.clone()),
            None => workflow,
        })
    }

    pub fn tune_config(&self) -> TuneConfig {
        TuneConfig::new()
            .with_parallelism(self.parallelism)
            .with_threshold(self.threshold)
    }

    pub fn metric_set(&self) -> MetricSet {
        MetricSet::new(self.metrics.clone())
    }
}
