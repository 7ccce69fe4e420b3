//! Feature-transform recipes
//!
//! A [`Recipe`] declares the outcome, per-field roles and an ordered list of
//! preprocessing [`Step`]s. `fit` learns every step's parameters from the
//! training data and returns a trained copy; `apply` replays them on any
//! subset without recomputing statistics.

mod steps;

pub use steps::{Selector, Step, TrainedStep};

use crate::data::{Dataset, FieldType, Schema};
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Role a field plays in the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Predictor,
    Outcome,
    Identifier,
}

/// State learned by [`Recipe::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainedState {
    steps: Vec<TrainedStep>,
    /// Predictor fields (and types) seen at fit time
    inputs: Vec<(String, FieldType)>,
    /// Predictor fields after every step has run
    predictors: Vec<String>,
    identifiers: Vec<String>,
}

/// Ordered preprocessing declaration with per-field roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    outcome: String,
    roles: BTreeMap<String, Role>,
    steps: Vec<Step>,
    trained: Option<TrainedState>,
}

impl Recipe {
    /// Declare a recipe predicting `outcome` from every other field
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            roles: BTreeMap::new(),
            steps: Vec::new(),
            trained: None,
        }
    }

    /// Override the role of a field.
    ///
    /// Assigning `Role::Outcome` moves the outcome to `field`.
    pub fn update_role(mut self, field: impl Into<String>, role: Role) -> Self {
        let field = field.into();
        if role == Role::Outcome {
            self.roles.remove(&field);
            self.outcome = field;
        } else {
            self.roles.insert(field, role);
        }
        self.trained = None;
        self
    }

    /// Append a step; steps run in the order they are added
    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self.trained = None;
        self
    }

    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_fitted(&self) -> bool {
        self.trained.is_some()
    }

    /// Role of a field under this recipe
    pub fn role(&self, field: &str) -> Role {
        if field == self.outcome {
            return Role::Outcome;
        }
        self.roles.get(field).copied().unwrap_or(Role::Predictor)
    }

    /// Learn every step's parameters from `training` and return the trained
    /// recipe. Each step is fit on the output of the steps before it.
    pub fn fit(&self, training: &Dataset) -> Result<Recipe> {
        training.require(&self.outcome)?;
        for field in self.roles.keys() {
            training.require(field)?;
        }

        let schema = training.schema();
        let inputs: Vec<(String, FieldType)> = schema
            .fields()
            .iter()
            .filter(|(name, _)| self.role(name) == Role::Predictor)
            .cloned()
            .collect();
        let identifiers: Vec<String> = schema
            .names()
            .filter(|name| self.role(name) == Role::Identifier)
            .map(str::to_string)
            .collect();

        let input_names: Vec<&str> = inputs.iter().map(|(n, _)| n.as_str()).collect();
        let mut working = training.select(&input_names)?;
        let mut trained_steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let trained = step.fit(&working)?;
            working = trained.apply(&working)?;
            debug!(step = step.name(), predictors = working.n_cols(), "Fit recipe step");
            trained_steps.push(trained);
        }

        let mut fitted = self.clone();
        fitted.trained = Some(TrainedState {
            steps: trained_steps,
            inputs,
            predictors: working.column_names(),
            identifiers,
        });
        Ok(fitted)
    }

    /// Apply the frozen steps to `data`.
    ///
    /// The output holds the processed predictors, then any identifier
    /// fields present, then the outcome if present.
    pub fn apply(&self, data: &Dataset) -> Result<Dataset> {
        let state = self.trained.as_ref().ok_or(KolosalError::UnfitRecipe)?;

        for (name, field_type) in &state.inputs {
            let column = data.require(name)?;
            if column.field_type() != *field_type {
                return Err(KolosalError::SchemaMismatch(format!(
                    "column '{}' is {:?}, recipe was fit on {:?}",
                    name,
                    column.field_type(),
                    field_type
                )));
            }
        }

        let input_names: Vec<&str> = state.inputs.iter().map(|(n, _)| n.as_str()).collect();
        let mut working = data.select(&input_names)?;
        for step in &state.steps {
            working = step.apply(&working)?;
        }

        let passthrough = state
            .identifiers
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.outcome.as_str()));
        for name in passthrough {
            if let Some(column) = data.column(name) {
                working = working.with_column(column.clone())?;
            }
        }
        Ok(working)
    }

    /// Predictor names after preprocessing
    pub fn predictors(&self) -> Result<&[String]> {
        self.trained
            .as_ref()
            .map(|s| s.predictors.as_slice())
            .ok_or(KolosalError::UnfitRecipe)
    }

    /// Identifier fields seen at fit time
    pub fn identifiers(&self) -> Result<&[String]> {
        self.trained
            .as_ref()
            .map(|s| s.identifiers.as_slice())
            .ok_or(KolosalError::UnfitRecipe)
    }

    /// Learned parameters of each step, in declared order
    pub fn trained_steps(&self) -> Result<&[TrainedStep]> {
        self.trained
            .as_ref()
            .map(|s| s.steps.as_slice())
            .ok_or(KolosalError::UnfitRecipe)
    }

    /// Schema of the processed predictors
    pub fn predictor_schema(&self, processed: &Dataset) -> Result<Schema> {
        Ok(processed.select(self.predictors()?)?.schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn training() -> Dataset {
        Dataset::from_columns(vec![
            Column::categorical("player", vec!["a", "b", "c", "d", "e"]),
            Column::numeric("hits", vec![100.0, 200.0, 300.0, 400.0, 500.0]),
            Column::numeric("games", vec![10.0, 10.0, 10.0, 10.0, 10.0]),
            Column::categorical("inducted", vec!["N", "N", "Y", "N", "Y"]),
        ])
        .unwrap()
    }

    fn recipe() -> Recipe {
        Recipe::new("inducted")
            .update_role("player", Role::Identifier)
            .add_step(Step::ZeroVariance(Selector::AllPredictors))
            .add_step(Step::Normalize(Selector::AllNumericPredictors))
    }

    #[test]
    fn test_apply_before_fit() {
        let err = recipe().apply(&training()).unwrap_err();
        assert!(matches!(err, KolosalError::UnfitRecipe));
        assert!(recipe().predictors().is_err());
    }

    #[test]
    fn test_fit_does_not_mutate() {
        let declared = recipe();
        let fitted = declared.fit(&training()).unwrap();
        assert!(!declared.is_fitted());
        assert!(fitted.is_fitted());
        assert_eq!(fitted.predictors().unwrap(), &["hits".to_string()]);
    }

    #[test]
    fn test_output_order_and_passthrough() {
        let fitted = recipe().fit(&training()).unwrap();
        let out = fitted.apply(&training()).unwrap();
        assert_eq!(out.column_names(), vec!["hits", "player", "inducted"]);
        assert_eq!(out.keys("player").unwrap(), training().keys("player").unwrap());
    }

    #[test]
    fn test_outcome_optional_at_apply() {
        let fitted = recipe().fit(&training()).unwrap();
        let unlabeled = training().without(&["inducted"]);
        let out = fitted.apply(&unlabeled).unwrap();
        assert!(!out.has_column("inducted"));
        assert!(out.has_column("hits"));
    }

    #[test]
    fn test_apply_uses_frozen_statistics() {
        let fitted = recipe().fit(&training()).unwrap();
        let new = training().take(&[4]);
        let out = fitted.apply(&new).unwrap();
        // mean 300, sd 158.11
        let z = out.numeric("hits").unwrap()[0];
        assert!((z - 200.0 / 158.113_883_008_418_97).abs() < 1e-9);
    }

    #[test]
    fn test_schema_mismatch_on_type_change() {
        let fitted = recipe().fit(&training()).unwrap();
        let bad = training()
            .with_column(Column::categorical("hits", vec!["x"; 5]))
            .unwrap();
        assert!(matches!(
            fitted.apply(&bad),
            Err(KolosalError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_missing_outcome_at_fit() {
        let err = Recipe::new("missing").fit(&training()).unwrap_err();
        assert!(matches!(err, KolosalError::SchemaMismatch(_)));
    }
}
