//! Random forest classifier

use super::tree::DecisionTree;
use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged classification trees with per-split feature sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Features sampled at each split
    pub mtry: usize,
    /// Number of trees
    pub n_trees: usize,
    /// Minimum node size to attempt a split
    pub min_n: usize,
    /// Base seed; tree `i` uses `seed + i`
    pub seed: u64,
    n_features: usize,
    pub is_fitted: bool,
}

impl RandomForest {
    pub fn new(mtry: usize, n_trees: usize, min_n: usize, seed: u64) -> Self {
        Self {
            trees: Vec::new(),
            mtry,
            n_trees,
            min_n,
            seed,
            n_features: 0,
            is_fitted: false,
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        if self.mtry == 0 || self.mtry > n_features {
            return Err(KolosalError::invalid_parameter(
                "mtry",
                self.mtry,
                format!("must lie in [1, {}]", n_features),
            ));
        }
        if self.n_trees == 0 {
            return Err(KolosalError::invalid_parameter(
                "trees",
                self.n_trees,
                "must be positive",
            ));
        }
        if self.min_n < 2 {
            return Err(KolosalError::invalid_parameter(
                "min_n",
                self.min_n,
                "must be at least 2",
            ));
        }
        Ok(())
    }

    /// Fit on a 0/1 outcome
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(KolosalError::SchemaMismatch(format!(
                "{} rows but {} outcome values",
                n_samples,
                y.len()
            )));
        }
        if n_features == 0 {
            return Err(KolosalError::TrainingError("no predictors".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(KolosalError::TrainingError(
                "predictors contain missing or non-finite values".to_string(),
            ));
        }
        self.validate(n_features)?;
        let positives = y.iter().filter(|&&v| v > 0.5).count();
        if positives == 0 || positives == n_samples {
            return Err(KolosalError::TrainingError(
                "outcome has a single class".to_string(),
            ));
        }

        let y_slice: Vec<f64> = y.to_vec();
        let (base_seed, mtry, min_n) = (self.seed, self.mtry, self.min_n);

        self.trees = (0..self.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                let mut tree = DecisionTree::new(mtry, min_n);
                tree.fit(x, &y_slice, &bootstrap, &mut rng);
                tree
            })
            .collect();

        self.n_features = n_features;
        self.is_fitted = true;
        Ok(self)
    }

    /// Mean of leaf positive-class proportions across trees
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(KolosalError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(KolosalError::SchemaMismatch(format!(
                "expected {} predictors, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        super::check_finite_rows(x)?;
        let n_trees = self.trees.len() as f64;
        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>() / n_trees
        })))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
