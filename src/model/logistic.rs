//! Penalized logistic regression
//!
//! Minimizes mean log-loss plus the elastic-net penalty
//! `penalty * ((1 - mixture) / 2 * ||w||² + mixture * ||w||₁)` with
//! accelerated proximal gradient descent. The intercept is not penalized.

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Elastic-net logistic regression for a 0/1 outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Overall regularization strength (lambda)
    pub penalty: f64,
    /// L1 share of the penalty: 0 = ridge, 1 = lasso
    pub mixture: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest coefficient change
    pub tol: f64,
    /// Iterations used by the last fit
    pub n_iter: usize,
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            penalty: 0.0,
            mixture: 0.0,
            max_iter: 1000,
            tol: 1e-6,
            n_iter: 0,
            is_fitted: false,
        }
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_mixture(mut self, mixture: f64) -> Self {
        self.mixture = mixture;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.penalty.is_finite() && self.penalty >= 0.0) {
            return Err(KolosalError::invalid_parameter(
                "penalty",
                self.penalty,
                "must be a non-negative number",
            ));
        }
        if !(0.0..=1.0).contains(&self.mixture) {
            return Err(KolosalError::invalid_parameter(
                "mixture",
                self.mixture,
                "must lie in [0, 1]",
            ));
        }
        if self.max_iter == 0 {
            return Err(KolosalError::invalid_parameter(
                "max_iter",
                self.max_iter,
                "must be positive",
            ));
        }
        Ok(())
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        }
    }

    /// Largest eigenvalue of `[1 X]ᵀ[1 X] / n` by power iteration
    fn gram_spectral_norm(x: &Array2<f64>) -> f64 {
        let n = x.nrows() as f64;
        let p = x.ncols();
        let mut v = Array1::from_elem(p + 1, 1.0 / ((p + 1) as f64).sqrt());
        let mut lambda = 1.0;
        for _ in 0..50 {
            let xv = x.dot(&v.slice(ndarray::s![1..])) + v[0];
            let mut w = Array1::zeros(p + 1);
            w[0] = xv.sum() / n;
            w.slice_mut(ndarray::s![1..]).assign(&(x.t().dot(&xv) / n));
            let norm = w.dot(&w).sqrt();
            if norm == 0.0 || !norm.is_finite() {
                break;
            }
            lambda = norm;
            v = w / norm;
        }
        lambda
    }

    /// Fit on a 0/1 outcome
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.validate()?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(KolosalError::SchemaMismatch(format!(
                "{} rows but {} outcome values",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(KolosalError::TrainingError("no training rows".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(KolosalError::TrainingError(
                "predictors contain missing or non-finite values".to_string(),
            ));
        }
        let positives = y.iter().filter(|&&v| v > 0.5).count();
        if positives == 0 || positives == n_samples {
            return Err(KolosalError::TrainingError(
                "outcome has a single class".to_string(),
            ));
        }

        let n = n_samples as f64;
        let l1 = self.penalty * self.mixture;
        let l2 = self.penalty * (1.0 - self.mixture);
        let lipschitz = 0.25 * Self::gram_spectral_norm(x) + l2;
        let step = 1.0 / lipschitz.max(1e-12);

        let mut weights: Array1<f64> = Array1::zeros(n_features);
        let mut bias = 0.0;
        // Momentum point
        let mut z_weights = weights.clone();
        let mut z_bias = bias;
        let mut t = 1.0f64;
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;

            let linear = x.dot(&z_weights) + z_bias;
            let errors = linear.mapv(Self::sigmoid) - y;
            let grad_w = x.t().dot(&errors) / n + l2 * &z_weights;
            let grad_b = errors.sum() / n;

            let mut next_weights = &z_weights - &(step * &grad_w);
            let threshold = step * l1;
            if threshold > 0.0 {
                next_weights.mapv_inplace(|w| w.signum() * (w.abs() - threshold).max(0.0));
            }
            let next_bias = z_bias - step * grad_b;

            if !next_bias.is_finite() || next_weights.iter().any(|w| !w.is_finite()) {
                return Err(KolosalError::ConvergenceError { iterations });
            }

            let delta = next_weights
                .iter()
                .zip(weights.iter())
                .map(|(a, b)| (a - b).abs())
                .fold((next_bias - bias).abs(), f64::max);

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            z_weights = &next_weights + &(momentum * (&next_weights - &weights));
            z_bias = next_bias + momentum * (next_bias - bias);

            weights = next_weights;
            bias = next_bias;
            t = t_next;

            if delta < self.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            debug!(
                iterations,
                penalty = self.penalty,
                mixture = self.mixture,
                "Logistic regression reached max_iter"
            );
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.n_iter = iterations;
        self.is_fitted = true;
        Ok(self)
    }

    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (coefficients, intercept) = match (&self.coefficients, self.intercept) {
            (Some(c), Some(b)) if self.is_fitted => (c, b),
            _ => return Err(KolosalError::ModelNotFitted),
        };
        if x.ncols() != coefficients.len() {
            return Err(KolosalError::SchemaMismatch(format!(
                "expected {} predictors, got {}",
                coefficients.len(),
                x.ncols()
            )));
        }
        super::check_finite_rows(x)?;
        Ok((x.dot(coefficients) + intercept).mapv(Self::sigmoid))
    }

    /// Number of exactly-zero coefficients
    pub fn n_zero_coefficients(&self) -> usize {
        self.coefficients
            .as_ref()
            .map(|c| c.iter().filter(|&&w| w == 0.0).count())
            .unwrap_or(0)
    }

    /// Mean log-loss on `(x, y)`
    pub fn log_loss(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let proba = self.predict_proba(x)?;
        let eps = 1e-15;
        let total: f64 = proba
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| {
                let p = p.clamp(eps, 1.0 - eps);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum();
        Ok(total / proba.len_of(Axis(0)).max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable_ish() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [-2.0, 0.1],
            [-1.5, -0.3],
            [-1.0, 0.2],
            [-0.5, 0.0],
            [0.2, -0.1],
            [0.5, 0.3],
            [1.0, -0.2],
            [1.5, 0.1],
            [2.0, 0.0],
            [-0.2, 0.1],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_predict_rejects_missing_values() {
        let (x, y) = separable_ish();
        let mut model = LogisticRegression::new().with_penalty(0.01);
        model.fit(&x, &y).unwrap();
        let holes = array![[0.5, 0.1], [f64::NAN, 0.0]];
        let err = model.predict_proba(&holes).unwrap_err();
        assert!(matches!(err, KolosalError::PredictionError(ref m) if m.contains("row 1")));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fit_orders_probabilities() {
        let (x, y) = separable_ish();
        let mut model = LogisticRegression::new().with_penalty(0.01);
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&x).unwrap();
        assert!(p[0] < p[8]);
        assert!(model.coefficients.as_ref().unwrap()[0] > 0.0);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_lasso_zeroes_coefficients() {
        let (x, y) = separable_ish();
        let mut model = LogisticRegression::new().with_penalty(10.0).with_mixture(1.0);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_zero_coefficients(), 2);
    }

    #[test]
    fn test_heavier_penalty_shrinks() {
        let (x, y) = separable_ish();
        let mut light = LogisticRegression::new().with_penalty(1e-4);
        let mut heavy = LogisticRegression::new().with_penalty(1.0);
        light.fit(&x, &y).unwrap();
        heavy.fit(&x, &y).unwrap();
        let norm = |m: &LogisticRegression| m.coefficients.as_ref().unwrap()[0].abs();
        assert!(norm(&heavy) < norm(&light));
    }

    #[test]
    fn test_single_class_fails() {
        let (x, _) = separable_ish();
        let y = Array1::zeros(10);
        let err = LogisticRegression::new().fit(&x, &y).unwrap_err();
        assert!(matches!(err, KolosalError::TrainingError(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_predict_before_fit() {
        let (x, _) = separable_ish();
        assert!(matches!(
            LogisticRegression::new().predict_proba(&x),
            Err(KolosalError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_invalid_mixture() {
        let (x, y) = separable_ish();
        let err = LogisticRegression::new().with_mixture(1.5).fit(&x, &y).unwrap_err();
        assert!(matches!(err, KolosalError::InvalidParameter { .. }));
    }
}
