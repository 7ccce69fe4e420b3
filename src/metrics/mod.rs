//! Classification metrics and their aggregation across resamples

pub mod aggregate;
pub mod classification;

pub use aggregate::{
    collect_metrics, CandidateFailure, Leaderboard, MetricRecord, MetricSummary, TieBreak,
};
pub use classification::{ConfusionMatrix, RocCurve, RocPoint};

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threshold on the positive-class probability for class metrics
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// A performance metric for a 0/1 outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
    RocAuc,
    Sensitivity,
    Specificity,
    Precision,
    F1,
    LogLoss,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Accuracy,
        MetricKind::RocAuc,
        MetricKind::Sensitivity,
        MetricKind::Specificity,
        MetricKind::Precision,
        MetricKind::F1,
        MetricKind::LogLoss,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Accuracy => "accuracy",
            MetricKind::RocAuc => "roc_auc",
            MetricKind::Sensitivity => "sensitivity",
            MetricKind::Specificity => "specificity",
            MetricKind::Precision => "precision",
            MetricKind::F1 => "f1",
            MetricKind::LogLoss => "log_loss",
        }
    }

    /// Whether larger values are better
    pub fn maximize(&self) -> bool {
        !matches!(self, MetricKind::LogLoss)
    }

    /// `true` if `a` is strictly better than `b` under this metric
    pub fn better(&self, a: f64, b: f64) -> bool {
        if self.maximize() {
            a > b
        } else {
            a < b
        }
    }

    /// Evaluate on 0/1 `truth` and positive-class probabilities.
    ///
    /// Returns `NaN` when the metric is undefined on this data.
    pub fn compute(&self, truth: &[f64], proba: &[f64], threshold: f64) -> f64 {
        if truth.is_empty() || truth.len() != proba.len() {
            return f64::NAN;
        }
        let cm = || ConfusionMatrix::new(truth, proba, threshold);
        match self {
            MetricKind::Accuracy => cm().accuracy(),
            MetricKind::RocAuc => RocCurve::new(truth, proba).auc(),
            MetricKind::Sensitivity => cm().sensitivity(),
            MetricKind::Specificity => cm().specificity(),
            MetricKind::Precision => cm().precision(),
            MetricKind::F1 => cm().f1(),
            MetricKind::LogLoss => {
                let eps = 1e-15;
                truth
                    .iter()
                    .zip(proba)
                    .map(|(&t, &p)| {
                        let p = p.clamp(eps, 1.0 - eps);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / truth.len() as f64
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s.to_ascii_lowercase())
            .ok_or_else(|| {
                KolosalError::invalid_parameter("metric", s, "unknown metric name")
            })
    }
}

/// Ordered, duplicate-free set of metrics to compute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
    metrics: Vec<MetricKind>,
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::new(vec![MetricKind::Accuracy, MetricKind::RocAuc])
    }
}

impl MetricSet {
    pub fn new(metrics: Vec<MetricKind>) -> Self {
        let mut unique = Vec::with_capacity(metrics.len());
        for m in metrics {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        Self { metrics: unique }
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Position of a metric in this set
    pub fn position(&self, metric: MetricKind) -> Option<usize> {
        self.metrics.iter().position(|&m| m == metric)
    }

    /// Compute every metric in order
    pub fn evaluate(&self, truth: &[f64], proba: &[f64], threshold: f64) -> Vec<(MetricKind, f64)> {
        self.metrics
            .iter()
            .map(|m| (*m, m.compute(truth, proba, threshold)))
            .collect()
    }
}
