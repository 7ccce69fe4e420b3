//! Confusion matrix and ROC curve for a 0/1 outcome

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 2×2 counts at a probability threshold; `p >= threshold` predicts positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tn: usize,
}

impl ConfusionMatrix {
    pub fn new(truth: &[f64], proba: &[f64], threshold: f64) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(proba) {
            match (t > 0.5, p >= threshold) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
                (false, false) => cm.tn += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }

    fn ratio(num: usize, den: usize) -> f64 {
        if den == 0 {
            f64::NAN
        } else {
            num as f64 / den as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        Self::ratio(self.tp + self.tn, self.total())
    }

    /// True-positive rate
    pub fn sensitivity(&self) -> f64 {
        Self::ratio(self.tp, self.tp + self.fn_)
    }

    /// True-negative rate
    pub fn specificity(&self) -> f64 {
        Self::ratio(self.tn, self.tn + self.fp)
    }

    pub fn precision(&self) -> f64 {
        Self::ratio(self.tp, self.tp + self.fp)
    }

    pub fn f1(&self) -> f64 {
        Self::ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              truth+  truth-")?;
        writeln!(f, "  predicted+ {:>7} {:>7}", self.tp, self.fp)?;
        write!(f, "  predicted- {:>7} {:>7}", self.fn_, self.tn)
    }
}

/// One point of a ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC curve built from ranked positive-class probabilities
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
}

impl RocCurve {
    /// One point per distinct probability, from `(0, 0)` at an infinite
    /// threshold down to `(1, 1)`. Tied probabilities move together.
    ///
    /// Empty when either class is absent.
    pub fn new(truth: &[f64], proba: &[f64]) -> Self {
        let n_pos = truth.iter().filter(|&&t| t > 0.5).count();
        let n_neg = truth.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Self::default();
        }

        let mut order: Vec<usize> = (0..proba.len()).collect();
        order.sort_by(|&a, &b| proba[b].total_cmp(&proba[a]));

        let mut points = vec![RocPoint {
            threshold: f64::INFINITY,
            fpr: 0.0,
            tpr: 0.0,
        }];
        let (mut tp, mut fp) = (0usize, 0usize);
        let mut i = 0;
        while i < order.len() {
            let threshold = proba[order[i]];
            while i < order.len() && proba[order[i]].total_cmp(&threshold) == Ordering::Equal {
                if truth[order[i]] > 0.5 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            points.push(RocPoint {
                threshold,
                fpr: fp as f64 / n_neg as f64,
                tpr: tp as f64 / n_pos as f64,
            });
        }
        Self { points }
    }

    /// Trapezoidal area under the curve, `NaN` for an empty curve
    pub fn auc(&self) -> f64 {
        if self.points.is_empty() {
            return f64::NAN;
        }
        self.points
            .windows(2)
            .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
            .sum()
    }
}
