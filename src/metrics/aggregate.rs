//! Per-candidate aggregation, ranking and selection

use super::MetricKind;
use crate::data::RunningStats;
use crate::error::{KolosalError, Result};
use crate::model::{ParameterSpace, Simplicity};
use crate::tune::Candidate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One metric value of one candidate on one resample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub candidate_id: usize,
    pub fold_id: String,
    pub metric: MetricKind,
    pub value: f64,
}

/// A candidate that could not be fit or evaluated on one resample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub candidate_id: usize,
    pub fold_id: String,
    pub reason: String,
}

/// How exact ties on the ranking metric are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TieBreak {
    /// Prefer the simpler model, comparing tunables in declaration order
    #[default]
    Parsimony,
    /// Prefer the better mean of a secondary metric, then parsimony
    Metric(MetricKind),
    /// Prefer the earlier candidate
    FirstCandidate,
}

/// Resampled estimate of one metric for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub candidate_id: usize,
    pub params: std::collections::BTreeMap<String, f64>,
    pub metric: MetricKind,
    /// Mean over resamples where the metric was defined
    pub mean: f64,
    /// Sample variance across resamples
    pub variance: f64,
    pub std_err: f64,
    /// Resamples contributing to the mean
    pub n: usize,
}

/// Group records by `(candidate, metric)` in candidate order.
///
/// `NaN` values are dropped before averaging; a candidate whose metric was
/// never defined gets a `NaN` mean and `n = 0`.
pub fn collect_metrics(records: &[MetricRecord], candidates: &[Candidate]) -> Vec<MetricSummary> {
    let mut metrics: Vec<MetricKind> = Vec::new();
    for r in records {
        if !metrics.contains(&r.metric) {
            metrics.push(r.metric);
        }
    }

    let mut out = Vec::new();
    for candidate in candidates {
        for &metric in &metrics {
            let mut seen = false;
            let mut stats = RunningStats::new();
            for r in records
                .iter()
                .filter(|r| r.candidate_id == candidate.id && r.metric == metric)
            {
                seen = true;
                stats.update(r.value);
            }
            if !seen {
                continue;
            }
            let n = stats.count();
            let variance = if n < 2 { f64::NAN } else { stats.variance() };
            out.push(MetricSummary {
                candidate_id: candidate.id,
                params: candidate.values.clone(),
                metric,
                mean: stats.mean(),
                variance,
                std_err: if n < 2 { 0.0 } else { (stats.variance() / n as f64).sqrt() },
                n,
            });
        }
    }
    out
}

/// Order two candidates simplest first
pub fn parsimony_cmp(space: &ParameterSpace, a: &MetricSummary, b: &MetricSummary) -> Ordering {
    for (name, range) in space.tunables() {
        let (va, vb) = match (a.params.get(name), b.params.get(name)) {
            (Some(va), Some(vb)) => (*va, *vb),
            _ => continue,
        };
        let ord = match range.simplicity {
            Simplicity::HigherIsSimpler => vb.total_cmp(&va),
            Simplicity::LowerIsSimpler => va.total_cmp(&vb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.candidate_id.cmp(&b.candidate_id)
}

/// Order means best first with `NaN` last
fn metric_cmp(metric: MetricKind, a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ if metric.maximize() => b.total_cmp(&a),
        _ => a.total_cmp(&b),
    }
}

/// Ranks candidates from their summaries
pub struct Leaderboard<'a> {
    summaries: &'a [MetricSummary],
    space: &'a ParameterSpace,
    excluded: BTreeSet<usize>,
}

impl<'a> Leaderboard<'a> {
    pub fn new(
        summaries: &'a [MetricSummary],
        space: &'a ParameterSpace,
        failures: &[CandidateFailure],
    ) -> Self {
        Self {
            summaries,
            space,
            excluded: failures.iter().map(|f| f.candidate_id).collect(),
        }
    }

    fn mean_of(&self, candidate_id: usize, metric: MetricKind) -> f64 {
        self.summaries
            .iter()
            .find(|s| s.candidate_id == candidate_id && s.metric == metric)
            .map(|s| s.mean)
            .unwrap_or(f64::NAN)
    }

    fn eligible(&self, metric: MetricKind) -> Result<Vec<&'a MetricSummary>> {
        if !self.summaries.iter().any(|s| s.metric == metric) {
            return Err(KolosalError::ConfigError(format!(
                "metric '{}' was not computed during tuning",
                metric
            )));
        }
        Ok(self
            .summaries
            .iter()
            .filter(|s| s.metric == metric && !self.excluded.contains(&s.candidate_id))
            .collect())
    }

    /// Summaries of `metric`, best first
    pub fn rank(&self, metric: MetricKind, tie_break: TieBreak) -> Result<Vec<&'a MetricSummary>> {
        let mut ranked = self.eligible(metric)?;
        ranked.sort_by(|a, b| {
            metric_cmp(metric, a.mean, b.mean).then_with(|| match tie_break {
                TieBreak::Parsimony => parsimony_cmp(self.space, a, b),
                TieBreak::Metric(secondary) => metric_cmp(
                    secondary,
                    self.mean_of(a.candidate_id, secondary),
                    self.mean_of(b.candidate_id, secondary),
                )
                .then_with(|| parsimony_cmp(self.space, a, b)),
                TieBreak::FirstCandidate => a.candidate_id.cmp(&b.candidate_id),
            })
        });
        Ok(ranked)
    }

    /// Best candidate id by `metric`
    pub fn best(&self, metric: MetricKind, tie_break: TieBreak) -> Result<usize> {
        self.rank(metric, tie_break)?
            .into_iter()
            .find(|s| !s.mean.is_nan())
            .map(|s| s.candidate_id)
            .ok_or_else(|| {
                KolosalError::ValidationError(format!(
                    "no candidate has a defined '{}' estimate",
                    metric
                ))
            })
    }

    /// Simplest candidate whose mean lies within one standard error of the
    /// best mean
    pub fn one_std_err(&self, metric: MetricKind) -> Result<usize> {
        let ranked = self.rank(metric, TieBreak::Parsimony)?;
        let best = ranked
            .iter()
            .find(|s| !s.mean.is_nan())
            .ok_or_else(|| {
                KolosalError::ValidationError(format!(
                    "no candidate has a defined '{}' estimate",
                    metric
                ))
            })?;
        let std_err = if best.std_err.is_finite() { best.std_err } else { 0.0 };
        let limit = if metric.maximize() {
            best.mean - std_err
        } else {
            best.mean + std_err
        };

        ranked
            .iter()
            .filter(|s| {
                !s.mean.is_nan()
                    && if metric.maximize() {
                        s.mean >= limit
                    } else {
                        s.mean <= limit
                    }
            })
            .min_by(|a, b| parsimony_cmp(self.space, a, b))
            .map(|s| s.candidate_id)
            .ok_or_else(|| KolosalError::ValidationError("empty ranking".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, ParamSlot};
    use std::collections::BTreeMap;

    fn candidates(penalties: &[f64]) -> Vec<Candidate> {
        penalties
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let mut values = BTreeMap::new();
                values.insert("penalty".to_string(), p);
                Candidate::new(i + 1, values)
            })
            .collect()
    }

    fn record(candidate_id: usize, fold: &str, metric: MetricKind, value: f64) -> MetricRecord {
        MetricRecord {
            candidate_id,
            fold_id: fold.to_string(),
            metric,
            value,
        }
    }

    fn space() -> ParameterSpace {
        ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap()
            .parameters()
            .clone()
    }

    #[test]
    fn test_collect_mean_variance() {
        let cands = candidates(&[0.1]);
        let records = vec![
            record(1, "Fold1", MetricKind::Accuracy, 0.8),
            record(1, "Fold2", MetricKind::Accuracy, 0.9),
            record(1, "Fold3", MetricKind::Accuracy, 1.0),
            record(1, "Fold1", MetricKind::RocAuc, f64::NAN),
            record(1, "Fold2", MetricKind::RocAuc, 0.7),
        ];
        let summaries = collect_metrics(&records, &cands);
        assert_eq!(summaries.len(), 2);
        let acc = &summaries[0];
        assert_eq!(acc.metric, MetricKind::Accuracy);
        assert!((acc.mean - 0.9).abs() < 1e-12);
        assert!((acc.variance - 0.01).abs() < 1e-12);
        assert_eq!(acc.n, 3);

        let auc = &summaries[1];
        assert_eq!(auc.n, 1);
        assert_eq!(auc.mean, 0.7);
    }

    #[test]
    fn test_tie_prefers_larger_penalty() {
        let cands = candidates(&[0.001, 0.1]);
        let records = vec![
            record(1, "Fold1", MetricKind::Accuracy, 0.9),
            record(2, "Fold1", MetricKind::Accuracy, 0.9),
        ];
        let summaries = collect_metrics(&records, &cands);
        let space = space();
        let board = Leaderboard::new(&summaries, &space, &[]);
        assert_eq!(board.best(MetricKind::Accuracy, TieBreak::Parsimony).unwrap(), 2);
        assert_eq!(board.best(MetricKind::Accuracy, TieBreak::FirstCandidate).unwrap(), 1);
    }

    #[test]
    fn test_tie_by_secondary_metric() {
        let cands = candidates(&[0.001, 0.1]);
        let records = vec![
            record(1, "Fold1", MetricKind::Accuracy, 0.9),
            record(1, "Fold1", MetricKind::RocAuc, 0.95),
            record(2, "Fold1", MetricKind::Accuracy, 0.9),
            record(2, "Fold1", MetricKind::RocAuc, 0.85),
        ];
        let summaries = collect_metrics(&records, &cands);
        let space = space();
        let board = Leaderboard::new(&summaries, &space, &[]);
        let best = board
            .best(MetricKind::Accuracy, TieBreak::Metric(MetricKind::RocAuc))
            .unwrap();
        assert_eq!(best, 1);
    }

    #[test]
    fn test_failed_candidates_excluded() {
        let cands = candidates(&[0.001, 0.1]);
        let records = vec![
            record(1, "Fold1", MetricKind::Accuracy, 0.7),
            record(2, "Fold1", MetricKind::Accuracy, 0.9),
        ];
        let failures = vec![CandidateFailure {
            candidate_id: 2,
            fold_id: "Fold2".to_string(),
            reason: "diverged".to_string(),
        }];
        let summaries = collect_metrics(&records, &cands);
        let space = space();
        let board = Leaderboard::new(&summaries, &space, &failures);
        let ranked = board.rank(MetricKind::Accuracy, TieBreak::Parsimony).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate_id, 1);
    }

    #[test]
    fn test_one_std_err_prefers_simpler() {
        let cands = candidates(&[0.001, 0.01, 0.1]);
        let mut records = Vec::new();
        for (fold, (a, b, c)) in [(0.90, 0.88, 0.70), (0.80, 0.82, 0.72)].iter().enumerate() {
            let id = format!("Fold{}", fold + 1);
            records.push(record(1, &id, MetricKind::Accuracy, *a));
            records.push(record(2, &id, MetricKind::Accuracy, *b));
            records.push(record(3, &id, MetricKind::Accuracy, *c));
        }
        let summaries = collect_metrics(&records, &cands);
        let space = space();
        let board = Leaderboard::new(&summaries, &space, &[]);
        // candidates 1 and 2 share the best mean; 3 is more than one std_err away
        assert_eq!(board.one_std_err(MetricKind::Accuracy).unwrap(), 2);
    }

    #[test]
    fn test_unknown_metric() {
        let cands = candidates(&[0.1]);
        let records = vec![record(1, "Fold1", MetricKind::Accuracy, 0.9)];
        let summaries = collect_metrics(&records, &cands);
        let space = space();
        let board = Leaderboard::new(&summaries, &space, &[]);
        assert!(matches!(
            board.best(MetricKind::RocAuc, TieBreak::Parsimony),
            Err(KolosalError::ConfigError(_))
        ));
    }
}
