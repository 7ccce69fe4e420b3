//! Integration tests for grids, the tuning engine and candidate selection

use kolosal_workflow::data::{Column, Dataset};
use kolosal_workflow::metrics::{MetricKind, MetricRecord, MetricSet, TieBreak};
use kolosal_workflow::model::{ModelSpec, ParamSlot, ParameterSpace, TuneRange, Simplicity};
use kolosal_workflow::recipe::{Recipe, Selector, Step};
use kolosal_workflow::resampling::Resamples;
use kolosal_workflow::tune::{CancellationToken, Grid, GridStrategy, TuneConfig, Tuner};
use kolosal_workflow::workflow::Workflow;
use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Two noisy predictors, positives shifted upward
fn noisy(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let labels: Vec<bool> = (0..n).map(|i| i % 3 == 0).collect();
    let x1 = labels
        .iter()
        .map(|&y| if y { 1.5 } else { 0.0 } + rng.gen::<f64>() * 2.0)
        .collect();
    let x2 = (0..n).map(|_| rng.gen::<f64>()).collect();
    Dataset::from_columns(vec![
        Column::numeric("x1", x1),
        Column::numeric("x2", x2),
        Column::categorical(
            "y",
            labels.iter().map(|&y| if y { "yes" } else { "no" }).collect::<Vec<_>>(),
        ),
    ])
    .unwrap()
}

/// Positives and negatives separated by a wide gap
fn separable(n: usize) -> Dataset {
    Dataset::from_columns(vec![
        Column::numeric(
            "x",
            (0..n).map(|i| if i % 2 == 0 { 10.0 + i as f64 } else { -10.0 - i as f64 }).collect(),
        ),
        Column::categorical(
            "y",
            (0..n).map(|i| if i % 2 == 0 { "yes" } else { "no" }).collect::<Vec<_>>(),
        ),
    ])
    .unwrap()
}

/// Replace the given rows of a numeric column with missing values
fn with_missing(data: &Dataset, column: &str, rows: &[usize]) -> Dataset {
    let mut values = data.numeric(column).unwrap().to_vec();
    for &row in rows {
        values[row] = f64::NAN;
    }
    data.with_column(Column::numeric(column, values)).unwrap()
}

fn logistic_workflow(tuned: &[&str]) -> Workflow {
    let mut spec = ModelSpec::logistic_regression();
    for name in tuned {
        spec = spec.set(name, ParamSlot::tune()).unwrap();
    }
    Workflow::bind(
        Recipe::new("y").add_step(Step::Normalize(Selector::AllNumericPredictors)),
        spec,
    )
}

fn forest_workflow() -> Workflow {
    let spec = ModelSpec::random_forest()
        .set("mtry", ParamSlot::tune())
        .unwrap()
        .set("min_n", ParamSlot::tune())
        .unwrap()
        .set("trees", ParamSlot::Fixed(15.0))
        .unwrap();
    Workflow::bind(Recipe::new("y"), spec)
}

fn logistic_space() -> ParameterSpace {
    logistic_workflow(&["penalty", "mixture"]).spec().parameters().clone()
}

fn record_bits(records: &[MetricRecord]) -> Vec<(usize, String, MetricKind, u64)> {
    records
        .iter()
        .map(|r| (r.candidate_id, r.fold_id.clone(), r.metric, r.value.to_bits()))
        .collect()
}

// ============================================================================
// Grids
// ============================================================================

proptest! {
    #[test]
    fn prop_sampled_grids_are_deterministic(seed in any::<u64>(), size in 1usize..20) {
        let space = logistic_space();
        for strategy in [GridStrategy::LatinHypercube { size }, GridStrategy::Random { size }] {
            let a = Grid::generate(&space, &strategy, seed).unwrap();
            let b = Grid::generate(&space, &strategy, seed).unwrap();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn prop_latin_hypercube_fills_every_stratum(seed in any::<u64>(), size in 1usize..25) {
        let space = logistic_space();
        let candidates = Grid::latin_hypercube(&space, size, seed).unwrap();
        prop_assert_eq!(candidates.len(), size);

        for (name, range) in space.tunables() {
            let (lo, hi) = range.transformed_bounds(name).unwrap();
            let strata: BTreeSet<usize> = candidates
                .iter()
                .map(|c| {
                    let t = range.transform.forward(c.get(name).unwrap());
                    let u = (t - lo) / (hi - lo);
                    ((u * size as f64).floor() as usize).min(size - 1)
                })
                .collect();
            prop_assert_eq!(strata, (0..size).collect::<BTreeSet<_>>());
        }
    }
}

#[test]
fn test_regular_grid_is_factorial() {
    let candidates = Grid::generate(&logistic_space(), &GridStrategy::Regular { levels: 3 }, 0).unwrap();
    assert_eq!(candidates.len(), 9);
    assert_eq!(candidates[0].id, 1);
    let penalties: BTreeSet<u64> = candidates.iter().map(|c| c.get("penalty").unwrap().to_bits()).collect();
    assert_eq!(penalties.len(), 3);
}

#[test]
fn test_predictor_bound_needs_finalizing() {
    let workflow = forest_workflow();
    let space = workflow.spec().parameters();
    assert!(Grid::regular(space, 3).is_err());

    let data = noisy(30, 1);
    let finalized = workflow.finalize_parameters(&data).unwrap();
    let candidates = Grid::regular(&finalized, 2).unwrap();
    assert!(candidates.iter().all(|c| c.get("mtry").unwrap() <= 2.0));
}

#[test]
fn test_custom_range() {
    let range = TuneRange::new(0.25, 0.75, Simplicity::HigherIsSimpler);
    let spec = ModelSpec::logistic_regression()
        .set("mixture", ParamSlot::tune_in(range))
        .unwrap();
    let candidates = Grid::regular(spec.parameters(), 3).unwrap();
    let values: Vec<f64> = candidates.iter().map(|c| c.get("mixture").unwrap()).collect();
    assert_eq!(values, vec![0.25, 0.5, 0.75]);
}

// ============================================================================
// Tuning engine
// ============================================================================

#[test]
fn test_parallelism_does_not_change_records() {
    let data = noisy(90, 5);
    let resamples = Resamples::vfold(&data, 3, 1, Some("y"), 11).unwrap();
    let workflow = forest_workflow();
    let space = workflow.finalize_parameters(&data).unwrap();
    let candidates = Grid::regular(&space, 2).unwrap();
    let metrics = MetricSet::new(vec![MetricKind::Accuracy, MetricKind::RocAuc, MetricKind::LogLoss]);

    let serial = Tuner::new(TuneConfig::new().with_parallelism(1))
        .tune(&workflow, &candidates, &resamples, &metrics)
        .unwrap();
    let parallel = Tuner::new(TuneConfig::new().with_parallelism(4))
        .tune(&workflow, &candidates, &resamples, &metrics)
        .unwrap();

    assert_eq!(serial.records().len(), candidates.len() * 3 * 3);
    assert_eq!(record_bits(serial.records()), record_bits(parallel.records()));
}

#[test]
fn test_tie_prefers_larger_penalty() {
    let data = separable(60);
    let resamples = Resamples::vfold(&data, 3, 1, Some("y"), 2).unwrap();
    let candidates = Grid::explicit(
        [1e-9, 1e-8]
            .iter()
            .map(|&p| BTreeMap::from([("penalty".to_string(), p)]))
            .collect(),
    );
    let results = Tuner::new(TuneConfig::default())
        .tune(&logistic_workflow(&["penalty"]), &candidates, &resamples, &MetricSet::default())
        .unwrap();

    let summaries = results.collect_metrics();
    assert_eq!(summaries[0].mean, summaries[2].mean);
    let best = results.select_best(MetricKind::Accuracy, TieBreak::Parsimony).unwrap();
    assert_eq!(best.get("penalty"), Some(1e-8));
    let first = results.select_best(MetricKind::Accuracy, TieBreak::FirstCandidate).unwrap();
    assert_eq!(first.id, 1);
}

#[test]
fn test_failed_candidate_is_excluded() {
    let data = noisy(60, 3);
    let resamples = Resamples::vfold(&data, 3, 1, Some("y"), 4).unwrap();
    let candidates = Grid::explicit(vec![
        BTreeMap::from([("mixture".to_string(), 0.5)]),
        BTreeMap::from([("mixture".to_string(), 1.5)]),
    ]);
    let results = Tuner::new(TuneConfig::default())
        .tune(&logistic_workflow(&["mixture"]), &candidates, &resamples, &MetricSet::default())
        .unwrap();

    assert_eq!(results.failures().len(), 3);
    let excluded = results.excluded();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].0.id, 2);
    assert!(excluded[0].1[0].reason.contains("mixture"));

    let best = results.show_best(MetricKind::RocAuc, 5, TieBreak::Parsimony).unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].candidate_id, 1);
}

#[test]
fn test_missing_values_in_assessment_rows() {
    let clean = noisy(60, 8);
    let holdout = Resamples::validation(&clean, 0.75, Some("y"), 8).unwrap();
    let rows = holdout.folds()[0].assessment[..2].to_vec();
    let data = with_missing(&clean, "x2", &rows);
    let resamples = Resamples::validation(&data, 0.75, Some("y"), 8).unwrap();
    assert_eq!(resamples.folds(), holdout.folds());

    let candidates = Grid::log_sequence("penalty", -3.0, -1.0, 3);
    let tuner = Tuner::new(TuneConfig::new().with_parallelism(2));

    let bare = tuner
        .tune(&logistic_workflow(&["penalty"]), &candidates, &resamples, &MetricSet::default())
        .unwrap();
    assert!(bare.records().is_empty());
    assert_eq!(bare.failures().len(), 3);
    assert!(bare.failures().iter().all(|f| f.reason.contains("missing")));
    assert!(bare.select_best(MetricKind::RocAuc, TieBreak::Parsimony).is_err());

    let imputing = Workflow::bind(
        Recipe::new("y")
            .add_step(Step::ImputeMean(Selector::AllNumericPredictors))
            .add_step(Step::Normalize(Selector::AllNumericPredictors)),
        ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap(),
    );
    let results = tuner
        .tune(&imputing, &candidates, &resamples, &MetricSet::default())
        .unwrap();
    assert!(results.failures().is_empty());
    assert_eq!(results.records().len(), 3 * 2);
    assert!(results.records().iter().all(|r| r.value.is_finite()));
    assert!(results.select_best(MetricKind::RocAuc, TieBreak::Parsimony).is_ok());
}

#[test]
fn test_cancel_before_start() {
    let data = noisy(30, 1);
    let resamples = Resamples::vfold(&data, 3, 1, None, 1).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let results = Tuner::new(TuneConfig::default())
        .with_cancellation(token)
        .tune(
            &logistic_workflow(&["penalty"]),
            &Grid::log_sequence("penalty", -3.0, -1.0, 3),
            &resamples,
            &MetricSet::default(),
        )
        .unwrap();
    assert!(results.is_cancelled());
    assert!(results.records().is_empty());
}

#[test]
fn test_cancel_from_progress_hook() {
    let data = noisy(60, 2);
    let resamples = Resamples::vfold(&data, 3, 1, None, 1).unwrap();
    let token = CancellationToken::new();
    let hook_token = token.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);

    let results = Tuner::new(TuneConfig::new().with_parallelism(1))
        .with_cancellation(token)
        .with_progress(move |p| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
            if p.completed == 4 {
                hook_token.cancel();
            }
        })
        .tune(
            &logistic_workflow(&["penalty"]),
            &Grid::log_sequence("penalty", -3.0, -1.0, 5),
            &resamples,
            &MetricSet::default(),
        )
        .unwrap();

    assert!(results.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(results.records().len(), 4 * 2);
}

#[test]
fn test_select_by_one_std_err_is_valid_candidate() {
    let data = noisy(90, 9);
    let resamples = Resamples::vfold(&data, 5, 1, Some("y"), 9).unwrap();
    let candidates = Grid::log_sequence("penalty", -4.0, 0.0, 6);
    let results = Tuner::new(TuneConfig::new().with_parallelism(2))
        .tune(&logistic_workflow(&["penalty"]), &candidates, &resamples, &MetricSet::default())
        .unwrap();

    let best = results.select_best(MetricKind::RocAuc, TieBreak::Parsimony).unwrap();
    let simple = results.select_by_one_std_err(MetricKind::RocAuc).unwrap();
    assert!(simple.get("penalty").unwrap() >= best.get("penalty").unwrap());
    assert!(candidates.contains(&simple));
}
