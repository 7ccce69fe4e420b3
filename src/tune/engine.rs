//! Resampled grid evaluation
//!
//! Every (fold, candidate) pair is an independent job. The recipe is fit
//! once per fold and its baked matrices are shared read-only by all of that
//! fold's jobs; each job trains its own engine. Results are sorted before
//! they are returned, so output never depends on the degree of parallelism.

use super::{CancellationToken, Candidate, TuneConfig};
use crate::error::{KolosalError, Result};
use crate::metrics::aggregate::{collect_metrics, Leaderboard};
use crate::metrics::{CandidateFailure, MetricKind, MetricRecord, MetricSet, MetricSummary, TieBreak};
use crate::model::ParameterSpace;
use crate::resampling::Resamples;
use crate::workflow::{bake, OutcomeLevels, PreparedData, Workflow};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress of a tuning run, reported after every finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub completed: usize,
    pub total: usize,
    pub candidate_id: usize,
    pub fold_id: String,
    pub failed: bool,
}

/// Callback invoked after every finished job
pub type ProgressCallback = Arc<dyn Fn(&JobProgress) + Send + Sync>;

/// A fold's trained recipe and baked matrices
struct PreparedFold {
    id: String,
    prepared: PreparedData,
    assess_x: Array2<f64>,
    assess_y: Vec<f64>,
}

enum JobOutcome {
    Records(Vec<MetricRecord>),
    Failed(CandidateFailure),
    Skipped,
}

/// Runs a workflow over candidates × resamples
pub struct Tuner {
    config: TuneConfig,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Tuner {
    pub fn new(config: TuneConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report progress after every finished job
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// A handle that cancels this tuner's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    fn validate(workflow: &Workflow, candidates: &[Candidate], metrics: &MetricSet) -> Result<()> {
        if candidates.is_empty() {
            return Err(KolosalError::ConfigError("no candidates to evaluate".to_string()));
        }
        if metrics.is_empty() {
            return Err(KolosalError::ConfigError("no metrics requested".to_string()));
        }
        let mut ids = BTreeSet::new();
        for candidate in candidates {
            if !ids.insert(candidate.id) {
                return Err(KolosalError::ConfigError(format!(
                    "duplicate candidate id {}",
                    candidate.id
                )));
            }
            workflow.materialize(candidate)?;
        }
        Ok(())
    }

    fn prepare_fold(
        workflow: &Workflow,
        resamples: &Resamples,
        fold_idx: usize,
        levels: &OutcomeLevels,
    ) -> Result<PreparedFold> {
        let fold = &resamples.folds()[fold_idx];
        let analysis = resamples.analysis(fold);
        let assessment = resamples.assessment(fold);

        let prepared = PreparedData::new(workflow.recipe(), &analysis, levels)?;
        let (_, assess_x) = bake(prepared.recipe(), &assessment, prepared.predictors())?;
        let assess_y = levels
            .encode(&assessment.keys(workflow.recipe().outcome())?)?
            .to_vec();

        debug!(
            fold = %fold.id,
            analysis = analysis.n_rows(),
            assessment = assessment.n_rows(),
            predictors = prepared.predictors().len(),
            "Prepared fold"
        );

        Ok(PreparedFold {
            id: fold.id.clone(),
            prepared,
            assess_x,
            assess_y,
        })
    }

    fn run_job(
        &self,
        workflow: &Workflow,
        fold: &PreparedFold,
        candidate: &Candidate,
        metrics: &MetricSet,
    ) -> Result<JobOutcome> {
        let attempt = || -> Result<Vec<MetricRecord>> {
            let concrete = workflow.materialize(candidate)?;
            let model = concrete.fit_prepared(&fold.prepared)?;
            let proba = model.predict_proba(&fold.assess_x)?;
            let proba = proba.to_vec();
            Ok(metrics
                .evaluate(&fold.assess_y, &proba, self.config.threshold)
                .into_iter()
                .map(|(metric, value)| MetricRecord {
                    candidate_id: candidate.id,
                    fold_id: fold.id.clone(),
                    metric,
                    value,
                })
                .collect())
        };

        match attempt() {
            Ok(records) => Ok(JobOutcome::Records(records)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    candidate = candidate.id,
                    fold = %fold.id,
                    error = %e,
                    "Candidate failed"
                );
                Ok(JobOutcome::Failed(CandidateFailure {
                    candidate_id: candidate.id,
                    fold_id: fold.id.clone(),
                    reason: e.to_string(),
                }))
            }
        }
    }

    /// Evaluate every candidate on every resample.
    ///
    /// Structural errors abort the run. Per-job fit failures are recorded
    /// and the remaining jobs continue. On cancellation the records of jobs
    /// that finished are returned with `cancelled` set.
    pub fn tune(
        &self,
        workflow: &Workflow,
        candidates: &[Candidate],
        resamples: &Resamples,
        metrics: &MetricSet,
    ) -> Result<TuneResults> {
        let start = Instant::now();
        Self::validate(workflow, candidates, metrics)?;

        let mut results = TuneResults {
            candidates: candidates.to_vec(),
            records: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
            space: workflow.spec().parameters().clone(),
            metrics: metrics.clone(),
        };

        if self.cancel.is_cancelled() {
            info!("Tuning cancelled before start");
            results.cancelled = true;
            return Ok(results);
        }

        let levels = workflow.levels(resamples.data())?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism)
            .build()
            .map_err(|e| KolosalError::ThreadPoolError(e.to_string()))?;

        let total = resamples.len() * candidates.len();
        info!(
            candidates = candidates.len(),
            folds = resamples.len(),
            jobs = total,
            threads = pool.current_num_threads(),
            "Tuning started"
        );

        let outcomes: Vec<JobOutcome> = pool.install(|| -> Result<Vec<JobOutcome>> {
            let folds = (0..resamples.len())
                .into_par_iter()
                .map(|i| Self::prepare_fold(workflow, resamples, i, &levels))
                .collect::<Result<Vec<_>>>()?;

            let jobs: Vec<(usize, usize)> = (0..folds.len())
                .flat_map(|f| (0..candidates.len()).map(move |c| (f, c)))
                .collect();
            let completed = AtomicUsize::new(0);

            jobs.par_iter()
                .map(|&(f, c)| {
                    if self.cancel.is_cancelled() {
                        return Ok(JobOutcome::Skipped);
                    }
                    let (fold, candidate) = (&folds[f], &candidates[c]);
                    let outcome = self.run_job(workflow, fold, candidate, metrics)?;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let failed = matches!(outcome, JobOutcome::Failed(_));
                    if self.config.verbose {
                        info!(done, total, candidate = candidate.id, fold = %fold.id, failed, "Job finished");
                    } else {
                        debug!(done, total, candidate = candidate.id, fold = %fold.id, failed, "Job finished");
                    }
                    if let Some(callback) = &self.progress {
                        callback(&JobProgress {
                            completed: done,
                            total,
                            candidate_id: candidate.id,
                            fold_id: fold.id.clone(),
                            failed,
                        });
                    }
                    Ok(outcome)
                })
                .collect()
        })?;

        for outcome in outcomes {
            match outcome {
                JobOutcome::Records(records) => results.records.extend(records),
                JobOutcome::Failed(failure) => results.failures.push(failure),
                JobOutcome::Skipped => results.cancelled = true,
            }
        }

        let candidate_pos: HashMap<usize, usize> =
            candidates.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let fold_pos = |id: &str| resamples.fold_index(id).unwrap_or(usize::MAX);
        results.records.sort_by_key(|r| {
            (
                candidate_pos[&r.candidate_id],
                fold_pos(&r.fold_id),
                metrics.position(r.metric).unwrap_or(usize::MAX),
            )
        });
        results
            .failures
            .sort_by_key(|f| (candidate_pos[&f.candidate_id], fold_pos(&f.fold_id)));

        if results.cancelled {
            info!(records = results.records.len(), "Tuning cancelled");
        }
        info!(
            records = results.records.len(),
            failures = results.failures.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Tuning finished"
        );
        Ok(results)
    }
}

/// Output of a tuning run
#[derive(Debug, Clone)]
pub struct TuneResults {
    candidates: Vec<Candidate>,
    records: Vec<MetricRecord>,
    failures: Vec<CandidateFailure>,
    cancelled: bool,
    space: ParameterSpace,
    metrics: MetricSet,
}

impl TuneResults {
    /// Metric records sorted by candidate, fold and metric
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[CandidateFailure] {
        &self.failures
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate(&self, id: usize) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    /// Mean, variance and standard error per (candidate, metric)
    pub fn collect_metrics(&self) -> Vec<MetricSummary> {
        collect_metrics(&self.records, &self.candidates)
    }

    /// Top `n` summaries of `metric`, best first
    pub fn show_best(&self, metric: MetricKind, n: usize, tie_break: TieBreak) -> Result<Vec<MetricSummary>> {
        let summaries = self.collect_metrics();
        let board = Leaderboard::new(&summaries, &self.space, &self.failures);
        Ok(board
            .rank(metric, tie_break)?
            .into_iter()
            .take(n)
            .cloned()
            .collect())
    }

    /// The best candidate by `metric`
    pub fn select_best(&self, metric: MetricKind, tie_break: TieBreak) -> Result<Candidate> {
        let summaries = self.collect_metrics();
        let board = Leaderboard::new(&summaries, &self.space, &self.failures);
        let id = board.best(metric, tie_break)?;
        self.lookup(id)
    }

    /// The simplest candidate within one standard error of the best
    pub fn select_by_one_std_err(&self, metric: MetricKind) -> Result<Candidate> {
        let summaries = self.collect_metrics();
        let board = Leaderboard::new(&summaries, &self.space, &self.failures);
        let id = board.one_std_err(metric)?;
        self.lookup(id)
    }

    /// Candidates left out of ranking, with every recorded failure
    pub fn excluded(&self) -> Vec<(&Candidate, Vec<&CandidateFailure>)> {
        self.candidates
            .iter()
            .filter_map(|c| {
                let failures: Vec<&CandidateFailure> =
                    self.failures.iter().filter(|f| f.candidate_id == c.id).collect();
                (!failures.is_empty()).then_some((c, failures))
            })
            .collect()
    }

    fn lookup(&self, id: usize) -> Result<Candidate> {
        self.candidate(id)
            .cloned()
            .ok_or_else(|| KolosalError::ValidationError(format!("unknown candidate {}", id)))
    }
}
