//! Rebinding the selected candidate and the single held-out evaluation

use crate::data::Dataset;
use crate::error::Result;
use crate::metrics::{ConfusionMatrix, MetricKind, MetricSet, RocCurve};
use crate::resampling::InitialSplit;
use crate::tune::Candidate;
use crate::workflow::{ConcreteWorkflow, FitResult, Workflow};
use tracing::info;

/// Bind the winning candidate's values into the workflow. Nothing is fit.
pub fn finalize_workflow(workflow: &Workflow, candidate: &Candidate) -> Result<ConcreteWorkflow> {
    let concrete = workflow.materialize(candidate)?;
    info!(candidate = %candidate, params = ?concrete.params(), "Finalized workflow");
    Ok(concrete)
}

/// Outcome of [`last_fit`]
#[derive(Debug, Clone)]
pub struct LastFit {
    fit: FitResult,
    metrics: Vec<(MetricKind, f64)>,
    predictions: Dataset,
    truth: Vec<f64>,
    probabilities: Vec<f64>,
    confusion: ConfusionMatrix,
    roc: RocCurve,
}

impl LastFit {
    pub fn fit(&self) -> &FitResult {
        &self.fit
    }

    pub fn into_fit(self) -> FitResult {
        self.fit
    }

    /// Held-out metrics in the requested order
    pub fn metrics(&self) -> &[(MetricKind, f64)] {
        &self.metrics
    }

    pub fn metric(&self, metric: MetricKind) -> Option<f64> {
        self.metrics.iter().find(|(m, _)| *m == metric).map(|(_, v)| *v)
    }

    /// The test subset with prediction columns appended
    pub fn predictions(&self) -> &Dataset {
        &self.predictions
    }

    /// 0/1 test outcome
    pub fn truth(&self) -> &[f64] {
        &self.truth
    }

    /// Positive-class probabilities on the test subset
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn roc(&self) -> &RocCurve {
        &self.roc
    }
}

/// Fit on the whole training allocation and evaluate once on the test
/// subset. The split is consumed so its test subset cannot be reused.
pub fn last_fit(workflow: ConcreteWorkflow, split: InitialSplit, metrics: &MetricSet) -> Result<LastFit> {
    let (training, testing) = split.into_parts();
    let fit = workflow.fit(&training)?;

    let probabilities = fit.predict_proba(&testing)?;
    let truth = fit
        .levels()
        .encode(&testing.keys(fit.recipe().outcome())?)?
        .to_vec();
    let threshold = fit.threshold();

    let values = metrics.evaluate(&truth, &probabilities, threshold);
    let confusion = ConfusionMatrix::new(&truth, &probabilities, threshold);
    let roc = RocCurve::new(&truth, &probabilities);
    let predictions = fit.augment(&testing)?;

    info!(
        training = training.n_rows(),
        testing = testing.n_rows(),
        metrics = ?values,
        "Last fit evaluated on held-out data"
    );

    Ok(LastFit {
        fit,
        metrics: values,
        predictions,
        truth,
        probabilities,
        confusion,
        roc,
    })
}
