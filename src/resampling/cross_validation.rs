//! V-fold cross-validation and validation holdouts

use super::{split_positions, strata_buckets};
use crate::data::Dataset;
use crate::error::{KolosalError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a set of resamples was generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResampleKind {
    /// Stratified V-fold cross-validation, optionally repeated
    VFold { v: usize, repeats: usize },
    /// Single analysis/assessment holdout
    Validation { prop: f64 },
}

/// One resample: positions into the training dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub id: String,
    pub analysis: Vec<usize>,
    pub assessment: Vec<usize>,
}

impl Fold {
    /// Rows used for fitting
    pub fn analysis_data(&self, data: &Dataset) -> Dataset {
        data.take(&self.analysis)
    }

    /// Rows used for evaluation
    pub fn assessment_data(&self, data: &Dataset) -> Dataset {
        data.take(&self.assessment)
    }
}

/// An ordered collection of folds over one training dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resamples {
    kind: ResampleKind,
    folds: Vec<Fold>,
    data: Dataset,
}

impl Resamples {
    /// Stratified V-fold cross-validation.
    ///
    /// Each stratum is shuffled and dealt round-robin into `v` folds, the
    /// dealing offset carrying over between strata so fold sizes stay
    /// balanced. Repeat `r` reseeds with `seed + r`.
    pub fn vfold(
        dataset: &Dataset,
        v: usize,
        repeats: usize,
        strata: Option<&str>,
        seed: u64,
    ) -> Result<Self> {
        if v < 2 {
            return Err(KolosalError::invalid_parameter("v", v, "need at least 2 folds"));
        }
        if repeats == 0 {
            return Err(KolosalError::invalid_parameter(
                "repeats",
                repeats,
                "need at least 1 repeat",
            ));
        }
        let n_rows = dataset.n_rows();
        if n_rows < v {
            return Err(KolosalError::InsufficientData(format!(
                "{} record(s) cannot fill {} folds",
                n_rows, v
            )));
        }

        let buckets = strata_buckets(dataset, strata)?;
        let mut folds = Vec::with_capacity(v * repeats);

        for repeat in 0..repeats {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(repeat as u64));
            let mut assignments: Vec<Vec<usize>> = vec![Vec::new(); v];
            let mut offset = 0;

            for bucket in &buckets {
                let mut rows = bucket.clone();
                rows.shuffle(&mut rng);
                for row in rows {
                    assignments[offset % v].push(row);
                    offset += 1;
                }
            }

            for (k, assessment) in assignments.iter().enumerate() {
                let mut assessment = assessment.clone();
                assessment.sort_unstable();
                let analysis: Vec<usize> = (0..n_rows)
                    .filter(|row| assessment.binary_search(row).is_err())
                    .collect();
                let id = if repeats == 1 {
                    format!("Fold{}", k + 1)
                } else {
                    format!("Repeat{}_Fold{}", repeat + 1, k + 1)
                };
                folds.push(Fold {
                    id,
                    analysis,
                    assessment,
                });
            }
        }

        debug!(v, repeats, folds = folds.len(), "Generated V-fold resamples");

        Ok(Self {
            kind: ResampleKind::VFold { v, repeats },
            folds,
            data: dataset.clone(),
        })
    }

    /// Single validation holdout with `prop` of each stratum in analysis
    pub fn validation(
        dataset: &Dataset,
        prop: f64,
        strata: Option<&str>,
        seed: u64,
    ) -> Result<Self> {
        let (analysis, assessment) = split_positions(dataset, prop, strata, seed)?;
        Ok(Self {
            kind: ResampleKind::Validation { prop },
            folds: vec![Fold {
                id: "validation".to_string(),
                analysis,
                assessment,
            }],
            data: dataset.clone(),
        })
    }

    pub fn kind(&self) -> &ResampleKind {
        &self.kind
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// The dataset the folds index into
    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn analysis(&self, fold: &Fold) -> Dataset {
        fold.analysis_data(&self.data)
    }

    pub fn assessment(&self, fold: &Fold) -> Dataset {
        fold.assessment_data(&self.data)
    }

    /// Position of a fold id in generation order
    pub fn fold_index(&self, id: &str) -> Option<usize> {
        self.folds.iter().position(|f| f.id == id)
    }
}
