//! Train/test splitting and resampling
//!
//! - [`initial_split`]: stratified train/test partition of a dataset
//! - [`Resamples`]: V-fold cross-validation and validation holdouts over the
//!   training allocation

mod cross_validation;

pub use cross_validation::{Fold, ResampleKind, Resamples};

use crate::data::Dataset;
use crate::error::{KolosalError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::info;

/// A stratified train/test partition
///
/// Training and testing are disjoint by record id and together cover every
/// record of the source dataset.
#[derive(Debug, Clone)]
pub struct InitialSplit {
    training: Dataset,
    testing: Dataset,
    train_fraction: f64,
    strata: Option<String>,
}

impl InitialSplit {
    pub fn training(&self) -> &Dataset {
        &self.training
    }

    pub fn testing(&self) -> &Dataset {
        &self.testing
    }

    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    pub fn strata(&self) -> Option<&str> {
        self.strata.as_deref()
    }

    /// Consume the split, yielding `(training, testing)`
    pub fn into_parts(self) -> (Dataset, Dataset) {
        (self.training, self.testing)
    }
}

/// Group row positions by the value of the strata field.
///
/// Buckets come back in sorted key order; a missing strata field yields a
/// single bucket holding every row.
pub(crate) fn strata_buckets(dataset: &Dataset, strata: Option<&str>) -> Result<Vec<Vec<usize>>> {
    let field = match strata {
        Some(field) => field,
        None => return Ok(vec![(0..dataset.n_rows()).collect()]),
    };

    let keys = dataset.keys(field)?;
    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        buckets.entry(key).or_default().push(row);
    }

    if let Some((key, rows)) = buckets.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(KolosalError::InsufficientData(format!(
            "stratum '{}' of '{}' has {} record(s), need at least 2",
            key,
            field,
            rows.len()
        )));
    }

    Ok(buckets.into_values().collect())
}

/// Partition rows into `(train, test)` positions with per-stratum rounding
pub(crate) fn split_positions(
    dataset: &Dataset,
    train_fraction: f64,
    strata: Option<&str>,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(KolosalError::InvalidFraction(train_fraction));
    }
    if dataset.n_rows() < 2 {
        return Err(KolosalError::InsufficientData(format!(
            "cannot split {} record(s)",
            dataset.n_rows()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for mut bucket in strata_buckets(dataset, strata)? {
        bucket.shuffle(&mut rng);
        let n_train = (train_fraction * bucket.len() as f64).round() as usize;
        let (head, tail) = bucket.split_at(n_train.min(bucket.len()));
        train.extend_from_slice(head);
        test.extend_from_slice(tail);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Split a dataset into training and testing allocations.
///
/// Each stratum is shuffled with a seeded RNG and contributes
/// `round(train_fraction × stratum size)` records to training.
pub fn initial_split(
    dataset: &Dataset,
    train_fraction: f64,
    strata: Option<&str>,
    seed: u64,
) -> Result<InitialSplit> {
    let (train, test) = split_positions(dataset, train_fraction, strata, seed)?;

    info!(
        train = train.len(),
        test = test.len(),
        strata = strata.unwrap_or("-"),
        "Initial split"
    );

    Ok(InitialSplit {
        training: dataset.take(&train),
        testing: dataset.take(&test),
        train_fraction,
        strata: strata.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use std::collections::HashSet;

    fn labeled(n: usize, positives: usize) -> Dataset {
        let labels: Vec<&str> = (0..n).map(|i| if i < positives { "Y" } else { "N" }).collect();
        Dataset::from_columns(vec![
            Column::numeric("x", (0..n).map(|i| i as f64).collect()),
            Column::categorical("inducted", labels),
        ])
        .unwrap()
    }

    #[test]
    fn test_split_is_partition() {
        let ds = labeled(100, 20);
        let split = initial_split(&ds, 0.75, Some("inducted"), 7).unwrap();

        let train: HashSet<_> = split.training().record_ids().iter().copied().collect();
        let test: HashSet<_> = split.testing().record_ids().iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(train.len(), 75);
    }

    #[test]
    fn test_split_keeps_class_ratio() {
        let ds = labeled(90, 30);
        let split = initial_split(&ds, 2.0 / 3.0, Some("inducted"), 1).unwrap();
        let positives = split
            .testing()
            .keys("inducted")
            .unwrap()
            .iter()
            .filter(|k| *k == "Y")
            .count();
        assert_eq!(positives, 10);
    }

    #[test]
    fn test_split_deterministic() {
        let ds = labeled(50, 10);
        let a = initial_split(&ds, 0.5, Some("inducted"), 99).unwrap();
        let b = initial_split(&ds, 0.5, Some("inducted"), 99).unwrap();
        assert_eq!(a.training().record_ids(), b.training().record_ids());
    }

    #[test]
    fn test_invalid_fraction() {
        let ds = labeled(10, 5);
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = initial_split(&ds, bad, None, 0).unwrap_err();
            assert!(matches!(err, KolosalError::InvalidFraction(_)));
        }
    }

    #[test]
    fn test_tiny_stratum_rejected() {
        let ds = labeled(10, 1);
        let err = initial_split(&ds, 0.5, Some("inducted"), 0).unwrap_err();
        assert!(matches!(err, KolosalError::InsufficientData(_)));
    }
}
