//! Candidate generation over a parameter space

use crate::error::{KolosalError, Result};
use crate::model::{ParameterSpace, TuneRange};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One concrete assignment of every tunable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// 1-based position in generation order
    pub id: usize,
    pub values: BTreeMap<String, f64>,
}

impl Candidate {
    pub fn new(id: usize, values: BTreeMap<String, f64>) -> Self {
        Self { id, values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate{:02}", self.id)
    }
}

/// How candidates are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridStrategy {
    /// `levels` evenly spaced values per tunable, full factorial
    Regular { levels: usize },
    /// Space-filling design of `size` candidates
    LatinHypercube { size: usize },
    /// `size` uniform draws in transformed space
    Random { size: usize },
    /// Caller-supplied assignments
    Explicit(Vec<BTreeMap<String, f64>>),
}

impl Default for GridStrategy {
    fn default() -> Self {
        GridStrategy::Regular { levels: 5 }
    }
}

fn tunable_bounds(space: &ParameterSpace) -> Result<Vec<(String, TuneRange, f64, f64)>> {
    space
        .tunables()
        .map(|(name, range)| {
            let (lo, hi) = range.transformed_bounds(name)?;
            Ok((name.to_string(), *range, lo, hi))
        })
        .collect()
}

fn require_positive(name: &str, n: usize) -> Result<()> {
    if n == 0 {
        return Err(KolosalError::invalid_parameter(name, n, "must be positive"));
    }
    Ok(())
}

fn number(rows: Vec<BTreeMap<String, f64>>) -> Vec<Candidate> {
    rows.into_iter()
        .enumerate()
        .map(|(i, values)| Candidate::new(i + 1, values))
        .collect()
}

/// Grid constructors
pub struct Grid;

impl Grid {
    /// Generate candidates with `strategy`; `seed` drives sampled designs
    pub fn generate(space: &ParameterSpace, strategy: &GridStrategy, seed: u64) -> Result<Vec<Candidate>> {
        match strategy {
            GridStrategy::Regular { levels } => Self::regular(space, *levels),
            GridStrategy::LatinHypercube { size } => Self::latin_hypercube(space, *size, seed),
            GridStrategy::Random { size } => Self::random(space, *size, seed),
            GridStrategy::Explicit(rows) => Ok(Self::explicit(rows.clone())),
        }
    }

    /// Full factorial of `levels` evenly spaced values per tunable.
    ///
    /// Integer parameters are rounded and repeated levels dropped. The first
    /// declared tunable varies slowest.
    pub fn regular(space: &ParameterSpace, levels: usize) -> Result<Vec<Candidate>> {
        require_positive("levels", levels)?;
        let mut rows = vec![BTreeMap::new()];

        for (name, range, lo, hi) in tunable_bounds(space)? {
            let mut values: Vec<f64> = (0..levels)
                .map(|i| {
                    let t = if levels == 1 {
                        0.0
                    } else {
                        i as f64 / (levels - 1) as f64
                    };
                    range.from_transformed(lo + t * (hi - lo))
                })
                .collect();
            values.dedup();

            let mut expanded = Vec::with_capacity(rows.len() * values.len());
            for row in &rows {
                for &v in &values {
                    let mut next = row.clone();
                    next.insert(name.clone(), v);
                    expanded.push(next);
                }
            }
            rows = expanded;
        }

        Ok(number(rows))
    }

    /// Latin hypercube design of `size` candidates.
    ///
    /// Each dimension's transformed range is cut into `size` equal strata;
    /// a random permutation assigns every candidate its own stratum and the
    /// value is drawn uniformly inside it.
    pub fn latin_hypercube(space: &ParameterSpace, size: usize, seed: u64) -> Result<Vec<Candidate>> {
        require_positive("size", size)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut rows = vec![BTreeMap::new(); size];

        for (name, range, lo, hi) in tunable_bounds(space)? {
            let mut strata: Vec<usize> = (0..size).collect();
            strata.shuffle(&mut rng);
            for (row, stratum) in rows.iter_mut().zip(strata) {
                let u = (stratum as f64 + rng.gen::<f64>()) / size as f64;
                row.insert(name.clone(), range.from_transformed(lo + u * (hi - lo)));
            }
        }

        Ok(number(rows))
    }

    /// `size` independent uniform draws in transformed space
    pub fn random(space: &ParameterSpace, size: usize, seed: u64) -> Result<Vec<Candidate>> {
        require_positive("size", size)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let bounds = tunable_bounds(space)?;

        let rows = (0..size)
            .map(|_| {
                bounds
                    .iter()
                    .map(|(name, range, lo, hi)| {
                        let u: f64 = rng.gen();
                        (name.clone(), range.from_transformed(lo + u * (hi - lo)))
                    })
                    .collect()
            })
            .collect();

        Ok(number(rows))
    }

    /// Caller-supplied assignments, numbered in order
    pub fn explicit(rows: Vec<BTreeMap<String, f64>>) -> Vec<Candidate> {
        number(rows)
    }

    /// `n` values of one parameter evenly spaced in log10 space from
    /// `10^from` to `10^to`
    pub fn log_sequence(name: &str, from: f64, to: f64, n: usize) -> Vec<Candidate> {
        let rows = (0..n)
            .map(|i| {
                let t = if n <= 1 {
                    0.0
                } else {
                    i as f64 / (n - 1) as f64
                };
                let mut row = BTreeMap::new();
                row.insert(name.to_string(), 10f64.powf(from + t * (to - from)));
                row
            })
            .collect();
        number(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, ParamSlot};

    fn forest_space() -> ParameterSpace {
        ModelSpec::random_forest()
            .set("mtry", ParamSlot::tune())
            .unwrap()
            .set("min_n", ParamSlot::tune())
            .unwrap()
            .parameters()
            .finalize(3)
            .unwrap()
    }

    #[test]
    fn test_regular_integer_dedup() {
        let grid = Grid::regular(&forest_space(), 5).unwrap();
        // mtry 1..3 collapses to {1, 2, 3}; min_n 2..40 keeps 5 levels
        assert_eq!(grid.len(), 15);
        assert_eq!(grid[0].id, 1);
        assert_eq!(grid[0].get("mtry"), Some(1.0));
        assert_eq!(grid[0].get("min_n"), Some(2.0));
        assert_eq!(grid[14].get("mtry"), Some(3.0));
        assert_eq!(grid[14].get("min_n"), Some(40.0));
    }

    #[test]
    fn test_regular_log_scale() {
        let space = ModelSpec::logistic_regression()
            .set("penalty", ParamSlot::tune())
            .unwrap()
            .parameters()
            .clone();
        let grid = Grid::regular(&space, 3).unwrap();
        let values: Vec<f64> = grid.iter().map(|c| c.get("penalty").unwrap()).collect();
        assert!((values[0] - 1e-10).abs() < 1e-20);
        assert!((values[1] - 1e-5).abs() < 1e-15);
        assert!((values[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfinalized_space_rejected() {
        let space = ModelSpec::random_forest()
            .set("mtry", ParamSlot::tune())
            .unwrap()
            .parameters()
            .clone();
        assert!(matches!(
            Grid::regular(&space, 3),
            Err(KolosalError::ConfigError(_))
        ));
    }

    #[test]
    fn test_sampled_designs_deterministic() {
        let space = forest_space();
        assert_eq!(
            Grid::latin_hypercube(&space, 6, 9).unwrap(),
            Grid::latin_hypercube(&space, 6, 9).unwrap()
        );
        let random = Grid::random(&space, 4, 1).unwrap();
        assert_eq!(random.len(), 4);
        assert_eq!(random, Grid::random(&space, 4, 1).unwrap());
        for c in &random {
            let mtry = c.get("mtry").unwrap();
            assert!((1.0..=3.0).contains(&mtry));
        }
    }

    #[test]
    fn test_log_sequence() {
        let grid = Grid::log_sequence("penalty", -4.0, -1.0, 30);
        assert_eq!(grid.len(), 30);
        assert!((grid[0].get("penalty").unwrap() - 1e-4).abs() < 1e-16);
        assert!((grid[29].get("penalty").unwrap() - 0.1).abs() < 1e-14);
        assert_eq!(grid[29].id, 30);
    }

    #[test]
    fn test_zero_levels() {
        assert!(Grid::regular(&forest_space(), 0).is_err());
    }
}
