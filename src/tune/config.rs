//! Tuning configuration

use crate::metrics::DEFAULT_THRESHOLD;
use serde::{Deserialize, Serialize};

/// Configuration for a tuning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    /// Worker threads; 0 uses one per available core
    pub parallelism: usize,

    /// Log every finished job at info level instead of debug
    pub verbose: bool,

    /// Probability threshold for class metrics
    pub threshold: f64,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            verbose: false,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl TuneConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the number of worker threads
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    /// Builder method to toggle per-job logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builder method to set the class threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TuneConfig::default();
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.threshold, 0.5);
    }

    #[test]
    fn test_builder() {
        let config = TuneConfig::new().with_parallelism(4).with_verbose(true);
        assert_eq!(config.parallelism, 4);
        assert!(config.verbose);
    }
}
