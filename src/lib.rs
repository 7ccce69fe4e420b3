//! Kolosal Workflow - resampled hyperparameter tuning for tabular classifiers
//!
//! A preprocessing recipe and a parameterized model are bound into a
//! workflow, evaluated over a search grid on cross-validation folds, and the
//! selected candidate is refit once on the full training allocation and
//! evaluated on held-out data.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Columnar datasets, CSV loading, running statistics
//! - [`resampling`] - Stratified initial split, V-fold and validation resamples
//!
//! ## Modeling
//! - [`recipe`] - Preprocessing steps with a fit/apply lifecycle and field roles
//! - [`model`] - Model specs, parameter spaces, logistic regression and random forest
//! - [`workflow`] - Recipe plus model, materialized per candidate
//!
//! ## Tuning
//! - [`tune`] - Grid generation and the parallel tuning engine
//! - [`metrics`] - Classification metrics, aggregation and selection
//! - [`finalize`] - Rebinding the winner and the held-out evaluation
//! - [`scoring`] - Ranking unlabeled records by predicted probability
//!
//! ## Services
//! - [`config`] - Experiment configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod data;
pub mod resampling;

// Modeling
pub mod model;
pub mod recipe;
pub mod workflow;

// Tuning
pub mod finalize;
pub mod metrics;
pub mod scoring;
pub mod tune;

// Services
pub mod cli;
pub mod config;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Data
    pub use crate::data::{read_csv, write_csv, Column, Dataset, FieldType, Schema, Value};
    pub use crate::resampling::{initial_split, InitialSplit, Resamples};

    // Modeling
    pub use crate::model::{ModelFamily, ModelSpec, ParamSlot, ParameterSpace, TuneRange};
    pub use crate::recipe::{Recipe, Role, Selector, Step};
    pub use crate::workflow::{ConcreteWorkflow, FitResult, PredictMode, Predictions, Workflow};

    // Tuning
    pub use crate::finalize::{finalize_workflow, last_fit, LastFit};
    pub use crate::metrics::{ConfusionMatrix, MetricKind, MetricSet, RocCurve, TieBreak};
    pub use crate::scoring::{score, ScoredTable};
    pub use crate::tune::{
        CancellationToken, Candidate, Grid, GridStrategy, TuneConfig, TuneResults, Tuner,
    };

    // Configuration
    pub use crate::config::ExperimentConfig;
}
