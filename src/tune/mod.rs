//! Grid generation and resampled tuning

pub mod cancel;
pub mod config;
pub mod engine;
pub mod grid;

pub use cancel::CancellationToken;
pub use config::TuneConfig;
pub use engine::{JobProgress, ProgressCallback, TuneResults, Tuner};
pub use grid::{Candidate, Grid, GridStrategy};
