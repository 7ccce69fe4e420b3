//! Kolosal Workflow CLI Module
//!
//! Command-line interface for tuning, scoring and inspecting data.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ExperimentConfig;
use crate::data::{read_csv, ColumnData, Dataset};
use crate::finalize::{finalize_workflow, last_fit};
use crate::model::ModelFamily;
use crate::resampling::{initial_split, Resamples};
use crate::scoring::score;
use crate::tune::{Grid, GridStrategy, Tuner};
use crate::workflow::FitResult;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "-".to_string()
    } else {
        format!("{:.4}", v)
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-workflow")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resampled hyperparameter tuning for tabular classifiers")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split, tune, finalize and evaluate on held-out data
    Tune {
        /// Labeled input file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Outcome column name
        #[arg(short, long)]
        target: String,

        /// Identifier columns, kept out of the predictors
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Experiment configuration (JSON); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model family (logistic, forest)
        #[arg(short, long)]
        model: Option<String>,

        /// Grid levels per tuned parameter
        #[arg(long)]
        levels: Option<usize>,

        /// Number of cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Worker threads, 0 for one per core
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Output model file
        #[arg(short, long, default_value = "model.json")]
        output: PathBuf,
    },

    /// Score unlabeled data with a fitted model
    Score {
        /// Fitted model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Keep only records at or above this probability
        #[arg(long)]
        threshold: Option<f64>,

        /// Rows to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Output scored table (CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,
    },
}

/// Overrides for [`cmd_tune`] taken from the command line
#[derive(Debug, Default)]
pub struct TuneArgs {
    pub config: Option<PathBuf>,
    pub ids: Vec<String>,
    pub model: Option<String>,
    pub levels: Option<usize>,
    pub folds: Option<usize>,
    pub jobs: Option<usize>,
    pub seed: Option<u64>,
}

fn delimiter_byte(delimiter: char) -> anyhow::Result<u8> {
    u8::try_from(delimiter).map_err(|_| anyhow::anyhow!("Delimiter must be a single byte: {:?}", delimiter))
}

fn parse_family(name: &str) -> anyhow::Result<ModelFamily> {
    match name {
        "logistic" | "logistic_regression" => Ok(ModelFamily::LogisticRegression),
        "forest" | "random_forest" => Ok(ModelFamily::RandomForest),
        _ => anyhow::bail!("Invalid model type: {}", name),
    }
}

fn load(path: &Path, delimiter: char) -> anyhow::Result<Dataset> {
    step_run("Loading data");
    let start = Instant::now();
    let data = read_csv(path, delimiter_byte(delimiter)?)?;
    step_done(&format!("{} rows × {} cols in {:?}", data.n_rows(), data.n_cols(), start.elapsed()));
    Ok(data)
}

/// Build the experiment configuration from an optional file and CLI flags
pub fn experiment_config(target: &str, args: &TuneArgs) -> anyhow::Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_file(path)?,
        None => ExperimentConfig::default(),
    };
    config.outcome = target.to_string();
    for id in &args.ids {
        if !config.identifiers.contains(id) {
            config.identifiers.push(id.clone());
        }
    }
    if config.strata.is_none() {
        config.strata = Some(target.to_string());
    }
    if let Some(model) = &args.model {
        config.model = parse_family(model)?;
    }
    if let Some(levels) = args.levels {
        config.grid = GridStrategy::Regular { levels };
    }
    if let Some(folds) = args.folds {
        config.folds = folds;
    }
    if let Some(jobs) = args.jobs {
        config.parallelism = jobs;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_tune(
    data_path: &Path,
    target: &str,
    args: &TuneArgs,
    delimiter: char,
    output: &Path,
) -> anyhow::Result<()> {
    section("Tune");

    let config = experiment_config(target, args)?;
    let data = load(data_path, delimiter)?;

    let split = initial_split(&data, config.train_fraction, config.strata.as_deref(), config.seed)?;
    let resamples = Resamples::vfold(
        split.training(),
        config.folds,
        config.repeats,
        config.strata.as_deref(),
        config.seed,
    )?;
    kv("Training", &split.training().n_rows().to_string());
    kv("Testing", &split.testing().n_rows().to_string());
    kv("Resamples", &resamples.len().to_string());

    let workflow = config.workflow()?;
    let space = workflow.finalize_parameters(split.training())?;
    let candidates = Grid::generate(&space, &config.grid, config.seed)?;
    kv("Model", &config.model.to_string());
    kv("Candidates", &candidates.len().to_string());

    step_run(&format!("Tuning {}", config.model.to_string().cyan()));
    let start = Instant::now();
    let results = Tuner::new(config.tune_config()).tune(
        &workflow,
        &candidates,
        &resamples,
        &config.metric_set(),
    )?;
    step_done(&format!("{} records in {:?}", results.records().len(), start.elapsed()));

    section(&format!("Top candidates by {}", config.select_by));
    println!(
        "  {:<12} {:>10} {:>10} {:>6}  {}",
        muted("Candidate"),
        muted("Mean"),
        muted("Std err"),
        muted("n"),
        muted("Parameters")
    );
    for summary in results.show_best(config.select_by, 10, config.tie_break)? {
        let params: Vec<String> = summary
            .params
            .iter()
            .map(|(k, v)| format!("{}={:.4e}", k, v))
            .collect();
        println!(
            "  {:<12} {:>10} {:>10} {:>6}  {}",
            format!("Candidate{:02}", summary.candidate_id),
            fmt_value(summary.mean),
            fmt_value(summary.std_err),
            summary.n,
            dim(&params.join(" "))
        );
    }

    let excluded = results.excluded();
    if !excluded.is_empty() {
        section("Excluded");
        for (candidate, failures) in excluded {
            for failure in failures {
                println!("  {:<12} {:<12} {}", candidate.to_string(), failure.fold_id, failure.reason.red());
            }
        }
    }

    let best = if config.one_std_err {
        results.select_by_one_std_err(config.select_by)?
    } else {
        results.select_best(config.select_by, config.tie_break)?
    };

    step_run(&format!("Last fit with {}", best.to_string().cyan()));
    let start = Instant::now();
    let concrete = finalize_workflow(&workflow, &best)?;
    let evaluation = last_fit(concrete, split, &config.metric_set())?;
    step_done(&format!("{:?}", start.elapsed()));

    section("Held-out metrics");
    for (metric, value) in evaluation.metrics() {
        println!("  {:<16} {}", muted(metric.name()), fmt_value(*value).white().bold());
    }
    println!("  {:<16} {}", muted("roc points"), evaluation.roc().points.len());
    println!();
    println!("{}", evaluation.confusion());

    evaluation.fit().save(output)?;
    println!();
    println!("  {} {}", ok("✓"), format!("Saved → {}", output.display()));
    println!();
    Ok(())
}

pub fn cmd_score(
    model_path: &Path,
    data_path: &Path,
    threshold: Option<f64>,
    top: usize,
    delimiter: char,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Score");

    step_run("Loading model");
    let fit = FitResult::load(model_path)?;
    step_done(&fit.levels().positive);

    let data = load(data_path, delimiter)?;
    let mut table = score(&fit, &data)?;
    if let Some(t) = threshold {
        table = table.above(t);
    }

    println!();
    let mut header = format!("  {:<8}", muted("Record"));
    for name in table.identifier_names() {
        header.push_str(&format!(" {:<16}", muted(name)));
    }
    header.push_str(&format!(" {:>10}", muted(&table.probability_column())));
    println!("{}", header);
    for row in table.rows().iter().take(top) {
        let mut line = format!("  {:<8}", row.record_id);
        for id in &row.identifiers {
            line.push_str(&format!(" {:<16}", id));
        }
        line.push_str(&format!(" {:>10.4}", row.probability));
        println!("{}", line);
    }
    kv("Records", &table.len().to_string());

    if let Some(path) = output {
        table.write_csv(path)?;
        println!("  {} {}", ok("✓"), format!("Saved → {}", path.display()));
    }
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path, delimiter: char) -> anyhow::Result<()> {
    section("Data Info");

    let data = read_csv(data_path, delimiter_byte(delimiter)?)?;

    kv("File", &data_path.display().to_string());
    kv("Rows", &data.n_rows().to_string());
    kv("Columns", &data.n_cols().to_string());
    println!();

    println!("  {:<20} {:<12} {:>8} {:>8}", muted("Column"), muted("Type"), muted("Missing"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(52)));

    for column in data.columns() {
        let (missing, unique) = match column.data() {
            ColumnData::Numeric(v) => (
                v.iter().filter(|x| x.is_nan()).count(),
                v.iter().map(|x| x.to_bits()).collect::<BTreeSet<_>>().len(),
            ),
            ColumnData::Categorical(v) => (
                v.iter().filter(|s| s.is_empty()).count(),
                v.iter().collect::<BTreeSet<_>>().len(),
            ),
        };
        println!(
            "  {:<20} {:<12} {:>8} {:>8}",
            column.name(),
            format!("{:?}", column.field_type()).truecolor(140, 140, 140),
            missing,
            unique
        );
    }

    println!();
    Ok(())
}
