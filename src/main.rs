//! Kolosal Workflow - Main Entry Point

use clap::Parser;
use kolosal_workflow::cli::{cmd_info, cmd_score, cmd_tune, Cli, Commands, TuneArgs};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_workflow=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tune {
            data,
            target,
            ids,
            config,
            model,
            levels,
            folds,
            jobs,
            seed,
            delimiter,
            output,
        } => {
            let args = TuneArgs {
                config,
                ids,
                model,
                levels,
                folds,
                jobs,
                seed,
            };
            cmd_tune(&data, &target, &args, delimiter, &output)?;
        }
        Commands::Score {
            model,
            data,
            threshold,
            top,
            delimiter,
            output,
        } => {
            cmd_score(&model, &data, threshold, top, delimiter, output.as_deref())?;
        }
        Commands::Info { data, delimiter } => {
            cmd_info(&data, delimiter)?;
        }
    }

    Ok(())
}
