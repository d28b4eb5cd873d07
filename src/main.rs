//! nestcv - Main Entry Point
//!
//! Nested cross-validation comparison of regression model families.

use clap::Parser;
use nestcv::cli::{cmd_folds, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the reports
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nestcv=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { manifest, output, config, overrides } => {
            cmd_run(&manifest, &output, config.as_deref(), &overrides)?;
        }
        Commands::Folds { data, group, folds, seed } => {
            cmd_folds(&data, group.as_deref(), folds, seed)?;
        }
    }

    Ok(())
}
