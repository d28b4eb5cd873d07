//! nestcv CLI Module
//!
//! `run` evaluates every family of the default registry on each manifest
//! entry; `folds` prints the outer folds a run would use. Status lines go to
//! stderr so stdout only carries reports and fold listings.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::HarnessConfig;
use crate::evaluation::Metric;
use crate::families::default_registry;
use crate::harness::{render_report, run_all_models, RunRecord};
use crate::training::build_outer_folds;
use crate::utils::{DataLoader, RunManifest};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(240, 110, 110) }

fn step_run(msg: &str) {
    eprint!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    eprintln!("{} {}", ok("done"), dim(detail));
}

fn step_failed(detail: &str) {
    eprintln!("{} {}", bad("failed"), detail);
}

fn section(title: &str) {
    eprintln!();
    eprintln!("  {}", title.white().bold());
    eprintln!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "nestcv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Nested cross-validation comparison of regression model families")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides applied on top of the configuration file
#[derive(clap::Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Number of outer folds
    #[arg(long)]
    pub folds: Option<usize>,

    /// Run seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sequential-search trials per outer fold
    #[arg(long)]
    pub trials: Option<usize>,

    /// Ensemble search time budget per outer fold, in seconds
    #[arg(long)]
    pub time_budget: Option<f64>,

    /// Error metric (mae, medae, mse, rmse)
    #[arg(long)]
    pub metric: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate all model families on every manifest entry
    Run {
        /// JSON manifest listing the runs
        #[arg(short, long)]
        manifest: PathBuf,

        /// JSON file receiving the run records
        #[arg(short, long)]
        output: PathBuf,

        /// JSON harness configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Print the outer folds built for a data file
    Folds {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Column holding group ids
        #[arg(short, long)]
        group: Option<String>,

        /// Number of outer folds
        #[arg(long, default_value = "5")]
        folds: usize,

        /// Run seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Load the configuration file (or defaults) and apply CLI overrides
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<HarnessConfig> {
    let mut config = match path {
        Some(p) => HarnessConfig::from_json_file(p)?,
        None => HarnessConfig::default(),
    };
    if let Some(k) = overrides.folds {
        config.n_splits = k;
    }
    if let Some(seed) = overrides.seed {
        config.random_state = seed;
    }
    if let Some(trials) = overrides.trials {
        config.n_trials = trials;
    }
    if let Some(budget) = overrides.time_budget {
        config.ensemble_time_budget_secs = budget;
    }
    if let Some(metric) = &overrides.metric {
        config.metric = Metric::from_name(metric)?;
    }
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    manifest_path: &Path,
    output_path: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    section("Run");
    let config = resolve_config(config_path, overrides)?;
    let manifest = RunManifest::from_json_file(manifest_path)?;
    let loader = DataLoader::new();

    let mut records = Vec::with_capacity(manifest.runs.len());
    let mut failed = 0usize;
    for entry in &manifest.runs {
        step_run(&format!("Loading {}", entry.label.cyan()));
        let start = Instant::now();
        let data = match loader.load_entry(entry) {
            Ok(d) => d,
            Err(e) => {
                step_failed(&e.to_string());
                failed += 1;
                continue;
            }
        };
        step_done(&format!(
            "{} rows × {} covariates in {:?}",
            data.n_samples(),
            data.n_features(),
            start.elapsed()
        ));

        step_run(&format!("Evaluating {}", entry.label.cyan()));
        let start = Instant::now();
        let evaluators = default_registry(&config);
        match run_all_models(&data, &entry.label, &evaluators, &config) {
            Ok((table, folds)) => {
                step_done(&format!("{:?}", start.elapsed()));
                println!("{}", render_report(&entry.label, config.metric, &table));
                records.push(RunRecord::new(
                    entry.label.clone(),
                    entry.response.clone(),
                    config.metric,
                    table,
                    folds,
                ));
            }
            Err(e) => {
                step_failed(&e.to_string());
                failed += 1;
            }
        }
    }

    step_run("Writing results");
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(output_path, json)?;
    step_done(&output_path.display().to_string());

    if failed > 0 {
        anyhow::bail!("{} of {} runs failed", failed, manifest.runs.len());
    }
    Ok(())
}

pub fn cmd_folds(data_path: &Path, group: Option<&str>, n_splits: usize, seed: u64) -> anyhow::Result<()> {
    section("Folds");

    step_run("Loading data");
    let (n_rows, groups) = DataLoader::new().load_groups(data_path, group)?;
    step_done(&format!("{} rows", n_rows));

    let folds = build_outer_folds(n_rows, groups.as_ref(), n_splits, seed)?;
    for split in &folds {
        let rows: Vec<String> = split.test_indices.iter().map(|i| i.to_string()).collect();
        println!(
            "fold {} (train {} | test {}): {}",
            split.fold_idx,
            split.train_indices.len(),
            split.test_indices.len(),
            rows.join(" ")
        );
    }
    Ok(())
}
