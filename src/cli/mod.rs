//! Insurance Models CLI Module
//!
//! Command-line interface for running the modeling pipeline on a cleaned CSV.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::evaluation::MetricKind;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
use crate::preprocessing::{EncodingStrategy, ScalingStrategy};
use crate::schema::AttributeSchema;
use crate::target::TargetType;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

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

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "insurance-models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Claim risk, severity and margin models for motor insurance data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and evaluate all model families for one target
    Run {
        /// Cleaned input data (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Target type (risk, severity, margin)
        #[arg(short, long)]
        target: TargetType,

        /// Categorical encoding (label_index, one_hot, identity)
        #[arg(long, default_value = "one_hot")]
        encoding: EncodingStrategy,

        /// Numeric scaling (standardize, min_max, log1p, identity)
        #[arg(long, default_value = "standardize")]
        scaling: ScalingStrategy,

        /// Share of rows held out for evaluation
        #[arg(long, default_value = "0.2")]
        test_fraction: f64,

        /// Random seed for the split and the models
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Columns never used as features
        #[arg(long = "exclude", num_args = 1..)]
        exclude: Vec<String>,

        /// Keep rows without a claim in severity runs
        #[arg(long)]
        all_rows: bool,

        /// Number of trees for the ensemble and the booster
        #[arg(long)]
        n_estimators: Option<usize>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default attribute schema as JSON
    Schema,
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        _ => anyhow::bail!("Unsupported file format: {}", ext),
    };

    Ok(df)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_run(
    data_path: &Path,
    target: TargetType,
    encoding: EncodingStrategy,
    scaling: ScalingStrategy,
    test_fraction: f64,
    seed: u64,
    exclude: &[String],
    all_rows: bool,
    n_estimators: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = PipelineConfig::new(target)
        .with_encoding(encoding)
        .with_scaling(scaling)
        .with_test_fraction(test_fraction)
        .with_seed(seed)
        .with_exclude_columns(exclude)
        .with_claims_only(!all_rows);
    if let Some(n) = n_estimators {
        config.training.n_estimators = n;
        config.training.boosting.n_estimators = n;
    }

    if json {
        let df = load_data(data_path)?;
        let outcome = Pipeline::new(config).run(&df, &AttributeSchema::insurance())?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    section(&format!("Run {}", target));

    step_run("Loading data");
    let start = Instant::now();
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Training {} with {} / {}", target, encoding.as_str().cyan(), scaling.as_str().cyan()));
    let start = Instant::now();
    let outcome = Pipeline::new(config).run(&df, &AttributeSchema::insurance())?;
    step_done(&format!(
        "{} train / {} test rows, {} features in {:?}",
        outcome.n_train,
        outcome.n_test,
        outcome.feature_names.len(),
        start.elapsed()
    ));

    print_comparison(&outcome);
    Ok(())
}

fn print_comparison(outcome: &PipelineOutcome) {
    let keys = MetricKind::for_target(outcome.target).keys();

    println!();
    print!("  {:<12}", muted("Model"));
    for key in keys {
        print!(" {:>12}", muted(key));
    }
    println!();
    println!("  {}", dim(&"─".repeat(12 + 13 * keys.len())));

    for r in &outcome.reports {
        print!("  {:<12}", r.family.as_str());
        for key in keys {
            match r.metric(key) {
                Some(v) => print!(" {:>12.4}", v),
                None => print!(" {:>12}", "-"),
            }
        }
        println!();
    }
    println!("  {}", dim(&"─".repeat(12 + 13 * keys.len())));

    if let Some(best) = outcome.best() {
        let key = keys.iter().find(|k| **k == "roc_auc" || **k == "rmse").copied().unwrap_or(keys[0]);
        println!();
        println!(
            "  {} {} {} {:.4}",
            ok("best"),
            best.family.as_str().white().bold(),
            muted(&format!("{}:", key)),
            best.metric(key).unwrap_or(f64::NAN)
        );
    }
    println!();
}

pub fn cmd_schema() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&AttributeSchema::insurance())?);
    Ok(())
}
