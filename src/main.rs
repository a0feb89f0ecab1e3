//! Insurance Models - Main Entry Point
//!
//! Runs the claim risk, severity and margin modeling pipeline from the command line.

use clap::Parser;
use insurance_models::cli::{cmd_run, cmd_schema, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insurance_models=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            target,
            encoding,
            scaling,
            test_fraction,
            seed,
            exclude,
            all_rows,
            n_estimators,
            json,
        } => {
            cmd_run(
                &data,
                target,
                encoding,
                scaling,
                test_fraction,
                seed,
                &exclude,
                all_rows,
                n_estimators,
                json,
            )?;
        }
        Commands::Schema => {
            cmd_schema()?;
        }
    }

    Ok(())
}
