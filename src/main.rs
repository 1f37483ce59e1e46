//! `version-checkr`: compare locked package versions across a fleet of repositories.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and set up logging ([`logging`]).
//! 2. Load the config and apply defaults ([`config::load_config`]).
//! 3. Build provider clients ([`provider::ProviderRegistry`]).
//! 4. Scan every repository concurrently ([`generator::ReportGenerator`]), each
//!    through the analyzer its config names ([`analyzer`]).
//! 5. Render the report ([`report`]) as a table or JSON.
//! 6. Exit `0`, or `1` under `--strict` when any repository failed.

mod analyzer;
mod cli;
mod config;
mod error;
mod generator;
mod logging;
mod models;
mod provider;
mod report;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use cli::{Cli, ReportFormat};
use config::load_config;
use generator::ReportGenerator;
use provider::ProviderRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    let config = load_config(cli.config.as_deref())?;
    let repositories = config.resolve_repositories()?;

    if repositories.is_empty() {
        eprintln!("No repositories configured");
        std::process::exit(1);
    }

    let providers = ProviderRegistry::from_config(&config.providers)?;

    // Ctrl-C and the optional deadline both cancel the whole run
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = cli.timeout.or(config.settings.timeout_secs) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(secs, "timeout reached");
            cancel.cancel();
        });
    }

    let mut generator = ReportGenerator::new(providers)
        .with_max_concurrency(cli.max_concurrency.or(config.settings.max_concurrency));

    let pb = if !cli.quiet {
        let pb = ProgressBar::new(repositories.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} repositories",
                )?
                .progress_chars("#>-"),
        );
        generator = generator.with_progress(pb.clone());
        Some(pb)
    } else {
        None
    };

    let result = generator.generate(&cancel, &repositories).await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = result?;

    match cli.format {
        ReportFormat::Terminal => {
            report::terminal::render(&report, cli.verbose, cli.quiet);
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if cli.strict && report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}
