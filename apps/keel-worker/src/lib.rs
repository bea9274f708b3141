pub mod breaker;
mod error;
pub mod refresh;

pub use error::{Error, Result};

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keel_providers::EmbeddingClient;
use keel_storage::Db;

use crate::breaker::{CircuitBreaker, SystemClock};

#[derive(Debug, Parser)]
#[command(
	version = keel_cli::VERSION,
	rename_all = "kebab",
	styles = keel_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
	/// Report the stale backlog and estimated provider spend, then exit without
	/// writing anything.
	#[arg(long)]
	pub dry_run: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = keel_config::load(&args.config)?;
	let filter = EnvFilter::try_new(&config.service.log_level)
		.unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let backend = Arc::new(EmbeddingClient::new(&config.providers.embedding)?);
	let clock = SystemClock;
	let mut breaker = CircuitBreaker::new(&config.worker);
	let dry_run = args.dry_run || config.worker.dry_run;

	if dry_run {
		let report =
			refresh::run_once(&db, &backend, &mut breaker, &clock, &config.worker, true).await?;

		tracing::info!(
			stale = report.scanned,
			estimated_tokens = report.estimated_tokens,
			estimated_cost = report.estimated_cost,
			"Dry run complete."
		);

		return Ok(());
	}

	loop {
		match refresh::run_once(&db, &backend, &mut breaker, &clock, &config.worker, false).await {
			Ok(report) if report.scanned > 0 => {
				tracing::info!(
					scanned = report.scanned,
					refreshed = report.refreshed,
					parked = report.parked,
					deferred = report.deferred,
					"Refresh pass complete."
				);
			},
			Ok(_) => {},
			Err(err) => {
				tracing::error!(error = %err, "Refresh pass failed.");
			},
		}

		tokio::time::sleep(Duration::from_millis(config.worker.poll_interval_ms)).await;
	}
}
