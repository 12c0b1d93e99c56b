//! TryBot dispatcher
//!
//! Tests pending changes on a fleet of ephemeral build workers and reports
//! the outcome back on the review server.
//!
//! Architecture:
//! - Configuration: resolved once from flags and environment
//! - Repositories: seams over the review server, source host, storage and
//!   worker coordinator
//! - Services: archive fetch, live logs, worker runs, fan-out, reporting
//! - Scheduler: poll loop and one-shot mode
//!
//! Without `--revision` the dispatcher polls the review server forever and
//! exits on the first error. With `--revision` it tests that revision once,
//! prints a summary and exits.

mod config;
mod repository;
mod scheduler;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trybot_client::{CoordinatorClient, GerritClient, SourceClient, StorageClient};
use trybot_core::domain::builder::{BuilderRegistry, select_builders};
use trybot_core::domain::result::{TestResult, Verdict};

use crate::config::Config;
use crate::repository::{
    CoordinatorWorkerProvider, GcsObjectStore, GerritReviewRepository, HttpArchiveSource,
};
use crate::scheduler::ChangePoller;
use crate::service::{ArchiveFetcher, Dispatcher, LogSinks, StageTimeouts, TestRunner};

#[derive(Parser)]
#[command(name = "trybot")]
#[command(about = "Run trybots for pending changes on ephemeral build workers", long_about = None)]
struct Cli {
    /// Review server URL
    #[arg(
        long,
        env = "TRYBOT_GERRIT_URL",
        default_value = "https://team-review.googlesource.com"
    )]
    gerrit: String,

    /// Source server URL
    #[arg(
        long,
        env = "TRYBOT_SOURCE_URL",
        default_value = "https://team.googlesource.com"
    )]
    source: String,

    /// Repository name
    #[arg(long, env = "TRYBOT_REPO", default_value = "golang/go-private")]
    repo: String,

    /// Bucket for live logs (logs go to stdout when unset)
    #[arg(long, env = "TRYBOT_GCS_BUCKET")]
    gcs: Option<String>,

    /// Revision to test once instead of polling
    #[arg(long)]
    revision: Option<String>,

    /// Comma separated builder types (defaults to the first class ports)
    #[arg(long, env = "TRYBOT_BUILDERS", default_value = "")]
    builders: String,

    /// Worker coordinator URL
    #[arg(
        long,
        env = "TRYBOT_COORDINATOR_URL",
        default_value = "http://localhost:8080"
    )]
    coordinator: String,

    /// Seconds between change queries
    #[arg(long, env = "TRYBOT_POLL_INTERVAL", default_value_t = 60)]
    poll_interval_secs: u64,

    /// Seconds between live log uploads
    #[arg(long, env = "TRYBOT_FLUSH_INTERVAL", default_value_t = 5)]
    flush_interval_secs: u64,

    /// Time limit for each worker stage other than test execution
    #[arg(long, env = "TRYBOT_STAGE_TIMEOUT", default_value_t = 600)]
    stage_timeout_secs: u64,

    /// Time limit for test execution
    #[arg(long, env = "TRYBOT_EXEC_TIMEOUT", default_value_t = 10_800)]
    exec_timeout_secs: u64,

    /// Cap on simultaneous worker runs per change
    #[arg(long, env = "TRYBOT_MAX_PARALLEL_RUNS")]
    max_parallel_runs: Option<usize>,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let builders = select_builders(&self.builders).context("Invalid --builders")?;

        Ok(Config {
            gerrit_url: self.gerrit,
            source_url: self.source,
            repo: self.repo,
            coordinator_url: self.coordinator,
            gcs_bucket: self.gcs,
            revision: self.revision,
            builders,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            log_flush_interval: Duration::from_secs(self.flush_interval_secs),
            timeouts: StageTimeouts {
                stage: Duration::from_secs(self.stage_timeout_secs),
                exec: Duration::from_secs(self.exec_timeout_secs),
            },
            max_parallel_runs: self.max_parallel_runs,
            access_token: std::env::var("TRYBOT_ACCESS_TOKEN").ok(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trybot_dispatcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config()?;
    config.validate()?;

    info!("Starting TryBot dispatcher for {}", config.repo);
    info!(
        "Builders: {}",
        config
            .builders
            .iter()
            .map(|b| b.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let poller = build_poller(&config);

    match &config.revision {
        Some(revision) => {
            let results = poller.run_revision(revision).await?;
            print_summary(revision, &results);
            Ok(())
        }
        None => {
            if let Err(e) = poller.run().await {
                error!("Poller error: {:#}", e);
                return Err(e);
            }
            Ok(())
        }
    }
}

/// Wires clients, repositories and services together
fn build_poller(config: &Config) -> ChangePoller {
    let token = config.access_token.as_deref();

    let mut gerrit = GerritClient::new(&config.gerrit_url);
    let mut source = SourceClient::new(&config.source_url);
    let mut storage = StorageClient::new();
    let mut coordinator = CoordinatorClient::new(&config.coordinator_url);
    if let Some(token) = token {
        gerrit = gerrit.with_token(token);
        source = source.with_token(token);
        storage = storage.with_token(token);
        coordinator = coordinator.with_token(token);
    }

    let sinks = match &config.gcs_bucket {
        Some(bucket) => {
            info!("Streaming logs to bucket {}", bucket);
            LogSinks::durable(
                Arc::new(GcsObjectStore::new(storage)),
                bucket.clone(),
                config.log_flush_interval,
            )
        }
        None => {
            info!("Streaming logs to stdout");
            LogSinks::console()
        }
    };

    let runner = TestRunner::new(
        Arc::new(CoordinatorWorkerProvider::new(coordinator)),
        Arc::new(BuilderRegistry::builtin()),
        Arc::new(sinks),
        config.timeouts,
    );

    ChangePoller::new(
        config,
        Arc::new(GerritReviewRepository::new(gerrit)),
        ArchiveFetcher::new(Arc::new(HttpArchiveSource::new(
            source,
            config.repo.clone(),
        ))),
        Dispatcher::new(runner, config.max_parallel_runs),
    )
}

/// Prints the one-shot outcome
fn print_summary(revision: &str, results: &[TestResult]) {
    println!();
    println!("{}", format!("Results for {}:", revision).bold());
    for result in results {
        let status = if result.succeeded {
            "pass".green()
        } else {
            "fail".red()
        };
        println!(
            "  {:<24} [{}] {:>6}s  {}",
            result.builder_type.as_str(),
            status,
            result.duration().num_seconds(),
            result.log_locator.dimmed()
        );
    }

    println!();
    match Verdict::from_results(results) {
        Verdict::Succeeded => println!("{}", "✓ Tests succeeded".green().bold()),
        Verdict::Failed => println!("{}", "✗ Tests failed".red().bold()),
    }
}
