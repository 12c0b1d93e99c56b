//! Change poller
//!
//! Queries the review server for changes requesting trybots and tests each
//! one on every configured builder, reporting the verdict back on the
//! change. Any failure ends the loop; the operator is expected to notice
//! the exited process rather than have the dispatcher degrade silently.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use trybot_core::domain::builder::BuilderType;
use trybot_core::domain::change::Change;
use trybot_core::domain::result::TestResult;

use crate::config::Config;
use crate::repository::ReviewRepository;
use crate::service::{ArchiveFetcher, Dispatcher, Report, Reporter};

/// Filter selecting open changes that asked for trybots and have no verdict yet
pub fn change_query(repo: &str) -> String {
    format!(
        "project:{} status:open label:Run-TryBot+1 -label:TryBot-Result-1 -label:TryBot-Result+1",
        repo
    )
}

/// Drives archive fetch, dispatch and reporting for changes or revisions
pub struct ChangePoller {
    query: String,
    builders: Vec<BuilderType>,
    poll_interval: Duration,
    review: Arc<dyn ReviewRepository>,
    reporter: Reporter,
    fetcher: ArchiveFetcher,
    dispatcher: Dispatcher,
}

impl ChangePoller {
    pub fn new(
        config: &Config,
        review: Arc<dyn ReviewRepository>,
        fetcher: ArchiveFetcher,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            query: change_query(&config.repo),
            builders: config.builders.clone(),
            poll_interval: config.poll_interval,
            reporter: Reporter::new(Arc::clone(&review)),
            review,
            fetcher,
            dispatcher,
        }
    }

    /// Starts the polling loop; returns only on error
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting change poller (interval: {:?}, {} builder(s))",
            self.poll_interval,
            self.builders.len()
        );

        // A change can take hours; missed ticks must not pile up behind it
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            debug!("Polling for changes");

            let tested = self.poll_once().await?;
            if tested > 0 {
                info!("Tested {} change(s) this cycle", tested);
            }
        }
    }

    /// Performs a single poll cycle, testing every pending change in turn
    ///
    /// Returns the number of changes tested.
    pub async fn poll_once(&self) -> Result<usize> {
        let changes = self
            .review
            .query_changes(&self.query)
            .await
            .context("Failed to query changes")?;

        if changes.is_empty() {
            debug!("No changes awaiting trybots");
            return Ok(0);
        }

        info!("Found {} change(s) awaiting trybots", changes.len());

        let mut tested = 0;
        for change in &changes {
            if change.current_revision.is_empty() {
                warn!("Skipping {}: no current revision", change);
                continue;
            }
            self.test_change(change).await?;
            tested += 1;
        }

        Ok(tested)
    }

    /// Tests one change and posts the verdict on its current revision
    pub async fn test_change(&self, change: &Change) -> Result<Report> {
        info!("Testing {}", change);

        self.reporter
            .comment_beginning(change)
            .await
            .with_context(|| format!("Failed to post starting notice on {}", change))?;

        let results = self.run_revision(&change.current_revision).await?;

        let report = self
            .reporter
            .comment_results(change, &results)
            .await
            .with_context(|| format!("Failed to post results on {}", change))?;

        Ok(report)
    }

    /// Fetches `revision` and tests it on every builder, without reporting
    pub async fn run_revision(&self, revision: &str) -> Result<Vec<TestResult>> {
        let archive = self
            .fetcher
            .fetch(revision)
            .await
            .with_context(|| format!("Failed to fetch archive for {}", revision))?;

        Ok(self.dispatcher.dispatch(&archive, &self.builders).await)
    }
}
