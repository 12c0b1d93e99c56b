//! Fan-out dispatcher
//!
//! Runs one worker run per builder type concurrently and waits for all of
//! them before returning.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info};
use trybot_core::domain::archive::Archive;
use trybot_core::domain::builder::BuilderType;
use trybot_core::domain::result::TestResult;

use crate::service::worker_run::TestRunner;

/// Dispatches an archive to many builders at once
pub struct Dispatcher {
    runner: Arc<TestRunner>,
    limit: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Creates a dispatcher
    ///
    /// # Arguments
    /// * `runner` - Runs a single builder
    /// * `max_parallel_runs` - Optional cap on simultaneous runs; `None` runs
    ///   every builder at once
    pub fn new(runner: TestRunner, max_parallel_runs: Option<usize>) -> Self {
        Self {
            runner: Arc::new(runner),
            limit: max_parallel_runs.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Tests `archive` on every builder in `builders`
    ///
    /// Returns one result per builder, in completion order, once every run
    /// has finished.
    pub async fn dispatch(&self, archive: &Archive, builders: &[BuilderType]) -> Vec<TestResult> {
        info!(
            "Dispatching {} to {} builder(s)",
            archive.revision(),
            builders.len()
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(builders.len());

        for builder in builders {
            let runner = Arc::clone(&self.runner);
            let limit = self.limit.clone();
            let archive = archive.clone();
            let tx = tx.clone();
            let task_builder = builder.clone();

            let handle = tokio::spawn(async move {
                // Permit is released when dropped
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let result = runner.run(&task_builder, &archive).await;
                let _ = tx.send(result);
            });
            handles.push((builder.clone(), handle));
        }
        drop(tx);

        // A task that died never reported; give it a failed result so every
        // builder still gets a row
        let mut lost = Vec::new();
        for (builder, handle) in handles {
            if let Err(e) = handle.await {
                error!("{}: worker run task failed: {}", builder, e);
                lost.push(builder);
            }
        }

        let mut results = Vec::with_capacity(builders.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        let now = Utc::now();
        results.extend(lost.into_iter().map(|builder| TestResult {
            builder_type: builder,
            log_locator: String::new(),
            succeeded: false,
            started_at: now,
            finished_at: now,
        }));

        let passed = results.iter().filter(|r| r.succeeded).count();
        info!(
            "Finished {}: {}/{} builder(s) passed",
            archive.revision(),
            passed,
            results.len()
        );

        results
    }
}
