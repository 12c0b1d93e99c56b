//! Worker run
//!
//! Drives one ephemeral worker through a complete test run for one builder
//! type:
//! create → bootstrap → stage source → execute → teardown.
//!
//! Every failure is contained here and turned into a failed [`TestResult`].
//! Once a worker has been created it is destroyed exactly once, whatever
//! happened in between.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info, warn};
use trybot_client::{ClientError, ExecStatus};
use trybot_core::domain::archive::Archive;
use trybot_core::domain::builder::{BuildConfig, BuilderRegistry, BuilderType};
use trybot_core::domain::result::TestResult;

use crate::repository::{Worker, WorkerProvider};
use crate::service::log_sink::{LiveLog, LogSinks, SinkError};

/// Directory the bootstrap toolchain is extracted into
const BOOTSTRAP_DIR: &str = "go1.4";

/// Directory the change archive is extracted into
const SOURCE_DIR: &str = "go";

/// Version marker written next to the source
const VERSION_FILE: &str = "go/VERSION";

/// Steps of a run that talk to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Bootstrap,
    UploadSource,
    WriteVersion,
    OpenLog,
    WorkDir,
    Execute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Create => "create worker",
            Stage::Bootstrap => "bootstrap worker",
            Stage::UploadSource => "upload change archive",
            Stage::WriteVersion => "upload VERSION file",
            Stage::OpenLog => "create live log",
            Stage::WorkDir => "retrieve work dir",
            Stage::Execute => "execute all tests",
        };
        f.write_str(name)
    }
}

/// Why a run failed
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("unknown builder type")]
    UnknownBuilder,

    #[error("could not allocate worker: {0}")]
    Allocation(#[source] ClientError),

    #[error("failed to {stage}: {source}")]
    Staging { stage: Stage, source: ClientError },

    #[error("failed to create live log: {0}")]
    LogSink(#[from] SinkError),

    #[error("failed to execute {script}: {source}")]
    Infrastructure { script: String, source: ClientError },

    #[error("tests failed: {0}")]
    TestsFailed(String),

    #[error("{stage} timed out after {limit:?}")]
    TimedOut { stage: Stage, limit: Duration },
}

impl RunFailure {
    fn staging(stage: Stage) -> impl FnOnce(ClientError) -> RunFailure {
        move |source| RunFailure::Staging { stage, source }
    }
}

/// Time limits for the stages of a run
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    /// Limit for every stage except execution (and for teardown)
    pub stage: Duration,
    /// Limit for the all-tests script
    pub exec: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            stage: Duration::from_secs(10 * 60),
            exec: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// Runs the test suite for one builder type on a fresh worker
pub struct TestRunner {
    workers: Arc<dyn WorkerProvider>,
    registry: Arc<BuilderRegistry>,
    sinks: Arc<LogSinks>,
    timeouts: StageTimeouts,
}

impl TestRunner {
    pub fn new(
        workers: Arc<dyn WorkerProvider>,
        registry: Arc<BuilderRegistry>,
        sinks: Arc<LogSinks>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            workers,
            registry,
            sinks,
            timeouts,
        }
    }

    /// Tests `archive` on `builder`; always yields exactly one result
    pub async fn run(&self, builder: &BuilderType, archive: &Archive) -> TestResult {
        let started_at = Utc::now();
        let (log_locator, outcome) = self.attempt(builder, archive).await;

        match &outcome {
            Ok(()) => info!("{}: tests succeeded", builder),
            Err(RunFailure::TestsFailed(reason)) => warn!("{}: tests failed: {}", builder, reason),
            Err(failure) => error!("{}: {}", builder, failure),
        }

        TestResult {
            builder_type: builder.clone(),
            log_locator,
            succeeded: outcome.is_ok(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Returns the log locator (empty if no log was opened) and the outcome
    async fn attempt(
        &self,
        builder: &BuilderType,
        archive: &Archive,
    ) -> (String, Result<(), RunFailure>) {
        let Some(config) = self.registry.get(builder) else {
            return (String::new(), Err(RunFailure::UnknownBuilder));
        };

        info!("{}: creating worker", builder);
        let limit = self.timeouts.stage;
        let workers = Arc::clone(&self.workers);
        let wanted = builder.clone();
        let mut create = Box::pin(async move { workers.create_worker(&wanted).await });

        let worker = match time::timeout(limit, &mut create).await {
            Ok(Ok(worker)) => worker,
            Ok(Err(e)) => return (String::new(), Err(RunFailure::Allocation(e))),
            Err(_) => {
                // The worker may still be allocated; whoever receives it destroys it
                tokio::spawn(reap_late_worker(builder.clone(), create, limit));
                let failure = RunFailure::TimedOut {
                    stage: Stage::Create,
                    limit,
                };
                return (String::new(), Err(failure));
            }
        };
        info!("{}: created worker ({})", builder, worker.name());

        let mut log_locator = String::new();
        let outcome = self
            .test_on_worker(builder, config, archive, worker.as_ref(), &mut log_locator)
            .await;

        teardown(builder, worker.as_ref(), self.timeouts.stage).await;
        (log_locator, outcome)
    }

    async fn test_on_worker(
        &self,
        builder: &BuilderType,
        config: &BuildConfig,
        archive: &Archive,
        worker: &dyn Worker,
        log_locator: &mut String,
    ) -> Result<(), RunFailure> {
        let limit = self.timeouts.stage;

        // Without a bootstrap URL the worker image is already bootstrapped
        match &config.bootstrap_url {
            Some(url) => {
                within(Stage::Bootstrap, limit, async {
                    worker
                        .put_archive_from_url(url, BOOTSTRAP_DIR)
                        .await
                        .map_err(RunFailure::staging(Stage::Bootstrap))
                })
                .await?;
            }
            None => debug!("{}: worker is pre-bootstrapped", builder),
        }

        within(Stage::UploadSource, limit, async {
            worker
                .put_archive(archive.bytes(), SOURCE_DIR)
                .await
                .map_err(RunFailure::staging(Stage::UploadSource))
        })
        .await?;

        let version = format!("devel {}", archive.revision());
        within(Stage::WriteVersion, limit, async {
            worker
                .put_file(version.as_bytes(), VERSION_FILE, 0o644)
                .await
                .map_err(RunFailure::staging(Stage::WriteVersion))
        })
        .await?;

        let log = within(Stage::OpenLog, limit, async {
            self.sinks
                .open(archive.revision(), builder, worker.name())
                .await
                .map_err(RunFailure::from)
        })
        .await?;
        *log_locator = log.locator().to_string();

        let outcome = self.execute(builder, config, worker, log.as_ref()).await;

        if let Err(e) = log.close().await {
            warn!("{}: failed to flush live log: {}", builder, e);
        }
        outcome
    }

    async fn execute(
        &self,
        builder: &BuilderType,
        config: &BuildConfig,
        worker: &dyn Worker,
        log: &dyn LiveLog,
    ) -> Result<(), RunFailure> {
        let work_dir = within(Stage::WorkDir, self.timeouts.stage, async {
            worker
                .work_dir()
                .await
                .map_err(RunFailure::staging(Stage::WorkDir))
        })
        .await?;

        let env = config.exec_env(&work_dir);
        let script = format!("{}/{}", SOURCE_DIR, config.all_script);
        info!("{}: starting {} {}", builder, script, log.locator());

        let status = within(Stage::Execute, self.timeouts.exec, async {
            worker
                .execute(&script, &config.all_script_args, &env, log)
                .await
                .map_err(|source| RunFailure::Infrastructure {
                    script: script.clone(),
                    source,
                })
        })
        .await?;

        match status {
            ExecStatus::Passed => Ok(()),
            ExecStatus::Failed(reason) => Err(RunFailure::TestsFailed(reason)),
        }
    }
}

/// Destroys the worker; the outcome of the run is not affected
async fn teardown(builder: &BuilderType, worker: &dyn Worker, limit: Duration) {
    match time::timeout(limit, worker.close()).await {
        Ok(Ok(())) => info!("{}: destroyed worker", builder),
        Ok(Err(e)) => warn!(
            "{}: unable to destroy worker {:?}: {}",
            builder,
            worker.name(),
            e
        ),
        Err(_) => warn!(
            "{}: timed out destroying worker {:?}",
            builder,
            worker.name()
        ),
    }
}

/// Waits out a create that missed its deadline and destroys the worker if
/// one is eventually handed over
async fn reap_late_worker(
    builder: BuilderType,
    create: impl Future<Output = Result<Box<dyn Worker>, ClientError>>,
    limit: Duration,
) {
    match create.await {
        Ok(worker) => {
            warn!(
                "{}: worker {:?} arrived after create timed out",
                builder,
                worker.name()
            );
            teardown(&builder, worker.as_ref(), limit).await;
        }
        Err(e) => debug!("{}: late create failed: {}", builder, e),
    }
}

/// Bounds a stage by `limit`
async fn within<T>(
    stage: Stage,
    limit: Duration,
    fut: impl Future<Output = Result<T, RunFailure>>,
) -> Result<T, RunFailure> {
    time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(RunFailure::TimedOut { stage, limit }))
}
