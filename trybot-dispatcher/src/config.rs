//! Dispatcher configuration
//!
//! Every setting is resolved once at startup and handed to the scheduler;
//! nothing reads flags or the environment after that.

use std::time::Duration;
use trybot_core::domain::builder::{BuilderType, FIRST_CLASS_BUILDERS};

use crate::service::StageTimeouts;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Review server base URL (e.g., "https://team-review.googlesource.com")
    pub gerrit_url: String,

    /// Source server base URL the archives are served from
    pub source_url: String,

    /// Repository under test, as known to both servers
    pub repo: String,

    /// Worker coordinator base URL
    pub coordinator_url: String,

    /// Bucket receiving live logs; logs go to stdout when unset
    pub gcs_bucket: Option<String>,

    /// Revision to test once instead of polling for changes
    pub revision: Option<String>,

    /// Builder types every change is tested on
    pub builders: Vec<BuilderType>,

    /// How often to query the review server for changes
    pub poll_interval: Duration,

    /// How often live logs are uploaded
    pub log_flush_interval: Duration,

    /// Limits for the stages of a worker run
    pub timeouts: StageTimeouts,

    /// Cap on simultaneous worker runs per change (unbounded when unset)
    pub max_parallel_runs: Option<usize>,

    /// Bearer token sent to every service
    pub access_token: Option<String>,
}

impl Config {
    /// Whether a single revision is tested instead of polling
    pub fn is_one_shot(&self) -> bool {
        self.revision.is_some()
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("gerrit_url", &self.gerrit_url),
            ("source_url", &self.source_url),
            ("coordinator_url", &self.coordinator_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.repo.is_empty() {
            anyhow::bail!("repo cannot be empty");
        }

        if self.gcs_bucket.as_deref() == Some("") {
            anyhow::bail!("gcs_bucket cannot be empty");
        }

        if self.revision.as_deref() == Some("") {
            anyhow::bail!("revision cannot be empty");
        }

        if self.builders.is_empty() {
            anyhow::bail!("at least one builder is required");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_flush_interval.is_zero() {
            anyhow::bail!("log_flush_interval must be greater than 0");
        }

        if self.timeouts.stage.is_zero() || self.timeouts.exec.is_zero() {
            anyhow::bail!("stage timeouts must be greater than 0");
        }

        if self.max_parallel_runs == Some(0) {
            anyhow::bail!("max_parallel_runs must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gerrit_url: "https://team-review.googlesource.com".to_string(),
            source_url: "https://team.googlesource.com".to_string(),
            repo: "golang/go-private".to_string(),
            coordinator_url: "http://localhost:8080".to_string(),
            gcs_bucket: None,
            revision: None,
            builders: FIRST_CLASS_BUILDERS
                .iter()
                .map(|b| BuilderType::from(*b))
                .collect(),
            poll_interval: Duration::from_secs(60),
            log_flush_interval: Duration::from_secs(5),
            timeouts: StageTimeouts::default(),
            max_parallel_runs: None,
            access_token: None,
        }
    }
}
