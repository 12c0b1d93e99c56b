//! Test result domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builder::BuilderType;

/// Outcome of one worker run
///
/// Produced exactly once per run, whatever happened to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub builder_type: BuilderType,

    /// Where the run's output can be read: a storage URL, a local marker,
    /// or empty when the run failed before any output existed
    pub log_locator: String,

    pub succeeded: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TestResult {
    /// Short status used in reports
    pub fn status(&self) -> &'static str {
        if self.succeeded { "pass" } else { "fail" }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Aggregate state over a set of results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Succeeded,
    Failed,
}

impl Verdict {
    /// Succeeded only if every result succeeded
    pub fn from_results(results: &[TestResult]) -> Self {
        if results.iter().all(|r| r.succeeded) {
            Verdict::Succeeded
        } else {
            Verdict::Failed
        }
    }

    /// Numeric review label for this verdict
    pub fn label(self) -> i32 {
        match self {
            Verdict::Succeeded => 1,
            Verdict::Failed => -1,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Succeeded => write!(f, "succeeded"),
            Verdict::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(builder: &str, succeeded: bool) -> TestResult {
        let now = Utc::now();
        TestResult {
            builder_type: BuilderType::from(builder),
            log_locator: String::new(),
            succeeded,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_all_passing_results_succeed() {
        let verdict = Verdict::from_results(&[result("A", true), result("B", true)]);
        assert_eq!(verdict, Verdict::Succeeded);
        assert_eq!(verdict.label(), 1);
        assert_eq!(verdict.to_string(), "succeeded");
    }

    #[test]
    fn test_single_failure_fails_verdict() {
        let verdict = Verdict::from_results(&[result("A", true), result("B", false)]);
        assert_eq!(verdict, Verdict::Failed);
        assert_eq!(verdict.label(), -1);
        assert_eq!(verdict.to_string(), "failed");
    }

    #[test]
    fn test_result_status() {
        assert_eq!(result("A", true).status(), "pass");
        assert_eq!(result("A", false).status(), "fail");
    }
}
