//! Result reporter
//!
//! Posts the starting notice and the final verdict on a change.

use std::sync::Arc;
use tracing::info;
use trybot_client::ClientError;
use trybot_core::domain::change::Change;
use trybot_core::domain::result::{TestResult, Verdict};
use trybot_core::dto::gerrit::ReviewInput;

use crate::repository::ReviewRepository;

/// Label carrying the verdict
pub const RESULT_LABEL: &str = "TryBot-Result";

/// Comment posted when testing of a change starts
pub const BEGINNING_MESSAGE: &str = "TryBots beginning";

/// Aggregate outcome of one change's test matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub verdict: Verdict,
    pub message: String,
}

impl Report {
    pub fn from_results(results: &[TestResult]) -> Self {
        let verdict = Verdict::from_results(results);
        let message = format!("Tests {}\n{}", verdict, result_table(results));
        Self { verdict, message }
    }

    /// Review carrying the message and the verdict label
    pub fn review_input(&self) -> ReviewInput {
        ReviewInput::message(self.message.clone()).with_label(RESULT_LABEL, self.verdict.label())
    }
}

/// Renders one aligned row per result: builder, `[pass]`/`[fail]`, locator
pub fn result_table(results: &[TestResult]) -> String {
    let width = results
        .iter()
        .map(|r| r.builder_type.as_str().len())
        .max()
        .unwrap_or(0);

    results
        .iter()
        .map(|r| {
            let row = format!(
                "    {:<width$}  [{}]  {}",
                r.builder_type.as_str(),
                r.status(),
                r.log_locator,
                width = width
            );
            format!("{}\n", row.trim_end())
        })
        .collect()
}

/// Posts notices and verdicts through the review system
#[derive(Clone)]
pub struct Reporter {
    review: Arc<dyn ReviewRepository>,
}

impl Reporter {
    pub fn new(review: Arc<dyn ReviewRepository>) -> Self {
        Self { review }
    }

    /// Posts the starting notice on the change's current revision
    pub async fn comment_beginning(&self, change: &Change) -> Result<(), ClientError> {
        self.review
            .set_review(
                &change.id,
                &change.current_revision,
                &ReviewInput::message(BEGINNING_MESSAGE),
            )
            .await
    }

    /// Posts the result table and sets the verdict label
    pub async fn comment_results(
        &self,
        change: &Change,
        results: &[TestResult],
    ) -> Result<Report, ClientError> {
        let report = Report::from_results(results);
        self.review
            .set_review(&change.id, &change.current_revision, &report.review_input())
            .await?;

        info!(
            "Reported {} on {} ({}{:+})",
            report.verdict,
            change,
            RESULT_LABEL,
            report.verdict.label()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeReview, change};
    use chrono::Utc;

    fn result(builder: &str, succeeded: bool) -> TestResult {
        TestResult {
            builder_type: builder.into(),
            log_locator: format!("https://storage.cloud.google.com/logs/abc123-00ff00ff/{}", builder),
            succeeded,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_table_aligns_columns() {
        let table = result_table(&[
            result("linux-amd64", true),
            result("darwin-arm64-12", false),
        ]);

        assert_eq!(
            table,
            "    linux-amd64      [pass]  https://storage.cloud.google.com/logs/abc123-00ff00ff/linux-amd64\n\
             \x20   darwin-arm64-12  [fail]  https://storage.cloud.google.com/logs/abc123-00ff00ff/darwin-arm64-12\n"
        );
    }

    #[test]
    fn test_table_trims_empty_locator() {
        let mut failed = result("linux-386", false);
        failed.log_locator.clear();

        assert_eq!(result_table(&[failed]), "    linux-386  [fail]\n");
    }

    #[tokio::test]
    async fn test_all_passing_sets_positive_label() {
        let review = Arc::new(FakeReview::default());
        let reporter = Reporter::new(review.clone());
        let cl = change(1234, "abc123");

        let report = reporter
            .comment_results(
                &cl,
                &[result("linux-amd64", true), result("darwin-arm64-12", true)],
            )
            .await
            .unwrap();

        assert_eq!(report.verdict, Verdict::Succeeded);
        let posted = review.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].change_id, cl.id);
        assert_eq!(posted[0].revision, "abc123");
        assert!(posted[0].review.message.starts_with("Tests succeeded\n"));
        assert_eq!(posted[0].review.message.matches("[pass]").count(), 2);
        assert_eq!(posted[0].review.labels.get(RESULT_LABEL), Some(&1));
    }

    #[tokio::test]
    async fn test_one_failure_sets_negative_label() {
        let review = Arc::new(FakeReview::default());
        let reporter = Reporter::new(review.clone());

        let report = reporter
            .comment_results(
                &change(1234, "abc123"),
                &[result("linux-amd64", false), result("darwin-arm64-12", true)],
            )
            .await
            .unwrap();

        assert_eq!(report.verdict, Verdict::Failed);
        let posted = review.posted();
        let message = &posted[0].review.message;
        assert!(message.starts_with("Tests failed\n"));
        assert_eq!(message.matches("[pass]").count(), 1);
        assert_eq!(message.matches("[fail]").count(), 1);
        assert_eq!(posted[0].review.labels.get(RESULT_LABEL), Some(&-1));
    }

    #[tokio::test]
    async fn test_beginning_notice_has_no_label() {
        let review = Arc::new(FakeReview::default());
        let reporter = Reporter::new(review.clone());

        reporter.comment_beginning(&change(7, "def456")).await.unwrap();

        let posted = review.posted();
        assert_eq!(posted[0].revision, "def456");
        assert_eq!(posted[0].review.message, BEGINNING_MESSAGE);
        assert!(posted[0].review.labels.is_empty());
    }

    #[tokio::test]
    async fn test_post_failure_is_returned() {
        let review = Arc::new(FakeReview::default().failing_reviews());
        let reporter = Reporter::new(review);

        let result = reporter
            .comment_results(&change(1, "abc123"), &[result("linux-amd64", true)])
            .await;

        assert!(result.is_err());
    }
}
