//! Review system repository

use async_trait::async_trait;
use trybot_client::{ClientError, GerritClient};
use trybot_core::domain::change::Change;
use trybot_core::dto::gerrit::ReviewInput;

/// Repository trait for the code-review system
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Returns the changes matching a search expression
    async fn query_changes(&self, query: &str) -> Result<Vec<Change>, ClientError>;

    /// Posts a review message and label votes on a change revision
    async fn set_review(
        &self,
        change_id: &str,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<(), ClientError>;
}

/// Gerrit implementation of ReviewRepository
pub struct GerritReviewRepository {
    client: GerritClient,
}

impl GerritReviewRepository {
    pub fn new(client: GerritClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReviewRepository for GerritReviewRepository {
    async fn query_changes(&self, query: &str) -> Result<Vec<Change>, ClientError> {
        let changes = self.client.query_changes(query).await?;
        Ok(changes.into_iter().map(Change::from).collect())
    }

    async fn set_review(
        &self,
        change_id: &str,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<(), ClientError> {
        self.client.set_review(change_id, revision, review).await
    }
}
