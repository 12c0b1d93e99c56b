//! Gerrit review API

use reqwest::Client;
use serde::de::DeserializeOwned;
use trybot_core::dto::gerrit::{ChangeInfo, ReviewInput};

use crate::error::{ClientError, Result};
use crate::{authorize, check_status, handle_empty_response, trim_base};

/// Prefix Gerrit puts in front of every JSON body to defeat XSSI
const XSSI_PREFIX: &str = ")]}'";

/// Client for a Gerrit instance's REST API
#[derive(Debug, Clone)]
pub struct GerritClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl GerritClient {
    /// Create a new Gerrit client
    ///
    /// # Arguments
    /// * `base_url` - The Gerrit instance URL (e.g., "https://go-review.googlesource.com")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new Gerrit client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: trim_base(base_url),
            token: None,
            client,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Query changes matching a search expression
    ///
    /// The current revision of every change is always requested.
    ///
    /// # Arguments
    /// * `query` - Gerrit search expression (e.g., "status:open project:go")
    pub async fn query_changes(&self, query: &str) -> Result<Vec<ChangeInfo>> {
        let url = format!("{}/a/changes/", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("q", query), ("o", "CURRENT_REVISION")]);
        let response = authorize(request, self.token.as_deref()).send().await?;

        self.handle_gerrit_response(response).await
    }

    /// Post a review (message and label votes) on a change revision
    ///
    /// # Arguments
    /// * `change_id` - The change identifier
    /// * `revision` - The revision the review applies to
    /// * `review` - Message and labels to post
    pub async fn set_review(
        &self,
        change_id: &str,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<()> {
        let url = format!(
            "{}/a/changes/{}/revisions/{}/review",
            self.base_url, change_id, revision
        );
        let request = self.client.post(&url).json(review);
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    /// Deserialize a Gerrit JSON body, dropping the XSSI prefix
    async fn handle_gerrit_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = check_status(response).await?.text().await?;
        let body = body.trim_start().trim_start_matches(XSSI_PREFIX);

        serde_json::from_str(body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse Gerrit response: {}", e)))
    }
}
