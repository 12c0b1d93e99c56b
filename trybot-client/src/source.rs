//! Source archive server (gitiles `+archive` endpoint)

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::authorize;
use crate::error::{ClientError, Result};
use crate::trim_base;

/// Client for downloading revision tarballs
#[derive(Debug, Clone)]
pub struct SourceClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl SourceClient {
    /// Create a new source client
    ///
    /// # Arguments
    /// * `base_url` - The source host URL (e.g., "https://go.googlesource.com")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new source client with a custom HTTP client
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

    /// URL of the gzip tarball for `revision` of `repo`
    pub fn archive_url(&self, repo: &str, revision: &str) -> String {
        format!("{}/{}/+archive/{}.tar.gz", self.base_url, repo, revision)
    }

    /// Download the tarball for a revision
    ///
    /// Any status other than 200 OK is an error. The body is returned as-is;
    /// checking that it really is an archive is left to the caller.
    pub async fn fetch_archive(&self, repo: &str, revision: &str) -> Result<Vec<u8>> {
        let url = self.archive_url(repo, revision);
        debug!("Fetching archive {}", url);

        let request = self.client.get(&url);
        let response = authorize(request, self.token.as_deref()).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::api_error(
                status.as_u16(),
                format!("failed to fetch {:?}: {}", url, status),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
