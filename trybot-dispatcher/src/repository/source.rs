//! Source archive repository

use async_trait::async_trait;
use trybot_client::{ClientError, SourceClient};

/// Repository trait for downloading revision tarballs
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Downloads the raw archive body for a revision
    async fn fetch(&self, revision: &str) -> Result<Vec<u8>, ClientError>;
}

/// HTTP implementation of ArchiveSource bound to one repository
pub struct HttpArchiveSource {
    client: SourceClient,
    repo: String,
}

impl HttpArchiveSource {
    /// # Arguments
    /// * `client` - Client for the source host
    /// * `repo` - Repository path on that host (e.g., "golang/go")
    pub fn new(client: SourceClient, repo: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
        }
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch(&self, revision: &str) -> Result<Vec<u8>, ClientError> {
        self.client.fetch_archive(&self.repo, revision).await
    }
}
