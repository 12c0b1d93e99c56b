//! Archive fetcher
//!
//! Downloads the source tarball for a revision and checks that what came
//! back really is a gzip stream. Single-sign-on portals answer unauthenticated
//! requests with `200 OK` and an HTML login page, which would otherwise be
//! uploaded to every worker.

use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use trybot_client::ClientError;
use trybot_core::domain::archive::Archive;

use crate::repository::ArchiveSource;

/// Magic bytes every gzip member starts with
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors while retrieving a change archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The download itself failed or returned a non-OK status
    #[error("failed to retrieve change archive: {0}")]
    Fetch(#[from] ClientError),

    /// The body is not a gzip stream
    #[error("change archive for {revision} is not a gzip stream: {source}")]
    InvalidArchive {
        revision: String,
        source: std::io::Error,
    },
}

/// Fetches and validates revision archives
#[derive(Clone)]
pub struct ArchiveFetcher {
    source: Arc<dyn ArchiveSource>,
}

impl ArchiveFetcher {
    pub fn new(source: Arc<dyn ArchiveSource>) -> Self {
        Self { source }
    }

    /// Retrieves the archive for `revision`
    ///
    /// No retry is performed; the caller decides what a failure means.
    pub async fn fetch(&self, revision: &str) -> Result<Archive, ArchiveError> {
        debug!("Retrieving archive for {}", revision);

        let bytes = self.source.fetch(revision).await?;
        validate_gzip(&bytes).map_err(|source| ArchiveError::InvalidArchive {
            revision: revision.to_string(),
            source,
        })?;

        info!("Retrieved archive for {} ({} bytes)", revision, bytes.len());
        Ok(Archive::new(revision, bytes))
    }
}

/// Checks the gzip header and that a reader can be opened on the stream
fn validate_gzip(bytes: &[u8]) -> std::io::Result<()> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "missing gzip magic bytes",
        ));
    }

    let mut decoder = GzDecoder::new(bytes);
    let mut probe = [0u8; 1];
    decoder.read(&mut probe).map(|_| ())
}
