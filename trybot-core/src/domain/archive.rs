//! Source archive

use std::sync::Arc;

/// Gzip tarball of the source tree at one revision.
///
/// Fetched once per change and shared read-only by every worker run;
/// cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    revision: String,
    bytes: Arc<[u8]>,
}

impl Archive {
    pub fn new(revision: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            revision: revision.into(),
            bytes: bytes.into(),
        }
    }

    /// Revision this archive was taken from
    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
