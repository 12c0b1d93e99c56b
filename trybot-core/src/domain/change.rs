//! Change domain model
//!
//! A change is a pending review item owned by the review system. The
//! dispatcher only reads it.

use serde::{Deserialize, Serialize};

use crate::dto::gerrit::ChangeInfo;

/// A pending change under review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Review-system identifier (e.g. "project~branch~I8473b95934b5732ac55d26311a706c9c2bde9940")
    pub id: String,

    /// Numeric change number shown to humans
    pub number: u64,

    /// Project (repository) the change belongs to
    pub project: String,

    /// Commit hash of the current revision
    pub current_revision: String,

    /// Patchset number of the current revision
    pub patchset: u32,
}

impl From<ChangeInfo> for Change {
    fn from(info: ChangeInfo) -> Self {
        let revision = info.current_revision.unwrap_or_default();
        let patchset = info
            .revisions
            .get(&revision)
            .map(|r| r.number)
            .unwrap_or_default();

        Change {
            id: info.id,
            number: info.number,
            project: info.project,
            current_revision: revision,
            patchset,
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CL {} patchset {} ({})",
            self.number, self.patchset, self.current_revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::gerrit::RevisionInfo;
    use std::collections::HashMap;

    #[test]
    fn test_change_from_info_picks_current_patchset() {
        let mut revisions = HashMap::new();
        revisions.insert("abc123".to_string(), RevisionInfo { number: 3 });
        revisions.insert("def456".to_string(), RevisionInfo { number: 2 });

        let change = Change::from(ChangeInfo {
            id: "go~master~I123".to_string(),
            number: 4242,
            project: "golang/go-private".to_string(),
            current_revision: Some("abc123".to_string()),
            revisions,
        });

        assert_eq!(change.current_revision, "abc123");
        assert_eq!(change.patchset, 3);
        assert_eq!(change.to_string(), "CL 4242 patchset 3 (abc123)");
    }

    #[test]
    fn test_change_from_info_without_revisions() {
        let change = Change::from(ChangeInfo {
            id: "go~master~I123".to_string(),
            number: 1,
            project: "golang/go".to_string(),
            current_revision: None,
            revisions: HashMap::new(),
        });

        assert_eq!(change.current_revision, "");
        assert_eq!(change.patchset, 0);
    }
}
