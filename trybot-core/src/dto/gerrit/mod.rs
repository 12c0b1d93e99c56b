//! Gerrit REST DTOs
//!
//! Only the fields the dispatcher reads are modelled; unknown fields are
//! ignored on deserialization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Change as returned by `GET /changes/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub id: String,

    #[serde(rename = "_number")]
    pub number: u64,

    pub project: String,

    /// Present when the query asked for `CURRENT_REVISION`
    #[serde(default)]
    pub current_revision: Option<String>,

    #[serde(default)]
    pub revisions: HashMap<String, RevisionInfo>,
}

/// Revision entry of a change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Patchset number
    #[serde(rename = "_number")]
    pub number: u32,
}

/// Body of `POST /changes/{id}/revisions/{revision}/review`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInput {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message: String,

    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, i32>,
}

impl ReviewInput {
    /// Review carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            labels: HashMap::new(),
        }
    }

    /// Adds a label vote
    pub fn with_label(mut self, name: impl Into<String>, value: i32) -> Self {
        self.labels.insert(name.into(), value);
        self
    }
}
