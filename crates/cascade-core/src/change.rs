//! Source-control change records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single commit as reported by the external VCS poller.
///
/// Changes are read-only inputs: the scheduler never mutates one after it
/// has been received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Change {
    pub revision: String,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
    /// Changed paths, relative to the repository root, in commit order.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Change {
    pub fn new(
        revision: impl Into<String>,
        branch: impl Into<String>,
        files: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            revision: revision.into(),
            branch: branch.into(),
            timestamp: Utc::now(),
            files: files.into_iter().map(Into::into).collect(),
            author: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
