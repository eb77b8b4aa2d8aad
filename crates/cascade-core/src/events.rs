//! Records arriving on the scheduler's inbound feed.

use crate::change::Change;
use crate::dispatch::BuildOutcome;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One line of the inbound feed: either a change from the VCS poller or a
/// completion notice from a build executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRecord {
    Change(Change),
    Outcome(BuildOutcome),
}

impl FeedRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedRecord::Change(_) => "change",
            FeedRecord::Outcome(_) => "outcome",
        }
    }
}

impl From<Change> for FeedRecord {
    fn from(change: Change) -> Self {
        FeedRecord::Change(change)
    }
}

impl From<BuildOutcome> for FeedRecord {
    fn from(outcome: BuildOutcome) -> Self {
        FeedRecord::Outcome(outcome)
    }
}
