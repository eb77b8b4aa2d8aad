//! Dispatch requests and build outcomes exchanged with the build executor.

use crate::ids::CorrelationId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a builder is being asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchReason {
    /// A scheduler's stability window elapsed and its upstreams were settled.
    Automatic { scheduler: String },
    /// An operator forced the build.
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl DispatchReason {
    pub fn is_manual(&self) -> bool {
        matches!(self, DispatchReason::Manual { .. })
    }
}

impl fmt::Display for DispatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchReason::Automatic { scheduler } => write!(f, "scheduler {}", scheduler),
            DispatchReason::Manual { reason: Some(r) } => write!(f, "forced: {}", r),
            DispatchReason::Manual { reason: None } => write!(f, "forced"),
        }
    }
}

/// Instruction for the external executor to run one builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DispatchRequest {
    pub builder: String,
    pub revision: String,
    pub branch: String,
    pub reason: DispatchReason,
    pub correlation_id: CorrelationId,
    /// Upstream schedulers that had not completed when the stale-upstream
    /// hold expired. Empty for a normal dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_upstreams: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

impl DispatchRequest {
    pub fn is_stale(&self) -> bool {
        !self.stale_upstreams.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Failure,
    Exception,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success)
    }
}

/// Completion notification from the external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildOutcome {
    pub builder: String,
    pub revision: String,
    pub result: BuildResult,
    pub completed_at: DateTime<Utc>,
}

impl BuildOutcome {
    pub fn new(builder: impl Into<String>, revision: impl Into<String>, result: BuildResult) -> Self {
        Self {
            builder: builder.into(),
            revision: revision.into(),
            result,
            completed_at: Utc::now(),
        }
    }
}
