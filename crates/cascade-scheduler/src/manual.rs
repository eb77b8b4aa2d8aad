//! Operator-forced builds.

use crate::engine::DispatchReport;
use crate::registry::SchedulerRegistry;
use cascade_core::dispatch::{DispatchReason, DispatchRequest};
use cascade_core::ids::CorrelationId;
use cascade_core::ports::DispatchSink;
use cascade_core::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A forced build as submitted by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceRequest {
    pub builders: Vec<String>,
    pub revision: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ForceRequest {
    pub fn new(
        builders: impl IntoIterator<Item = impl Into<String>>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            builders: builders.into_iter().map(Into::into).collect(),
            revision: revision.into(),
            branch: None,
            reason: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Emits dispatch requests directly, skipping filters, stability windows
/// and upstream gating. Forced builds are never deduplicated against
/// automatic ones.
pub struct ManualTrigger<'a> {
    registry: &'a SchedulerRegistry,
    sink: &'a dyn DispatchSink,
}

impl<'a> ManualTrigger<'a> {
    pub fn new(registry: &'a SchedulerRegistry, sink: &'a dyn DispatchSink) -> Self {
        Self { registry, sink }
    }

    /// Validate every builder name, then emit one request per builder.
    /// Nothing is emitted when any name is unknown.
    pub fn force_dispatch(
        &self,
        builders: &[String],
        revision: &str,
        branch: Option<&str>,
        reason: Option<&str>,
    ) -> Result<DispatchReport> {
        if builders.is_empty() {
            return Err(Error::NoBuildersRequested);
        }
        if revision.trim().is_empty() {
            return Err(Error::MissingRevision);
        }
        if let Some(unknown) = builders.iter().find(|b| !self.registry.is_known_builder(b)) {
            return Err(Error::UnknownBuilder(unknown.clone()));
        }

        let branch = branch
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&self.registry.manual().default_branch);
        let correlation_id = CorrelationId::new();
        info!(
            builders = ?builders,
            revision,
            branch,
            reason = reason.unwrap_or(""),
            correlation_id = %correlation_id,
            "Forced build requested"
        );

        let mut report = DispatchReport::default();
        for builder in builders {
            report.submit(
                self.sink,
                DispatchRequest {
                    builder: builder.clone(),
                    revision: revision.to_string(),
                    branch: branch.to_string(),
                    reason: DispatchReason::Manual {
                        reason: reason.map(str::to_string),
                    },
                    correlation_id,
                    stale_upstreams: Vec::new(),
                    requested_at: Utc::now(),
                },
            );
        }
        Ok(report)
    }

    /// Convenience wrapper over [`ManualTrigger::force_dispatch`].
    pub fn submit(&self, request: &ForceRequest) -> Result<DispatchReport> {
        self.force_dispatch(
            &request.builders,
            &request.revision,
            request.branch.as_deref(),
            request.reason.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::config::{CascadeConfig, ClassificationRule, FilterSpec, ManualSettings, PatternSpec, SchedulerSpec};
    use cascade_core::ports::RecordingSink;

    fn registry() -> SchedulerRegistry {
        SchedulerRegistry::load(&CascadeConfig {
            classifier: vec![ClassificationRule::new("llvm", PatternSpec::Prefix("llvm/".into()))],
            schedulers: vec![SchedulerSpec::new(
                "s_llvm",
                FilterSpec::tag("llvm"),
                ["llvm-x86_64-linux-R"],
            )],
            manual: ManualSettings {
                default_branch: "main".to_string(),
                builders: vec!["clang-3stage-x86_64-linux".to_string()],
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_force_only_builder_accepted() {
        let registry = registry();
        let sink = RecordingSink::new();
        let trigger = ManualTrigger::new(&registry, &sink);

        let report = trigger
            .submit(&ForceRequest::new(["clang-3stage-x86_64-linux"], "r12345").reason("bisect"))
            .unwrap();
        assert_eq!(report.dispatched.len(), 1);

        let sent = sink.take();
        assert_eq!(sent[0].branch, "main");
        assert_eq!(
            sent[0].reason,
            DispatchReason::Manual {
                reason: Some("bisect".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_builder_emits_nothing() {
        let registry = registry();
        let sink = RecordingSink::new();
        let trigger = ManualTrigger::new(&registry, &sink);

        let err = trigger
            .submit(&ForceRequest::new(["llvm-x86_64-linux-R", "no-such-builder"], "r1"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownBuilder(ref b) if b == "no-such-builder"));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_requires_builders_and_revision() {
        let registry = registry();
        let sink = RecordingSink::new();
        let trigger = ManualTrigger::new(&registry, &sink);

        assert!(matches!(
            trigger.submit(&ForceRequest::new(Vec::<String>::new(), "r1")),
            Err(Error::NoBuildersRequested)
        ));
        assert!(matches!(
            trigger.submit(&ForceRequest::new(["llvm-x86_64-linux-R"], " ")),
            Err(Error::MissingRevision)
        ));
    }

    #[test]
    fn test_explicit_branch_wins() {
        let registry = registry();
        let sink = RecordingSink::new();
        let trigger = ManualTrigger::new(&registry, &sink);

        trigger
            .submit(&ForceRequest::new(["llvm-x86_64-linux-R"], "r1").branch("release/17.x"))
            .unwrap();
        assert_eq!(sink.take()[0].branch, "release/17.x");
    }

    #[test]
    fn test_force_request_from_json() {
        let request: ForceRequest =
            serde_json::from_str(r#"{"builders":["llvm-x86_64-linux-R"],"revision":"r7"}"#).unwrap();
        assert_eq!(request, ForceRequest::new(["llvm-x86_64-linux-R"], "r7"));
        assert!(request.branch.is_none());
    }
}
