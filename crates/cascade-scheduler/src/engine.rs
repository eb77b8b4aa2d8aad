//! The scheduling engine: classifier, filters, windows and upstream gating
//! driven by one caller.

use crate::coordinator::{DependencyCoordinator, Release};
use crate::manual::ManualTrigger;
use crate::registry::{SchedulerEntry, SchedulerRegistry};
use crate::window::{DebounceWindow, PendingTrigger};
use cascade_core::change::Change;
use cascade_core::config::CascadeConfig;
use cascade_core::dispatch::{BuildOutcome, DispatchReason, DispatchRequest};
use cascade_core::ids::CorrelationId;
use cascade_core::ports::DispatchSink;
use cascade_core::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// A request the sink refused.
#[derive(Debug)]
pub struct DispatchFailure {
    pub request: DispatchRequest,
    pub error: Error,
}

/// Everything emitted by one engine call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: Vec<DispatchRequest>,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    /// Hand `request` to `sink` and record the result. Delivery is attempted
    /// once.
    pub(crate) fn submit(&mut self, sink: &dyn DispatchSink, request: DispatchRequest) {
        match sink.submit(&request) {
            Ok(()) => self.dispatched.push(request),
            Err(error) => {
                error!(
                    builder = %request.builder,
                    revision = %request.revision,
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "Dispatch delivery failed"
                );
                self.failures.push(DispatchFailure { request, error });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty() && self.failures.is_empty()
    }

    /// Requests attempted, delivered or not.
    pub fn len(&self) -> usize {
        self.dispatched.len() + self.failures.len()
    }

    pub fn merge(&mut self, other: DispatchReport) {
        self.dispatched.extend(other.dispatched);
        self.failures.extend(other.failures);
    }
}

/// Owns the scheduler registry and every piece of mutable scheduling state.
///
/// All methods take the current monotonic time so the caller decides what
/// "now" is; the engine never reads a clock for scheduling decisions.
pub struct SchedulingEngine {
    registry: SchedulerRegistry,
    windows: DebounceWindow,
    coordinator: DependencyCoordinator,
    sink: Arc<dyn DispatchSink>,
}

impl SchedulingEngine {
    pub fn new(registry: SchedulerRegistry, sink: Arc<dyn DispatchSink>) -> Self {
        Self {
            registry,
            windows: DebounceWindow::new(),
            coordinator: DependencyCoordinator::new(),
            sink,
        }
    }

    pub fn from_config(config: &CascadeConfig, sink: Arc<dyn DispatchSink>) -> Result<Self> {
        Ok(Self::new(SchedulerRegistry::load(config)?, sink))
    }

    /// Classify a change once and arm the window of every scheduler whose
    /// filter it matches. Returns the matched scheduler names.
    pub fn ingest_change(&mut self, change: &Change, now: Instant) -> Vec<String> {
        let classified = self.registry.classifier().classify_change(change);
        debug!(
            revision = %change.revision,
            branch = %change.branch,
            files = change.files.len(),
            tags = ?classified.tags(),
            "Change classified"
        );

        let mut matched = Vec::new();
        for entry in self.registry.entries() {
            if !entry.enabled() || !entry.filter().matches(&classified) {
                continue;
            }
            // A trigger already waiting on upstreams takes the newer change
            // without restarting its hold.
            if !self.coordinator.absorb(entry.name(), change) {
                self.windows
                    .on_match(entry.name(), entry.window(), change, now);
            }
            matched.push(entry.name().to_string());
        }

        if matched.is_empty() {
            debug!(revision = %change.revision, "Change matched no scheduler");
        }
        matched
    }

    /// Record a build outcome and dispatch any held trigger it unblocks.
    pub fn ingest_outcome(&mut self, outcome: &BuildOutcome, now: Instant) -> DispatchReport {
        let completed = self
            .coordinator
            .record_outcome(&self.registry, outcome, now);
        if completed.is_empty() {
            return DispatchReport::default();
        }
        let released = self.coordinator.release(&self.registry, now);
        self.dispatch(released.into_iter().map(Self::unpack).collect(), now)
    }

    /// Fire elapsed windows and re-check held triggers.
    pub fn tick(&mut self, now: Instant) -> DispatchReport {
        let mut ready = Vec::new();

        for trigger in self.windows.on_tick(now) {
            let Some(entry) = self.registry.get(&trigger.scheduler) else {
                continue;
            };
            info!(
                scheduler = %trigger.scheduler,
                revision = %trigger.change.revision,
                matches = trigger.matches,
                "Stability window elapsed"
            );
            if self.coordinator.is_ready(entry, trigger.armed_at) {
                ready.push((trigger, Vec::new()));
            } else {
                self.coordinator.hold(entry, trigger, now);
            }
        }

        ready.extend(
            self.coordinator
                .release(&self.registry, now)
                .into_iter()
                .map(Self::unpack),
        );
        self.dispatch(ready, now)
    }

    fn unpack(release: Release) -> (PendingTrigger, Vec<String>) {
        match release {
            Release::Ready(trigger) => (trigger, Vec::new()),
            Release::Stale { trigger, pending } => (trigger, pending),
        }
    }

    fn dispatch(&mut self, mut ready: Vec<(PendingTrigger, Vec<String>)>, now: Instant) -> DispatchReport {
        ready.sort_by_key(|(trigger, _)| self.registry.graph().rank(&trigger.scheduler));

        let mut report = DispatchReport::default();
        for (trigger, stale) in ready {
            let Some(entry) = self.registry.get(&trigger.scheduler) else {
                continue;
            };
            let fanned = Self::fan_out(self.sink.as_ref(), entry, &trigger, stale);
            let delivered: Vec<String> = fanned.dispatched.iter().map(|r| r.builder.clone()).collect();
            self.coordinator
                .record_dispatch(entry.name(), &delivered, &trigger.change.revision, now);
            report.merge(fanned);
        }
        report
    }

    /// One request per builder, all sharing a correlation id.
    fn fan_out(
        sink: &dyn DispatchSink,
        entry: &SchedulerEntry,
        trigger: &PendingTrigger,
        stale: Vec<String>,
    ) -> DispatchReport {
        let correlation_id = CorrelationId::new();
        info!(
            scheduler = %entry.name(),
            revision = %trigger.change.revision,
            branch = %trigger.change.branch,
            builders = ?entry.builders(),
            trigger_id = %trigger.id,
            correlation_id = %correlation_id,
            stale = !stale.is_empty(),
            "Dispatching builders"
        );

        let mut report = DispatchReport::default();
        for builder in entry.builders() {
            report.submit(
                sink,
                DispatchRequest {
                    builder: builder.clone(),
                    revision: trigger.change.revision.clone(),
                    branch: trigger.change.branch.clone(),
                    reason: DispatchReason::Automatic {
                        scheduler: entry.name().to_string(),
                    },
                    correlation_id,
                    stale_upstreams: stale.clone(),
                    requested_at: Utc::now(),
                },
            );
        }
        report
    }

    /// Operator entry point; see [`ManualTrigger::force_dispatch`].
    pub fn force_dispatch(
        &self,
        builders: &[String],
        revision: &str,
        branch: Option<&str>,
        reason: Option<&str>,
    ) -> Result<DispatchReport> {
        self.manual().force_dispatch(builders, revision, branch, reason)
    }

    pub fn manual(&self) -> ManualTrigger<'_> {
        ManualTrigger::new(&self.registry, self.sink.as_ref())
    }

    pub fn registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    pub fn windows(&self) -> &DebounceWindow {
        &self.windows
    }

    pub fn coordinator(&self) -> &DependencyCoordinator {
        &self.coordinator
    }
}
