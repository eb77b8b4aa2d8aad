//! Upstream gating for fired triggers.

use crate::registry::{SchedulerEntry, SchedulerRegistry};
use crate::window::PendingTrigger;
use cascade_core::change::Change;
use cascade_core::config::WaitPolicy;
use cascade_core::dispatch::{BuildOutcome, BuildResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the coordinator knows about one scheduler's most recent run.
#[derive(Debug, Clone, Default)]
pub struct SchedulerProgress {
    /// Builders dispatched by the last firing that have not reported back.
    pub awaiting: BTreeSet<String>,
    pub last_dispatch_at: Option<Instant>,
    /// Set once every awaited builder has reported, whatever the result.
    pub last_completed_at: Option<Instant>,
    /// Worst result of the last run.
    pub last_result: Option<BuildResult>,
    pub last_revision: Option<String>,
}

/// A fired trigger waiting on its upstreams.
#[derive(Debug, Clone)]
pub struct HeldTrigger {
    pub trigger: PendingTrigger,
    pub held_since: Instant,
}

/// Decision for a held trigger.
#[derive(Debug, Clone)]
pub enum Release {
    Ready(PendingTrigger),
    /// The hold expired; `pending` names the upstreams that never settled.
    Stale {
        trigger: PendingTrigger,
        pending: Vec<String>,
    },
}

impl Release {
    pub fn trigger(&self) -> &PendingTrigger {
        match self {
            Release::Ready(trigger) | Release::Stale { trigger, .. } => trigger,
        }
    }
}

/// Tracks upstream runs and parks downstream triggers until they settle.
///
/// An upstream is settled for a trigger armed at `since` once it completed a
/// run at or after `since`. An upstream that never runs (disabled, or not
/// matched by the change) is only ever resolved by the stale hold.
#[derive(Debug, Default)]
pub struct DependencyCoordinator {
    progress: HashMap<String, SchedulerProgress>,
    held: BTreeMap<String, HeldTrigger>,
}

impl DependencyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `entry` may dispatch a trigger whose window opened at `since`.
    pub fn is_ready(&self, entry: &SchedulerEntry, since: Instant) -> bool {
        let upstreams = entry.upstreams();
        if upstreams.is_empty() {
            return true;
        }
        let settled = |u: &String| self.is_settled(u, since);
        match entry.wait() {
            WaitPolicy::All => upstreams.iter().all(settled),
            WaitPolicy::Any => upstreams.iter().any(settled),
        }
    }

    /// Upstreams of `entry` that have not settled since `since`.
    pub fn pending_upstreams(&self, entry: &SchedulerEntry, since: Instant) -> Vec<String> {
        entry
            .upstreams()
            .iter()
            .filter(|u| !self.is_settled(u, since))
            .cloned()
            .collect()
    }

    fn is_settled(&self, scheduler: &str, since: Instant) -> bool {
        self.progress
            .get(scheduler)
            .and_then(|p| p.last_completed_at)
            .is_some_and(|at| at >= since)
    }

    /// Remember that `scheduler` handed `delivered` to the executor.
    ///
    /// Only delivered builders are awaited. A firing whose every request was
    /// rejected completes on the spot with [`BuildResult::Exception`], since
    /// no outcome will ever arrive for it.
    pub fn record_dispatch(&mut self, scheduler: &str, delivered: &[String], revision: &str, now: Instant) {
        let progress = self.progress.entry(scheduler.to_string()).or_default();
        progress.awaiting = delivered.iter().cloned().collect();
        progress.last_dispatch_at = Some(now);
        progress.last_result = None;
        progress.last_revision = Some(revision.to_string());
        if progress.awaiting.is_empty() {
            progress.last_completed_at = Some(now);
            progress.last_result = Some(BuildResult::Exception);
            warn!(scheduler, revision, "No build was delivered, run counts as finished");
        }
    }

    /// Attribute an outcome to every scheduler listing its builder. Returns
    /// the schedulers whose run is now complete.
    pub fn record_outcome(
        &mut self,
        registry: &SchedulerRegistry,
        outcome: &BuildOutcome,
        now: Instant,
    ) -> Vec<String> {
        let mut completed = Vec::new();
        for entry in registry.schedulers_for_builder(&outcome.builder) {
            let progress = self.progress.entry(entry.name().to_string()).or_default();
            let in_run = progress.awaiting.remove(&outcome.builder);
            if !in_run && !progress.awaiting.is_empty() {
                // Builder already reported for the current run.
                continue;
            }
            progress.last_result = Some(match progress.last_result {
                Some(prev) if in_run && !prev.is_success() => prev,
                _ => outcome.result,
            });
            if progress.awaiting.is_empty() {
                progress.last_completed_at = Some(now);
                completed.push(entry.name().to_string());
                debug!(
                    scheduler = %entry.name(),
                    builder = %outcome.builder,
                    revision = %outcome.revision,
                    result = ?progress.last_result,
                    run_secs = progress
                        .last_dispatch_at
                        .map(|at| now.saturating_duration_since(at).as_secs()),
                    "Scheduler run complete"
                );
            }
        }
        completed
    }

    pub fn progress(&self, scheduler: &str) -> Option<&SchedulerProgress> {
        self.progress.get(scheduler)
    }

    /// Park a fired trigger until its upstreams settle.
    pub fn hold(&mut self, entry: &SchedulerEntry, trigger: PendingTrigger, now: Instant) {
        info!(
            scheduler = %entry.name(),
            revision = %trigger.change.revision,
            pending = ?self.pending_upstreams(entry, trigger.armed_at),
            "Waiting for upstream schedulers"
        );
        self.held.insert(
            entry.name().to_string(),
            HeldTrigger {
                trigger,
                held_since: now,
            },
        );
    }

    /// Fold a newer matching change into a held trigger. The trigger stays
    /// held and its hold clock keeps running. Returns false when nothing is
    /// held for `scheduler`.
    pub fn absorb(&mut self, scheduler: &str, change: &Change) -> bool {
        let Some(held) = self.held.get_mut(scheduler) else {
            return false;
        };
        held.trigger.change = change.clone();
        held.trigger.matches += 1;
        debug!(
            scheduler,
            revision = %change.revision,
            trigger_id = %held.trigger.id,
            matches = held.trigger.matches,
            "Held trigger picked up a newer change"
        );
        true
    }

    pub fn held_trigger(&self, scheduler: &str) -> Option<&HeldTrigger> {
        self.held.get(scheduler)
    }

    pub fn is_held(&self, scheduler: &str) -> bool {
        self.held.contains_key(scheduler)
    }

    pub fn held(&self) -> impl Iterator<Item = &HeldTrigger> {
        self.held.values()
    }

    /// Release every held trigger that is ready, or whose hold has run out,
    /// upstreams first.
    pub fn release(&mut self, registry: &SchedulerRegistry, now: Instant) -> Vec<Release> {
        let mut released = Vec::new();
        let names: Vec<String> = self.held.keys().cloned().collect();

        for name in names {
            let Some(entry) = registry.get(&name) else {
                continue;
            };
            let Some(held) = self.held.get(&name) else {
                continue;
            };

            let since = held.trigger.armed_at;
            let held_for = now.saturating_duration_since(held.held_since);
            if self.is_ready(entry, since) {
                if let Some(held) = self.held.remove(&name) {
                    debug!(scheduler = %name, held_secs = held_for.as_secs(), "Upstreams settled");
                    released.push(Release::Ready(held.trigger));
                }
            } else if held_for >= entry.max_hold() {
                let pending = self.pending_upstreams(entry, since);
                if let Some(held) = self.held.remove(&name) {
                    warn!(
                        scheduler = %name,
                        revision = %held.trigger.change.revision,
                        pending = ?pending,
                        held_secs = held_for.as_secs(),
                        "Upstream hold expired, dispatching with stale upstreams"
                    );
                    released.push(Release::Stale {
                        trigger: held.trigger,
                        pending,
                    });
                }
            }
        }

        released.sort_by_key(|r| registry.graph().rank(&r.trigger().scheduler));
        released
    }
}
