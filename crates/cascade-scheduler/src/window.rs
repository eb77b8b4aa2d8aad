//! Stability windows that coalesce bursts of relevant changes.

use cascade_core::change::Change;
use cascade_core::ids::TriggerId;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Armed,
    Fired,
}

/// Pending build request for one scheduler.
#[derive(Debug, Clone)]
pub struct PendingTrigger {
    pub id: TriggerId,
    pub scheduler: String,
    /// Most recent matching change seen while the window was open.
    pub change: Change,
    /// When the window first opened.
    pub armed_at: Instant,
    pub deadline: Instant,
    /// Number of matching changes folded into this trigger.
    pub matches: u32,
    pub state: TriggerState,
}

impl PendingTrigger {
    fn new(scheduler: &str, change: &Change, now: Instant, deadline: Instant) -> Self {
        Self {
            id: TriggerId::new(),
            scheduler: scheduler.to_string(),
            change: change.clone(),
            armed_at: now,
            deadline,
            matches: 1,
            state: TriggerState::Armed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed,
    Rearmed,
}

/// Per-scheduler deadlines checked by the scheduling loop.
///
/// No timers are involved: re-arming overwrites the deadline in place and
/// [`DebounceWindow::on_tick`] compares deadlines against the tick time.
#[derive(Debug, Default)]
pub struct DebounceWindow {
    armed: HashMap<String, PendingTrigger>,
}

impl DebounceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the scheduler's window, or push an armed window's deadline out to
    /// a full `window` from `now`.
    ///
    /// A steady stream of matching changes keeps pushing the deadline, so a
    /// busy tree can delay the build indefinitely. Stability wins over
    /// latency here.
    pub fn on_match(
        &mut self,
        scheduler: &str,
        window: Duration,
        change: &Change,
        now: Instant,
    ) -> ArmOutcome {
        let deadline = now + window;

        if let Some(pending) = self.armed.get_mut(scheduler) {
            // Deadlines only move forward.
            pending.deadline = pending.deadline.max(deadline);
            pending.change = change.clone();
            pending.matches += 1;
            debug!(
                scheduler,
                revision = %change.revision,
                matches = pending.matches,
                "Stability window re-armed"
            );
            return ArmOutcome::Rearmed;
        }

        let pending = PendingTrigger::new(scheduler, change, now, deadline);
        info!(
            scheduler,
            revision = %change.revision,
            trigger_id = %pending.id,
            window_secs = window.as_secs(),
            "Stability window armed"
        );
        self.armed.insert(scheduler.to_string(), pending);
        ArmOutcome::Armed
    }

    /// Remove and return every trigger whose deadline has passed, each
    /// marked [`TriggerState::Fired`], earliest deadline first.
    pub fn on_tick(&mut self, now: Instant) -> Vec<PendingTrigger> {
        let due: Vec<String> = self
            .armed
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();

        let mut fired: Vec<PendingTrigger> = due
            .into_iter()
            .filter_map(|name| self.armed.remove(&name))
            .map(|mut p| {
                p.state = TriggerState::Fired;
                p
            })
            .collect();

        fired.sort_by(|a, b| {
            a.deadline
                .cmp(&b.deadline)
                .then_with(|| a.scheduler.cmp(&b.scheduler))
        });
        fired
    }

    pub fn get(&self, scheduler: &str) -> Option<&PendingTrigger> {
        self.armed.get(scheduler)
    }

    pub fn is_armed(&self, scheduler: &str) -> bool {
        self.armed.contains_key(scheduler)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
