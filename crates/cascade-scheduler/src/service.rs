//! The scheduling loop.
//!
//! Changes, build outcomes and forced builds from any number of producers
//! funnel through one unbounded queue into a single task that owns the
//! [`SchedulingEngine`]. The same task ticks the engine on a fixed interval.

use crate::engine::{DispatchReport, SchedulingEngine};
use crate::manual::ForceRequest;
use cascade_core::change::Change;
use cascade_core::dispatch::{BuildOutcome, DispatchRequest};
use cascade_core::events::FeedRecord;
use cascade_core::ports::DispatchSink;
use cascade_core::{Error, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

enum Message {
    Change(Change),
    Outcome(BuildOutcome),
    Force {
        request: ForceRequest,
        reply: oneshot::Sender<Result<DispatchReport>>,
    },
}

/// Producer side of the scheduling loop.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ServiceHandle {
    pub fn submit_change(&self, change: Change) -> Result<()> {
        self.send(Message::Change(change))
    }

    pub fn submit_outcome(&self, outcome: BuildOutcome) -> Result<()> {
        self.send(Message::Outcome(outcome))
    }

    pub fn submit(&self, record: FeedRecord) -> Result<()> {
        match record {
            FeedRecord::Change(change) => self.submit_change(change),
            FeedRecord::Outcome(outcome) => self.submit_outcome(outcome),
        }
    }

    /// Force a build and wait for the loop to emit it.
    pub async fn force(&self, request: ForceRequest) -> Result<DispatchReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Force { request, reply })?;
        rx.await
            .map_err(|_| Error::Internal("scheduler service dropped the request".to_string()))?
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Internal("scheduler service is not running".to_string()))
    }
}

pub struct SchedulerService {
    engine: SchedulingEngine,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl SchedulerService {
    pub fn new(engine: SchedulingEngine) -> (Self, ServiceHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        (Self { engine, inbox }, ServiceHandle { tx })
    }

    /// Run until `shutdown` flips to true.
    ///
    /// Once every [`ServiceHandle`] is dropped the loop keeps ticking until
    /// no stability window is armed, then returns. Triggers still held on
    /// upstreams at that point are dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulingEngine {
        let period = self.engine.registry().tick_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbox_open = true;

        info!(
            schedulers = self.engine.registry().len(),
            tick_ms = period.as_millis() as u64,
            "Starting scheduler service"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.engine.tick(Instant::now());
                    Self::log_report("tick", &report);
                    if !inbox_open && self.engine.windows().is_empty() {
                        let held = self.engine.coordinator().held().count();
                        if held > 0 {
                            warn!(held, "Input closed with triggers still waiting on upstreams");
                        }
                        info!("Scheduler service drained");
                        break;
                    }
                }
                message = self.inbox.recv(), if inbox_open => {
                    match message {
                        Some(message) => self.handle(message),
                        None => {
                            debug!("All service handles dropped, draining");
                            inbox_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler service shutting down");
                        break;
                    }
                }
            }
        }

        self.engine
    }

    fn handle(&mut self, message: Message) {
        let now = Instant::now();
        match message {
            Message::Change(change) => {
                self.engine.ingest_change(&change, now);
            }
            Message::Outcome(outcome) => {
                let report = self.engine.ingest_outcome(&outcome, now);
                Self::log_report("outcome", &report);
            }
            Message::Force { request, reply } => {
                let result = self.engine.manual().submit(&request);
                if reply.send(result).is_err() {
                    debug!("Force requester went away before the reply");
                }
            }
        }
    }

    fn log_report(source: &str, report: &DispatchReport) {
        if !report.is_empty() {
            debug!(
                source,
                dispatched = report.dispatched.len(),
                failed = report.failures.len(),
                "Dispatch round finished"
            );
        }
    }
}

/// [`DispatchSink`] over an unbounded channel. Never blocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DispatchRequest>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DispatchSink for ChannelSink {
    fn submit(&self, request: &DispatchRequest) -> Result<()> {
        self.tx
            .send(request.clone())
            .map_err(|_| Error::Dispatch("dispatch channel closed".to_string()))
    }
}
