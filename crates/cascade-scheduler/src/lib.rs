//! Change classification, stability windows and dependency-ordered dispatch.
//!
//! A [`SchedulingEngine`] is built from a validated [`SchedulerRegistry`]
//! and driven either directly (tests, replay) or through the
//! [`SchedulerService`] loop.

pub mod classifier;
pub mod coordinator;
pub mod dag;
pub mod engine;
pub mod filter;
pub mod manual;
pub mod pattern;
pub mod registry;
pub mod service;
pub mod window;

pub use classifier::{ClassifiedChange, NONBUILD_TAG, PathClassifier, TagSet};
pub use coordinator::{DependencyCoordinator, Release};
pub use dag::UpstreamGraph;
pub use engine::{DispatchFailure, DispatchReport, SchedulingEngine};
pub use filter::FilterPredicate;
pub use manual::{ForceRequest, ManualTrigger};
pub use registry::{SchedulerEntry, SchedulerRegistry};
pub use service::{ChannelSink, SchedulerService, ServiceHandle};
pub use window::{DebounceWindow, PendingTrigger, TriggerState};
