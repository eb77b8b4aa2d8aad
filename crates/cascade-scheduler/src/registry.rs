//! Validated scheduler registry.

use crate::classifier::PathClassifier;
use crate::dag::UpstreamGraph;
use crate::filter::FilterPredicate;
use cascade_core::ConfigError;
use cascade_core::config::{CascadeConfig, ManualSettings, SchedulerSpec, WaitPolicy};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::time::Duration;
use tracing::{info, warn};

/// A scheduler with its filter compiled.
#[derive(Debug, Clone)]
pub struct SchedulerEntry {
    spec: SchedulerSpec,
    filter: FilterPredicate,
    window: Duration,
    max_hold: Duration,
}

impl SchedulerEntry {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn builders(&self) -> &[String] {
        &self.spec.builders
    }

    pub fn upstreams(&self) -> &[String] {
        &self.spec.upstreams
    }

    pub fn wait(&self) -> WaitPolicy {
        self.spec.wait
    }

    pub fn enabled(&self) -> bool {
        self.spec.enabled
    }

    /// Stability window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Longest a fired trigger waits for upstreams.
    pub fn max_hold(&self) -> Duration {
        self.max_hold
    }

    pub fn filter(&self) -> &FilterPredicate {
        &self.filter
    }
}

/// Every scheduler, the upstream graph and the classifier, validated as a
/// unit. Loading either succeeds completely or yields a [`ConfigError`].
#[derive(Debug, Clone)]
pub struct SchedulerRegistry {
    /// Entries in topological order.
    entries: Vec<SchedulerEntry>,
    index: HashMap<String, usize>,
    graph: UpstreamGraph,
    classifier: PathClassifier,
    builders: BTreeSet<String>,
    manual: ManualSettings,
    tick_interval: Duration,
}

impl SchedulerRegistry {
    pub fn load(config: &CascadeConfig) -> Result<Self, ConfigError> {
        if config.engine.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "engine.tick_interval_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if config.manual.default_branch.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                setting: "manual.default_branch".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let classifier = PathClassifier::new(&config.classifier)?;
        Self::check_names(&config.schedulers)?;
        let graph = UpstreamGraph::build(&config.schedulers)?;

        let known_tags = classifier.known_tags();
        let mut entries = Vec::with_capacity(config.schedulers.len());
        for spec in &config.schedulers {
            let context = format!("scheduler '{}'", spec.name);
            let filter = FilterPredicate::new(&spec.filter, &spec.branches, &context)?;

            for tag in spec.filter.tags() {
                if !known_tags.contains(tag) {
                    warn!(
                        scheduler = %spec.name,
                        tag,
                        "Filter references a tag no classifier rule emits"
                    );
                }
            }

            let max_hold = spec
                .max_upstream_hold_secs
                .unwrap_or(config.engine.max_upstream_hold_secs);

            entries.push(SchedulerEntry {
                spec: spec.clone(),
                filter,
                window: Duration::from_secs(spec.stable_secs),
                max_hold: Duration::from_secs(max_hold),
            });
        }
        entries.sort_by_key(|e| graph.rank(e.name()));

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name().to_string(), i))
            .collect();

        let builders = config
            .builder_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        info!(
            schedulers = entries.len(),
            rules = classifier.len(),
            "Scheduler registry loaded"
        );

        Ok(Self {
            entries,
            index,
            graph,
            classifier,
            builders,
            manual: config.manual.clone(),
            tick_interval: Duration::from_secs(config.engine.tick_interval_secs),
        })
    }

    fn check_names(specs: &[SchedulerSpec]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateScheduler(spec.name.clone()));
            }
            if spec.builders.is_empty() || spec.builders.iter().any(|b| b.trim().is_empty()) {
                return Err(ConfigError::NoBuilders(spec.name.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SchedulerEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Schedulers, upstreams first.
    pub fn entries(&self) -> impl Iterator<Item = &SchedulerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn graph(&self) -> &UpstreamGraph {
        &self.graph
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    pub fn is_known_builder(&self, builder: &str) -> bool {
        self.builders.contains(builder)
    }

    pub fn builders(&self) -> impl Iterator<Item = &str> {
        self.builders.iter().map(String::as_str)
    }

    /// Schedulers that list `builder`.
    pub fn schedulers_for_builder<'a>(&'a self, builder: &'a str) -> impl Iterator<Item = &'a SchedulerEntry> {
        self.entries
            .iter()
            .filter(move |e| e.builders().iter().any(|b| b == builder))
    }

    pub fn manual(&self) -> &ManualSettings {
        &self.manual
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }
}
