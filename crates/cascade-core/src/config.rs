//! Scheduler configuration types.
//!
//! These types represent the operator-authored YAML document that declares
//! the path classifier, the schedulers, and the manual trigger. They are
//! plain data: compiling patterns and validating the upstream graph happens
//! when the scheduler registry is loaded.

use crate::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CascadeConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    /// Ordered classification rules. Every matching rule contributes its tag.
    #[serde(default)]
    pub classifier: Vec<ClassificationRule>,
    #[serde(default)]
    pub schedulers: Vec<SchedulerSpec>,
    #[serde(default)]
    pub manual: ManualSettings,
}

impl CascadeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Every builder name reachable through a scheduler or the manual trigger.
    pub fn builder_names(&self) -> BTreeSet<&str> {
        self.schedulers
            .iter()
            .flat_map(|s| s.builders.iter())
            .chain(self.manual.builders.iter())
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineSettings {
    /// Interval of the scheduling loop tick.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// How long a fired trigger may wait for its upstreams before it is
    /// dispatched anyway with a stale-upstream annotation.
    #[serde(default = "default_max_upstream_hold")]
    pub max_upstream_hold_secs: u64,
}

fn default_tick_interval() -> u64 {
    1
}

fn default_max_upstream_hold() -> u64 {
    2 * 60 * 60
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            max_upstream_hold_secs: default_max_upstream_hold(),
        }
    }
}

/// A path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatternSpec {
    Prefix(String),
    Suffix(String),
    /// Regular expression, matched anywhere in the path unless anchored.
    Regex(String),
    /// `*`, `dir/*` (one level) or `dir/**` (any depth).
    Glob(String),
}

impl PatternSpec {
    pub fn source(&self) -> &str {
        match self {
            PatternSpec::Prefix(s)
            | PatternSpec::Suffix(s)
            | PatternSpec::Regex(s)
            | PatternSpec::Glob(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationRule {
    pub tag: String,
    #[serde(flatten)]
    pub pattern: PatternSpec,
    /// Exceptions: a path matching any of these does not receive the tag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unless: Vec<PatternSpec>,
}

impl ClassificationRule {
    pub fn new(tag: impl Into<String>, pattern: PatternSpec) -> Self {
        Self {
            tag: tag.into(),
            pattern,
            unless: vec![],
        }
    }

    pub fn unless(mut self, pattern: PatternSpec) -> Self {
        self.unless.push(pattern);
        self
    }
}

/// Predicate tree over classifier tags, evaluated per changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterSpec {
    /// The file carries this tag.
    Tag(String),
    /// The file path matches this regular expression.
    Path(String),
    All(Vec<FilterSpec>),
    Any(Vec<FilterSpec>),
    Not(Box<FilterSpec>),
}

impl FilterSpec {
    pub fn tag(tag: impl Into<String>) -> Self {
        FilterSpec::Tag(tag.into())
    }

    pub fn path(pattern: impl Into<String>) -> Self {
        FilterSpec::Path(pattern.into())
    }

    pub fn all(children: impl IntoIterator<Item = FilterSpec>) -> Self {
        FilterSpec::All(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = FilterSpec>) -> Self {
        FilterSpec::Any(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterSpec) -> Self {
        FilterSpec::Not(Box::new(child))
    }

    /// Tags referenced anywhere in the tree.
    pub fn tags(&self) -> BTreeSet<&str> {
        let mut tags = BTreeSet::new();
        self.visit(&mut |node| {
            if let FilterSpec::Tag(t) = node {
                tags.insert(t.as_str());
            }
        });
        tags
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a FilterSpec)) {
        f(self);
        match self {
            FilterSpec::All(children) | FilterSpec::Any(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            FilterSpec::Not(child) => child.visit(f),
            FilterSpec::Tag(_) | FilterSpec::Path(_) => {}
        }
    }
}

/// Whether a downstream scheduler waits for every upstream or just one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    All,
    #[default]
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchedulerSpec {
    pub name: String,
    pub filter: FilterSpec,
    /// Stability window. Zero dispatches on the next tick.
    #[serde(default)]
    pub stable_secs: u64,
    pub builders: Vec<String>,
    #[serde(default)]
    pub upstreams: Vec<String>,
    #[serde(default)]
    pub wait: WaitPolicy,
    /// Branch globs; empty accepts every branch.
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub max_upstream_hold_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl SchedulerSpec {
    pub fn new(
        name: impl Into<String>,
        filter: FilterSpec,
        builders: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            filter,
            stable_secs: 0,
            builders: builders.into_iter().map(Into::into).collect(),
            upstreams: vec![],
            wait: WaitPolicy::default(),
            branches: vec![],
            enabled: true,
            max_upstream_hold_secs: None,
        }
    }

    pub fn stable_secs(mut self, secs: u64) -> Self {
        self.stable_secs = secs;
        self
    }

    pub fn upstreams(
        mut self,
        upstreams: impl IntoIterator<Item = impl Into<String>>,
        wait: WaitPolicy,
    ) -> Self {
        self.upstreams = upstreams.into_iter().map(Into::into).collect();
        self.wait = wait;
        self
    }

    pub fn branches(mut self, branches: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn max_hold_secs(mut self, secs: u64) -> Self {
        self.max_upstream_hold_secs = Some(secs);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManualSettings {
    /// Branch used when a forced build does not name one.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Builders that may only be forced, in addition to every scheduler's builders.
    #[serde(default)]
    pub builders: Vec<String>,
}

fn default_branch() -> String {
    "master".to_string()
}

impl Default for ManualSettings {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            builders: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
classifier:
  - tag: llvm
    prefix: "llvm/"
  - tag: nonbuild
    suffix: ".rst"
    unless:
      - suffix: "/CMakeLists.txt"
schedulers:
  - name: s_llvm
    filter:
      all:
        - tag: llvm
        - not:
            tag: nonbuild
    stable_secs: 2
    builders: [llvm-x86_64-linux]
  - name: s_clang
    filter: { tag: clang }
    builders: [clang-x86_64-linux]
    upstreams: [s_llvm]
    wait: all
    branches: [master]
    enabled: false
"#;

    #[test]
    fn test_parse_sample() {
        let config = CascadeConfig::from_yaml_str(SAMPLE).unwrap();

        assert_eq!(config.engine.tick_interval_secs, 1);
        assert_eq!(config.engine.max_upstream_hold_secs, 7200);
        assert_eq!(config.manual.default_branch, "master");

        assert_eq!(config.classifier.len(), 2);
        assert_eq!(
            config.classifier[0].pattern,
            PatternSpec::Prefix("llvm/".to_string())
        );
        assert_eq!(
            config.classifier[1].unless,
            vec![PatternSpec::Suffix("/CMakeLists.txt".to_string())]
        );

        let llvm = &config.schedulers[0];
        assert_eq!(
            llvm.filter,
            FilterSpec::all([FilterSpec::tag("llvm"), FilterSpec::not(FilterSpec::tag("nonbuild"))])
        );
        assert_eq!(llvm.stable_secs, 2);
        assert_eq!(llvm.wait, WaitPolicy::Any);
        assert!(llvm.enabled);

        let clang = &config.schedulers[1];
        assert_eq!(clang.wait, WaitPolicy::All);
        assert_eq!(clang.upstreams, vec!["s_llvm".to_string()]);
        assert!(!clang.enabled);
    }

    #[test]
    fn test_filter_tags() {
        let filter = FilterSpec::all([
            FilterSpec::any([FilterSpec::tag("llvm"), FilterSpec::tag("clang")]),
            FilterSpec::not(FilterSpec::tag("nonbuild")),
            FilterSpec::path("^docs/"),
        ]);
        let tags: Vec<_> = filter.tags().into_iter().collect();
        assert_eq!(tags, vec!["clang", "llvm", "nonbuild"]);
    }

    #[test]
    fn test_builder_names_include_manual() {
        let mut config = CascadeConfig::from_yaml_str(SAMPLE).unwrap();
        config.manual.builders.push("clang-3stage-x86_64-linux".to_string());

        let names = config.builder_names();
        assert!(names.contains("llvm-x86_64-linux"));
        assert!(names.contains("clang-3stage-x86_64-linux"));
    }
}
