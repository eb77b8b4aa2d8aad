//! Path classification into project and kind tags.

use crate::pattern::Pattern;
use cascade_core::ConfigError;
use cascade_core::change::Change;
use cascade_core::config::ClassificationRule;
use std::collections::BTreeSet;

/// Tags attached to one path. Ordered so output is stable.
pub type TagSet = BTreeSet<String>;

/// Tag conventionally used for documentation and other files that never
/// affect a build.
pub const NONBUILD_TAG: &str = "nonbuild";

#[derive(Debug, Clone)]
struct CompiledRule {
    tag: String,
    pattern: Pattern,
    unless: Vec<Pattern>,
}

impl CompiledRule {
    fn applies(&self, path: &str) -> bool {
        self.pattern.matches(path) && !self.unless.iter().any(|p| p.matches(path))
    }
}

/// Ordered rule list. Every matching rule contributes its tag; there is no
/// first-match-wins.
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    rules: Vec<CompiledRule>,
}

impl PathClassifier {
    pub fn new(rules: &[ClassificationRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let context = format!("classifier rule '{}'", rule.tag);
                Ok(CompiledRule {
                    tag: rule.tag.clone(),
                    pattern: Pattern::compile(&rule.pattern, &context)?,
                    unless: rule
                        .unless
                        .iter()
                        .map(|p| Pattern::compile(p, &context))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// Tags for a single path. Unmatched paths get an empty set.
    pub fn classify(&self, path: &str) -> TagSet {
        self.rules
            .iter()
            .filter(|rule| rule.applies(path))
            .map(|rule| rule.tag.clone())
            .collect()
    }

    /// Classify every file of a change once, for evaluation by many filters.
    pub fn classify_change<'a>(&self, change: &'a Change) -> ClassifiedChange<'a> {
        let files = change
            .files
            .iter()
            .map(|path| ClassifiedPath {
                path: path.as_str(),
                tags: self.classify(path),
            })
            .collect();
        ClassifiedChange { change, files }
    }

    /// Every tag some rule can emit.
    pub fn known_tags(&self) -> BTreeSet<&str> {
        self.rules.iter().map(|r| r.tag.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedPath<'a> {
    pub path: &'a str,
    pub tags: TagSet,
}

impl ClassifiedPath<'_> {
    pub fn has(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A change whose files have been tagged.
#[derive(Debug, Clone)]
pub struct ClassifiedChange<'a> {
    pub change: &'a Change,
    pub files: Vec<ClassifiedPath<'a>>,
}

impl ClassifiedChange<'_> {
    /// Union of the tags of every file.
    pub fn tags(&self) -> TagSet {
        self.files
            .iter()
            .flat_map(|f| f.tags.iter().cloned())
            .collect()
    }
}
