//! Change filters: predicate trees over classifier tags.

use crate::classifier::{ClassifiedChange, ClassifiedPath};
use crate::pattern::{compile_glob_set, compile_regex};
use cascade_core::ConfigError;
use cascade_core::config::FilterSpec;
use globset::GlobSet;
use regex::Regex;

/// Compiled form of a [`FilterSpec`].
#[derive(Debug, Clone)]
pub enum Predicate {
    HasTag(String),
    PathMatches(Regex),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compile(spec: &FilterSpec, context: &str) -> Result<Self, ConfigError> {
        Ok(match spec {
            FilterSpec::Tag(tag) => Predicate::HasTag(tag.clone()),
            FilterSpec::Path(pattern) => Predicate::PathMatches(compile_regex(pattern, context)?),
            FilterSpec::All(children) => Predicate::All(
                children
                    .iter()
                    .map(|c| Predicate::compile(c, context))
                    .collect::<Result<_, _>>()?,
            ),
            FilterSpec::Any(children) => Predicate::Any(
                children
                    .iter()
                    .map(|c| Predicate::compile(c, context))
                    .collect::<Result<_, _>>()?,
            ),
            FilterSpec::Not(child) => Predicate::Not(Box::new(Predicate::compile(child, context)?)),
        })
    }

    /// Evaluate against one file. `all`/`any` short-circuit.
    pub fn eval(&self, file: &ClassifiedPath<'_>) -> bool {
        match self {
            Predicate::HasTag(tag) => file.has(tag),
            Predicate::PathMatches(re) => re.is_match(file.path),
            Predicate::All(children) => children.iter().all(|c| c.eval(file)),
            Predicate::Any(children) => children.iter().any(|c| c.eval(file)),
            Predicate::Not(child) => !child.eval(file),
        }
    }
}

/// Decides whether a change is relevant to one scheduler.
///
/// The predicate is evaluated per file and the change matches when at least
/// one file satisfies it, so `tag: llvm` combined with `not: {tag: nonbuild}`
/// ignores documentation files inside an otherwise relevant commit, and a
/// change whose only files are excluded never matches.
#[derive(Debug, Clone)]
pub struct FilterPredicate {
    predicate: Predicate,
    /// `None` accepts every branch.
    branches: Option<GlobSet>,
}

impl FilterPredicate {
    pub fn new(spec: &FilterSpec, branches: &[String], context: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            predicate: Predicate::compile(spec, context)?,
            branches: if branches.is_empty() {
                None
            } else {
                Some(compile_glob_set(branches, context)?)
            },
        })
    }

    pub fn matches(&self, change: &ClassifiedChange<'_>) -> bool {
        self.branch_matches(&change.change.branch)
            && change.files.iter().any(|file| self.predicate.eval(file))
    }

    fn branch_matches(&self, branch: &str) -> bool {
        self.branches.as_ref().is_none_or(|set| set.is_match(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{NONBUILD_TAG, PathClassifier};
    use cascade_core::change::Change;
    use cascade_core::config::{ClassificationRule, PatternSpec};

    fn classifier() -> PathClassifier {
        PathClassifier::new(&[
            ClassificationRule::new("llvm", PatternSpec::Prefix("llvm/".into())),
            ClassificationRule::new("clang", PatternSpec::Prefix("clang/".into())),
            ClassificationRule::new("llvm-test", PatternSpec::Regex(r"^llvm/test/.+/".into())),
            ClassificationRule::new(NONBUILD_TAG, PatternSpec::Suffix(".rst".into())),
        ])
        .unwrap()
    }

    fn llvm_build_filter() -> FilterPredicate {
        let spec = FilterSpec::all([
            FilterSpec::tag("llvm"),
            FilterSpec::not(FilterSpec::tag("llvm-test")),
            FilterSpec::not(FilterSpec::tag(NONBUILD_TAG)),
        ]);
        FilterPredicate::new(&spec, &[], "scheduler 's_llvm'").unwrap()
    }

    #[test]
    fn test_llvm_source_matches() {
        let classifier = classifier();
        let change = Change::new("r12345", "master", ["llvm/lib/IR/Core.cpp"]);
        assert!(llvm_build_filter().matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_docs_only_change_does_not_match() {
        let classifier = classifier();
        let change = Change::new("r1", "master", ["llvm/docs/LangRef.rst"]);
        assert!(!llvm_build_filter().matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_mixed_change_matches_on_relevant_file() {
        let classifier = classifier();
        let change = Change::new(
            "r1",
            "master",
            ["llvm/docs/LangRef.rst", "llvm/lib/IR/Core.cpp"],
        );
        assert!(llvm_build_filter().matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_empty_change_never_matches() {
        let classifier = classifier();
        let change = Change::new("r1", "master", Vec::<String>::new());
        assert!(!llvm_build_filter().matches(&classifier.classify_change(&change)));

        let negative_only = FilterPredicate::new(
            &FilterSpec::not(FilterSpec::tag(NONBUILD_TAG)),
            &[],
            "test",
        )
        .unwrap();
        assert!(!negative_only.matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_test_tree_excluded() {
        let classifier = classifier();
        let change = Change::new("r1", "master", ["llvm/test/CodeGen/X86/add.ll"]);
        assert!(!llvm_build_filter().matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_any_of_projects() {
        let classifier = classifier();
        let spec = FilterSpec::any([FilterSpec::tag("llvm"), FilterSpec::tag("clang")]);
        let filter = FilterPredicate::new(&spec, &[], "test").unwrap();

        let change = Change::new("r1", "master", ["clang/lib/Sema/Sema.cpp"]);
        assert!(filter.matches(&classifier.classify_change(&change)));

        let change = Change::new("r1", "master", ["lld/ELF/Driver.cpp"]);
        assert!(!filter.matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_path_leaf() {
        let classifier = classifier();
        let spec = FilterSpec::all([
            FilterSpec::tag("llvm"),
            FilterSpec::not(FilterSpec::path(r"^llvm/utils/gn/")),
        ]);
        let filter = FilterPredicate::new(&spec, &[], "test").unwrap();

        let change = Change::new("r1", "master", ["llvm/utils/gn/secondary/BUILD.gn"]);
        assert!(!filter.matches(&classifier.classify_change(&change)));
    }

    #[test]
    fn test_branch_restriction() {
        let classifier = classifier();
        let spec = FilterSpec::tag("llvm");
        let filter = FilterPredicate::new(&spec, &["master".to_string()], "test").unwrap();

        let on_master = Change::new("r1", "master", ["llvm/lib/IR/Core.cpp"]);
        let on_release = Change::new("r1", "release/17.x", ["llvm/lib/IR/Core.cpp"]);
        assert!(filter.matches(&classifier.classify_change(&on_master)));
        assert!(!filter.matches(&classifier.classify_change(&on_release)));
    }

    #[test]
    fn test_release_branch_glob() {
        let classifier = classifier();
        let filter = FilterPredicate::new(
            &FilterSpec::tag("llvm"),
            &["release/*.x*".to_string()],
            "test",
        )
        .unwrap();

        let rc = Change::new("r1", "release/17.x-rc1", ["llvm/lib/IR/Core.cpp"]);
        let master = Change::new("r1", "master", ["llvm/lib/IR/Core.cpp"]);
        assert!(filter.matches(&classifier.classify_change(&rc)));
        assert!(!filter.matches(&classifier.classify_change(&master)));
    }

    #[test]
    fn test_unparseable_branch_glob() {
        let err = FilterPredicate::new(&FilterSpec::tag("llvm"), &["release/[".to_string()], "scheduler 's_bad'")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref context, .. } if context == "scheduler 's_bad'"));
    }

    #[test]
    fn test_unparseable_path_pattern() {
        let err = FilterPredicate::new(&FilterSpec::path("(["), &[], "scheduler 's_bad'")
            .unwrap_err();
        assert!(err.to_string().contains("scheduler 's_bad'"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let classifier = classifier();
        let filter = llvm_build_filter();
        let change = Change::new(
            "r1",
            "master",
            ["llvm/docs/LangRef.rst", "llvm/lib/IR/Core.cpp"],
        );
        let classified = classifier.classify_change(&change);
        let results: Vec<_> = (0..5).map(|_| filter.matches(&classified)).collect();
        assert!(results.iter().all(|&r| r));
    }
}
