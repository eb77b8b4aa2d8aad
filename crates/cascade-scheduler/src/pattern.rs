//! Compiled path and branch patterns.

use cascade_core::ConfigError;
use cascade_core::config::PatternSpec;
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use regex::Regex;

/// A [`PatternSpec`] ready for matching.
#[derive(Debug, Clone)]
pub enum Pattern {
    Prefix(String),
    Suffix(String),
    Regex(Regex),
    Glob(GlobMatcher),
}

impl Pattern {
    /// Compile a pattern, naming `context` in the error if it is unparseable.
    pub fn compile(spec: &PatternSpec, context: &str) -> Result<Self, ConfigError> {
        Ok(match spec {
            PatternSpec::Prefix(p) => Pattern::Prefix(p.clone()),
            PatternSpec::Suffix(s) => Pattern::Suffix(s.clone()),
            PatternSpec::Regex(r) => Pattern::Regex(compile_regex(r, context)?),
            PatternSpec::Glob(g) => Pattern::Glob(compile_glob(g, context)?.compile_matcher()),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Pattern::Prefix(p) => text.starts_with(p.as_str()),
            Pattern::Suffix(s) => text.ends_with(s.as_str()),
            Pattern::Regex(re) => re.is_match(text),
            Pattern::Glob(glob) => glob.is_match(text),
        }
    }
}

fn invalid(context: &str, pattern: &str, message: impl ToString) -> ConfigError {
    ConfigError::InvalidPattern {
        context: context.to_string(),
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
}

pub(crate) fn compile_regex(pattern: &str, context: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| invalid(context, pattern, e))
}

/// `*` and `?` stop at `/`; `**` crosses directories.
fn compile_glob(pattern: &str, context: &str) -> Result<globset::Glob, ConfigError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| invalid(context, pattern, e))
}

/// Compile a list of globs into one set, e.g. a scheduler's branch list.
pub(crate) fn compile_glob_set(patterns: &[String], context: &str) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_glob(pattern, context)?);
    }
    builder
        .build()
        .map_err(|e| invalid(context, &patterns.join(", "), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str) -> Pattern {
        Pattern::compile(&PatternSpec::Glob(pattern.into()), "test").unwrap()
    }

    #[test]
    fn test_glob_exact() {
        assert!(glob("master").matches("master"));
        assert!(!glob("master").matches("main"));
    }

    #[test]
    fn test_glob_levels() {
        assert!(glob("release/*").matches("release/17.x"));
        assert!(!glob("release/*").matches("release/17.x/hotfix"));
        assert!(glob("llvm/docs/**").matches("llvm/docs/LangRef.rst"));
        assert!(glob("llvm/docs/**").matches("llvm/docs/CommandGuide/llc.rst"));
        assert!(glob("**").matches("anything/at/all"));
    }

    #[test]
    fn test_glob_directory_boundary() {
        assert!(!glob("llvm/docs/**").matches("llvm/docsx/a.rst"));
        assert!(!glob("llvm/docs/**").matches("llvm/docs.txt"));
    }

    #[test]
    fn test_glob_several_wildcards() {
        assert!(glob("release/*.x*").matches("release/17.x-rc1"));
        assert!(glob("**/*.rst").matches("clang/docs/ReleaseNotes.rst"));
        assert!(glob("llvm/*.txt").matches("llvm/CREDITS.txt"));
        assert!(!glob("llvm/*.txt").matches("llvm/lib/CMakeLists.txt"));
        assert!(!glob("ab*ba").matches("aba"));
    }

    #[test]
    fn test_unparseable_glob_rejected() {
        let err = Pattern::compile(&PatternSpec::Glob("llvm/[docs".into()), "classifier rule 'docs'")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPattern { ref context, ref pattern, .. }
                if context == "classifier rule 'docs'" && pattern == "llvm/[docs"
        ));
    }

    #[test]
    fn test_glob_set_matches_any_member() {
        let set = compile_glob_set(&["master".to_string(), "release/*".to_string()], "test").unwrap();
        assert!(set.is_match("master"));
        assert!(set.is_match("release/17.x"));
        assert!(!set.is_match("users/dev/feature"));
    }

    #[test]
    fn test_pattern_kinds() {
        let prefix = Pattern::compile(&PatternSpec::Prefix("llvm/".into()), "test").unwrap();
        assert!(prefix.matches("llvm/lib/IR/Core.cpp"));
        assert!(!prefix.matches("clang/lib/Sema/Sema.cpp"));

        let suffix = Pattern::compile(&PatternSpec::Suffix(".rst".into()), "test").unwrap();
        assert!(suffix.matches("llvm/docs/LangRef.rst"));

        let regex = Pattern::compile(&PatternSpec::Regex(r"^llvm/test/.+/".into()), "test").unwrap();
        assert!(regex.matches("llvm/test/CodeGen/X86/add.ll"));
        assert!(!regex.matches("llvm/test/lit.cfg.py"));
    }

    #[test]
    fn test_invalid_regex_names_context() {
        let err = Pattern::compile(&PatternSpec::Regex("llvm/(".into()), "classifier rule 'llvm'")
            .unwrap_err();
        match err {
            ConfigError::InvalidPattern {
                context, pattern, ..
            } => {
                assert_eq!(context, "classifier rule 'llvm'");
                assert_eq!(pattern, "llvm/(");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
