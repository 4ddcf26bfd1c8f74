//! Compiled name patterns.
//!
//! A pattern is one of:
//!
//! | Source        | Meaning                                   |
//! |---------------|-------------------------------------------|
//! | `*`           | any name                                  |
//! | `logs-?-*`    | wildcard (`*` any sequence, `?` one char) |
//! | `/logs-\d+/`  | regular expression, anchored at both ends |
//! | `logs`        | exact name                                |
//!
//! Patterns are compiled once per configuration generation through a
//! [`PatternCache`]. [`PatternList`] adds negation and declaration order on top.

use crate::error::{ConfigurationError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A single compiled name pattern.
#[derive(Clone)]
pub enum Pattern {
    /// `*`: matches every name.
    Any,
    /// No wildcard characters.
    Constant(String),
    /// Contains `*` or `?`.
    Wildcard { source: String, glob: Vec<char> },
    /// Wrapped in slashes.
    Regex { source: String, regex: Regex },
}

impl Pattern {
    /// Compiles a pattern string.
    pub fn parse(source: &str) -> Result<Self> {
        if source.is_empty() {
            return Err(ConfigurationError::InvalidPattern {
                pattern: source.to_string(),
                reason: "pattern must not be empty".to_string(),
            });
        }

        if source.len() >= 2 && source.starts_with('/') && source.ends_with('/') {
            let body = &source[1..source.len() - 1];
            let regex = Regex::new(&format!("^(?:{body})$")).map_err(|e| {
                ConfigurationError::InvalidRegex {
                    pattern: source.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(Self::Regex {
                source: source.to_string(),
                regex,
            });
        }

        if source.chars().all(|c| c == '*') {
            return Ok(Self::Any);
        }

        if source.contains(['*', '?']) {
            return Ok(Self::Wildcard {
                source: source.to_string(),
                glob: source.chars().collect(),
            });
        }

        Ok(Self::Constant(source.to_string()))
    }

    /// The text this pattern was compiled from.
    pub fn source(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Constant(source)
            | Self::Wildcard { source, .. }
            | Self::Regex { source, .. } => source,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Constant(_))
    }

    /// Whether `name` matches in full.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Constant(constant) => constant == name,
            Self::Wildcard { glob, .. } => glob_run(glob, name).is_some_and(|s| s[glob.len()]),
            Self::Regex { regex, .. } => regex.is_match(name),
        }
    }

    /// Whether some name starting with `prefix` could match.
    ///
    /// Exact for wildcards and constants. Regular expressions are not analysed
    /// and always report `true`.
    pub fn may_match_with_prefix(&self, prefix: &str) -> bool {
        match self {
            Self::Any | Self::Regex { .. } => true,
            Self::Constant(constant) => constant.starts_with(prefix),
            Self::Wildcard { glob, .. } => glob_run(glob, prefix).is_some(),
        }
    }
}

/// Runs the glob automaton over `text`.
///
/// Returns the set of reachable glob positions (index `glob.len()` means the
/// whole glob was consumed), or `None` once no position is reachable.
fn glob_run(glob: &[char], text: &str) -> Option<Vec<bool>> {
    let mut states = vec![false; glob.len() + 1];
    states[0] = true;
    close_over_stars(glob, &mut states);

    for c in text.chars() {
        let mut next = vec![false; glob.len() + 1];
        let mut any = false;
        for (i, token) in glob.iter().enumerate() {
            if !states[i] {
                continue;
            }
            match *token {
                '*' => {
                    next[i] = true;
                    any = true;
                }
                '?' => {
                    next[i + 1] = true;
                    any = true;
                }
                literal if literal == c => {
                    next[i + 1] = true;
                    any = true;
                }
                _ => {}
            }
        }
        if !any {
            return None;
        }
        close_over_stars(glob, &mut next);
        states = next;
    }

    Some(states)
}

/// A `*` may match the empty string, so reaching it also reaches its successor.
fn close_over_stars(glob: &[char], states: &mut [bool]) {
    for (i, token) in glob.iter().enumerate() {
        if states[i] && *token == '*' {
            states[i + 1] = true;
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source()).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source() == other.source()
    }
}

impl Eq for Pattern {}

// ---------------------------------------------------------------------------
// PatternCache
// ---------------------------------------------------------------------------

/// Compiled patterns keyed by their source text.
///
/// Filled while a configuration generation is built and read-only afterwards.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Arc<Pattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pattern for `source`, compiling it on first use.
    pub fn compile(&mut self, source: &str) -> Result<Arc<Pattern>> {
        if let Some(pattern) = self.compiled.get(source) {
            return Ok(Arc::clone(pattern));
        }
        let pattern = Arc::new(Pattern::parse(source)?);
        self.compiled
            .insert(source.to_string(), Arc::clone(&pattern));
        Ok(pattern)
    }

    pub fn get(&self, source: &str) -> Option<Arc<Pattern>> {
        self.compiled.get(source).cloned()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PatternList
// ---------------------------------------------------------------------------

/// One entry of a [`PatternList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPattern {
    pub negated: bool,
    pub pattern: Arc<Pattern>,
}

/// An ordered list of patterns where each entry affirms or negates.
///
/// The entry declared last among those touching any candidate decides, so
/// `["*", "-foo*"]` excludes `foobar` while `["-foo*", "*"]` includes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternList {
    entries: Vec<SignedPattern>,
}

impl PatternList {
    /// Compiles `sources`, treating a leading `negation` character as a negation.
    pub fn compile<S: AsRef<str>>(
        sources: &[S],
        negation: char,
        cache: &mut PatternCache,
    ) -> Result<Self> {
        let entries = sources
            .iter()
            .map(|source| -> Result<SignedPattern> {
                let source = source.as_ref();
                let (negated, body) = match source.strip_prefix(negation) {
                    Some(body) => (true, body),
                    None => (false, source),
                };
                Ok(SignedPattern {
                    negated,
                    pattern: cache.compile(body)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// A single negated `*`.
    pub(crate) fn exclude_all() -> Self {
        Self {
            entries: vec![SignedPattern {
                negated: true,
                pattern: Arc::new(Pattern::Any),
            }],
        }
    }

    pub fn entries(&self) -> &[SignedPattern] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the list selects any of `candidates`.
    pub fn matches_any<S: AsRef<str>>(&self, candidates: &[S]) -> bool {
        self.entries
            .iter()
            .rev()
            .find(|entry| {
                candidates
                    .iter()
                    .any(|candidate| entry.pattern.matches(candidate.as_ref()))
            })
            .is_some_and(|entry| !entry.negated)
    }

    /// Whether the list selects `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.matches_any(&[name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn list(sources: &[&str]) -> PatternList {
        PatternList::compile(sources, '-', &mut PatternCache::new()).unwrap()
    }

    #[test_case("*", "anything", true; "any")]
    #[test_case("logs", "logs", true; "constant equal")]
    #[test_case("logs", "logs2", false; "constant differs")]
    #[test_case("logs-*", "logs-2024", true; "trailing star")]
    #[test_case("logs-*", "logs-", true; "star matches empty")]
    #[test_case("*-prod", "web-prod", true; "leading star")]
    #[test_case("a*b*c", "aXXbYYc", true; "several stars")]
    #[test_case("a*b*c", "aXXbYY", false; "missing suffix")]
    #[test_case("log?", "logs", true; "question mark")]
    #[test_case("log?", "log", false; "question needs one char")]
    #[test_case("d?ta", "däta", true; "question matches multibyte")]
    #[test_case("/logs-\\d+/", "logs-42", true; "regex")]
    #[test_case("/logs-\\d+/", "xlogs-42", false; "regex anchored")]
    fn test_pattern_matches(pattern: &str, name: &str, expected: bool) {
        assert_eq!(Pattern::parse(pattern).unwrap().matches(name), expected);
    }

    #[test_case("object*", "object.", true; "star after prefix")]
    #[test_case("object.child.grandchild*", "object.", true; "longer literal")]
    #[test_case("object.child*", "other.", false; "literal mismatch")]
    #[test_case("a?c", "ab", true; "question inside")]
    #[test_case("abc", "ab", true; "constant prefix")]
    #[test_case("ab", "abc", false; "constant shorter")]
    fn test_may_match_with_prefix(pattern: &str, prefix: &str, expected: bool) {
        assert_eq!(
            Pattern::parse(pattern)
                .unwrap()
                .may_match_with_prefix(prefix),
            expected
        );
    }

    #[test]
    fn test_parse_rejects_empty_and_bad_regex() {
        assert!(matches!(
            Pattern::parse(""),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Pattern::parse("/(unclosed/"),
            Err(ConfigurationError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_single_slash_is_constant() {
        let pattern = Pattern::parse("/").unwrap();
        assert!(matches!(pattern, Pattern::Constant(_)));
        assert!(pattern.matches("/"));
    }

    #[test]
    fn test_cache_reuses_compiled_patterns() {
        let mut cache = PatternCache::new();
        let a = cache.compile("logs-*").unwrap();
        let b = cache.compile("logs-*").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("logs-*").is_some());
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_negation_order() {
        assert!(!list(&["*", "-foo*"]).matches("foobar"));
        assert!(list(&["-foo*", "*"]).matches("foobar"));
        assert!(list(&["*", "-foo*"]).matches("bar"));
    }

    #[test]
    fn test_untouched_candidates_are_not_selected() {
        assert!(!list(&["logs-*"]).matches("metrics"));
        assert!(!list(&[] as &[&str]).matches("logs"));
        assert!(!list(&["-logs"]).matches("logs"));
    }

    #[test]
    fn test_last_touching_entry_decides_across_candidates() {
        // "foobar" is a member of the alias "all": the exclusion touches the
        // index itself after the alias was selected.
        let patterns = list(&["all", "-foo*"]);
        assert!(!patterns.matches_any(&["foobar", "all"]));

        let patterns = list(&["-foo*", "all"]);
        assert!(patterns.matches_any(&["foobar", "all"]));
    }
}
