//! Field-level security.
//!
//! Field paths are dot separated (`address.street`). A pattern matching an
//! ancestor segment applies to every descendant until a later, more specific
//! pattern overrides it:
//!
//! ```text
//! ["object*", "~object.child*", "object.child.grandchild*"]
//!
//!   object                    allowed
//!   object.child              denied   (but may exist as a container)
//!   object.child.grandchild   allowed
//! ```
//!
//! A list made only of inclusions denies everything it does not include. Any
//! other list allows what no pattern touches.

use crate::error::Result;
use crate::memo::BoundedMemo;
use crate::pattern::{PatternCache, PatternList};
use std::sync::Arc;

const KEYWORD_SUFFIX: &str = ".keyword";

/// `field.keyword` sub-fields share the decision of `field`.
pub(crate) fn strip_keyword(path: &str) -> &str {
    path.strip_suffix(KEYWORD_SUFFIX)
        .filter(|base| !base.is_empty())
        .unwrap_or(path)
}

/// `path` followed by its proper ancestors, deepest first.
pub(crate) fn self_and_ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(path.rmatch_indices('.').map(move |(i, _)| &path[..i]))
}

// ---------------------------------------------------------------------------
// FieldPatterns
// ---------------------------------------------------------------------------

/// The FLS patterns of one permission entry.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldPatterns {
    sources: Vec<String>,
    list: PatternList,
    allowed_by_default: bool,
}

impl FieldPatterns {
    /// Compiles a non-empty pattern list; `~` negates.
    pub fn compile(sources: &[String], cache: &mut PatternCache) -> Result<Self> {
        let list = PatternList::compile(sources, '~', cache)?;
        let allowed_by_default = list.entries().iter().any(|entry| entry.negated);
        Ok(Self {
            sources: sources.to_vec(),
            list,
            allowed_by_default,
        })
    }

    /// Hides every field.
    fn exclude_all() -> Self {
        Self {
            sources: vec!["~*".to_string()],
            list: PatternList::exclude_all(),
            allowed_by_default: false,
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Position of the last entry matching `path` or one of its ancestors.
    fn last_touching(&self, path: &str) -> Option<usize> {
        self.list.entries().iter().rposition(|entry| {
            self_and_ancestors(path).any(|candidate| entry.pattern.matches(candidate))
        })
    }

    /// Whether a leaf value at `path` may be returned, given that every
    /// ancestor is allowed.
    pub fn is_allowed_assuming_parents_are_allowed(&self, path: &str) -> bool {
        match self.last_touching(path) {
            Some(position) => !self.list.entries()[position].negated,
            None => self.allowed_by_default,
        }
    }

    /// Whether `path` may exist as an object, given that every ancestor is
    /// allowed. True when the path itself is allowed or when an inclusion
    /// declared after the deciding exclusion can still reach a descendant.
    pub fn is_object_allowed_assuming_parents_are_allowed(&self, path: &str) -> bool {
        let last = self.last_touching(path);
        let allowed = match last {
            Some(position) => !self.list.entries()[position].negated,
            None => self.allowed_by_default,
        };
        if allowed {
            return true;
        }

        let first_candidate = last.map_or(0, |position| position + 1);
        let child_prefix = format!("{path}.");
        self.list.entries()[first_candidate..]
            .iter()
            .any(|entry| !entry.negated && entry.pattern.may_match_with_prefix(&child_prefix))
    }

    /// Whether the value at `path` may be returned: the path must be allowed
    /// and each ancestor must be allowed at least as a container.
    pub fn is_allowed_recursive(&self, path: &str) -> bool {
        self.is_allowed_assuming_parents_are_allowed(path)
            && self_and_ancestors(path)
                .skip(1)
                .all(|ancestor| self.is_object_allowed_assuming_parents_are_allowed(ancestor))
    }
}

// ---------------------------------------------------------------------------
// FlsRule
// ---------------------------------------------------------------------------

/// The effective field restriction for one request and target index.
#[derive(Debug)]
pub enum FlsRule {
    /// Every field is visible.
    AllowAll,
    /// Exactly one applicable entry restricts fields.
    SingleRole {
        patterns: Arc<FieldPatterns>,
        memo: BoundedMemo<String, bool>,
    },
    /// Several entries; a field is visible when any of them allows it.
    MultiRole {
        members: Vec<Arc<FieldPatterns>>,
        memo: BoundedMemo<String, bool>,
    },
}

impl FlsRule {
    /// Builds the rule from the FLS patterns of every applicable entry.
    ///
    /// An entry without FLS patterns makes the result `AllowAll`.
    pub fn from_entries<'a, I>(entries: I, memo_capacity: usize) -> Self
    where
        I: IntoIterator<Item = Option<&'a Arc<FieldPatterns>>>,
    {
        let mut members: Vec<Arc<FieldPatterns>> = Vec::new();
        for entry in entries {
            match entry {
                None => return Self::AllowAll,
                Some(patterns) => {
                    if !members.iter().any(|member| member == patterns) {
                        members.push(Arc::clone(patterns));
                    }
                }
            }
        }

        match members.len() {
            0 => Self::AllowAll,
            1 => Self::SingleRole {
                patterns: members.remove(0),
                memo: BoundedMemo::new(memo_capacity),
            },
            _ => Self::MultiRole {
                members,
                memo: BoundedMemo::new(memo_capacity),
            },
        }
    }

    /// Hides every field.
    pub fn deny_all() -> Self {
        Self::SingleRole {
            patterns: Arc::new(FieldPatterns::exclude_all()),
            memo: BoundedMemo::new(1),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::AllowAll)
    }

    pub fn is_allowed_recursive(&self, path: &str) -> bool {
        let path = strip_keyword(path);
        match self {
            Self::AllowAll => true,
            Self::SingleRole { patterns, memo } => {
                memo.get_or_insert_with(path.to_string(), || patterns.is_allowed_recursive(path))
            }
            Self::MultiRole { members, memo } => memo.get_or_insert_with(path.to_string(), || {
                members.iter().any(|member| member.is_allowed_recursive(path))
            }),
        }
    }

    pub fn is_allowed_assuming_parents_are_allowed(&self, path: &str) -> bool {
        let path = strip_keyword(path);
        match self {
            Self::AllowAll => true,
            Self::SingleRole { patterns, .. } => {
                patterns.is_allowed_assuming_parents_are_allowed(path)
            }
            Self::MultiRole { members, .. } => members
                .iter()
                .any(|member| member.is_allowed_assuming_parents_are_allowed(path)),
        }
    }

    pub fn is_object_allowed_assuming_parents_are_allowed(&self, path: &str) -> bool {
        let path = strip_keyword(path);
        match self {
            Self::AllowAll => true,
            Self::SingleRole { patterns, .. } => {
                patterns.is_object_allowed_assuming_parents_are_allowed(path)
            }
            Self::MultiRole { members, .. } => members
                .iter()
                .any(|member| member.is_object_allowed_assuming_parents_are_allowed(path)),
        }
    }

    /// Pattern lists of the members, for diagnostics.
    pub fn pattern_lists(&self) -> Vec<&[String]> {
        match self {
            Self::AllowAll => Vec::new(),
            Self::SingleRole { patterns, .. } => vec![patterns.sources()],
            Self::MultiRole { members, .. } => {
                members.iter().map(|member| member.sources()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn patterns(sources: &[&str]) -> Arc<FieldPatterns> {
        let sources: Vec<String> = sources.iter().map(ToString::to_string).collect();
        Arc::new(FieldPatterns::compile(&sources, &mut PatternCache::new()).unwrap())
    }

    const HIERARCHY: &[&str] = &[
        "object*",
        "~object_top_secret*",
        "~object.child*",
        "object.child.grandchild*",
        "~object.child.grandchild.leaf*",
    ];

    #[test_case("object", true; "object")]
    #[test_case("object_top_secret", false; "top secret sibling")]
    #[test_case("object.child", false; "excluded child")]
    #[test_case("object.child.grandchild", true; "re-included grandchild")]
    #[test_case("object.child.grandchild.leaf", false; "excluded leaf")]
    #[test_case("object.child.grandchild.other", true; "grandchild descendant")]
    #[test_case("object.child.sibling", false; "child descendant")]
    #[test_case("unrelated", true; "mixed list default")]
    fn test_hierarchy_is_allowed_recursive(path: &str, expected: bool) {
        assert_eq!(patterns(HIERARCHY).is_allowed_recursive(path), expected);
    }

    #[test]
    fn test_hierarchy_object_containers() {
        let p = patterns(HIERARCHY);
        assert!(!p.is_allowed_assuming_parents_are_allowed("object.child"));
        assert!(p.is_object_allowed_assuming_parents_are_allowed("object.child"));
        assert!(!p.is_object_allowed_assuming_parents_are_allowed("object_top_secret"));
        assert!(!p.is_object_allowed_assuming_parents_are_allowed(
            "object.child.grandchild.leaf"
        ));
    }

    #[test_case(&["~secret"], "secret", false; "blacklist excludes")]
    #[test_case(&["~secret"], "public", true; "blacklist default allows")]
    #[test_case(&["~secret"], "secret.nested", false; "exclusion covers descendants")]
    #[test_case(&["name", "address.city"], "address", false; "container is not a leaf")]
    #[test_case(&["name", "address.city"], "address.city", true; "nested inclusion")]
    #[test_case(&["name", "address.city"], "address.street", false; "whitelist sibling")]
    #[test_case(&["name"], "name.first", true; "inclusion covers descendants")]
    #[test_case(&["*", "~a*"], "abc", false; "later exclusion wins")]
    #[test_case(&["~a*", "*"], "abc", true; "later inclusion wins")]
    #[test_case(&["a", "~b"], "c", true; "mixed list allows untouched")]
    #[test_case(&["a", "~b"], "b", false; "mixed list exclusion")]
    #[test_case(&["~b", "a"], "c", true; "mixed list starting with exclusion")]
    #[test_case(&["a", "c.d"], "c", false; "inclusions only deny untouched")]
    fn test_single_list(sources: &[&str], path: &str, expected: bool) {
        assert_eq!(patterns(sources).is_allowed_recursive(path), expected);
    }

    #[test]
    fn test_whitelisted_leaf_container_is_object_allowed() {
        let p = patterns(&["name", "address.city"]);
        assert!(p.is_object_allowed_assuming_parents_are_allowed("address"));
        assert!(!p.is_object_allowed_assuming_parents_are_allowed("phone"));
    }

    #[test]
    fn test_keyword_suffix_is_stripped() {
        let rule = FlsRule::from_entries([Some(&patterns(&["~secret"]))], 16);
        assert!(!rule.is_allowed_recursive("secret.keyword"));
        assert!(!rule.is_allowed_assuming_parents_are_allowed("secret.keyword"));
        assert!(rule.is_allowed_recursive("public.keyword"));
        assert!(!rule.is_object_allowed_assuming_parents_are_allowed("secret.keyword"));
        assert!(rule.is_object_allowed_assuming_parents_are_allowed("public.keyword"));
        assert_eq!(strip_keyword(".keyword"), ".keyword");
    }

    #[test]
    fn test_self_and_ancestors() {
        let all: Vec<&str> = self_and_ancestors("a.b.c").collect();
        assert_eq!(all, vec!["a.b.c", "a.b", "a"]);
        assert_eq!(self_and_ancestors("a").collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_from_entries_variants() {
        let a = patterns(&["~a"]);
        let b = patterns(&["~b"]);

        assert!(FlsRule::from_entries(Vec::<Option<&Arc<FieldPatterns>>>::new(), 4).is_unrestricted());
        assert!(FlsRule::from_entries([Some(&a), None], 4).is_unrestricted());
        assert!(matches!(
            FlsRule::from_entries([Some(&a), Some(&a)], 4),
            FlsRule::SingleRole { .. }
        ));
        assert!(matches!(
            FlsRule::from_entries([Some(&a), Some(&b)], 4),
            FlsRule::MultiRole { .. }
        ));
    }

    #[test]
    fn test_multi_role_is_additive() {
        // Role A hides "salary"; role B does not mention it.
        let a = patterns(&["~salary"]);
        let b = patterns(&["~ssn"]);
        let rule = FlsRule::from_entries([Some(&a), Some(&b)], 16);

        assert!(rule.is_allowed_recursive("salary"));
        assert!(rule.is_allowed_recursive("ssn"));
        assert!(rule.is_allowed_recursive("name"));

        let c = patterns(&["~salary", "~ssn"]);
        let rule = FlsRule::from_entries([Some(&a), Some(&c)], 16);
        assert!(!rule.is_allowed_recursive("salary"));
        assert!(rule.is_allowed_recursive("ssn"));
    }

    #[test]
    fn test_memoized_answers_are_stable() {
        let rule = FlsRule::from_entries([Some(&patterns(HIERARCHY))], 2);
        for _ in 0..3 {
            assert!(rule.is_allowed_recursive("object.child.grandchild"));
            assert!(!rule.is_allowed_recursive("object.child"));
            assert!(rule.is_allowed_recursive("object"));
        }
    }

    #[test]
    fn test_deny_all() {
        let rule = FlsRule::deny_all();
        assert!(!rule.is_unrestricted());
        assert!(!rule.is_allowed_recursive("anything"));
        assert!(!rule.is_object_allowed_assuming_parents_are_allowed("anything"));
        assert_eq!(rule.pattern_lists(), vec![&["~*".to_string()][..]]);
    }
}
