//! Per-request evaluation input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The authenticated user as seen by privilege evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a user attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}

/// Everything privilege evaluation needs to know about the caller.
///
/// Created once per request and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegesEvaluationContext {
    user: User,
    roles: BTreeSet<String>,
    transitive: bool,
}

impl PrivilegesEvaluationContext {
    /// Creates a context for `user` holding the already mapped `roles`.
    pub fn new<I, S>(user: User, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user,
            roles: roles.into_iter().map(Into::into).collect(),
            transitive: false,
        }
    }

    /// Marks the role set as already expanded with implied roles.
    pub fn with_transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Active role names, sorted.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn is_transitive(&self) -> bool {
        self.transitive
    }

    /// Stable text identifying the user values templates may read.
    pub(crate) fn template_fingerprint(&self) -> String {
        let attributes = serde_json::to_string(&self.user.attributes).unwrap_or_default();
        format!("{}\u{0}{attributes}", self.user.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roles_are_sorted_and_deduplicated() {
        let ctx = PrivilegesEvaluationContext::new(User::new("u"), ["b", "a", "b"]);
        let roles: Vec<&str> = ctx.roles().iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["a", "b"]);
        assert!(!ctx.is_transitive());
        assert!(ctx.with_transitive(true).is_transitive());
    }

    #[test]
    fn test_user_attributes() {
        let user = User::new("jane").with_attribute("dept", json!("sales"));
        assert_eq!(user.name(), "jane");
        assert_eq!(user.attribute("dept"), Some(&json!("sales")));
        assert_eq!(user.attribute("other"), None);
    }

    #[test]
    fn test_user_deserializes_without_attributes() {
        let user: User = serde_json::from_str(r#"{"name": "bob"}"#).unwrap();
        assert_eq!(user, User::new("bob"));
    }

    #[test]
    fn test_template_fingerprint_tracks_attributes() {
        let a = PrivilegesEvaluationContext::new(
            User::new("u").with_attribute("x", json!(1)),
            ["r"],
        );
        let b = PrivilegesEvaluationContext::new(
            User::new("u").with_attribute("x", json!(2)),
            ["r"],
        );
        assert_ne!(a.template_fingerprint(), b.template_fingerprint());
    }
}
