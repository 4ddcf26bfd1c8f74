//! Authz hash: a stable token summarizing the effective restrictions.
//!
//! The hash is computed from a canonical policy text:
//!
//! ```text
//! g=<generation>;u=[<unrestricted patterns>];r=[<restricted entries>];x=[<unknown indices>]
//! ```
//!
//! Unrestricted patterns, restricted entries and unknown indices are sorted
//! and deduplicated. Patterns carry the scope of their entry (`i:` index,
//! `a:` alias, `d:` data stream). A restricted entry renders as
//! `<scope>:<patterns>{dls=<query>;fls=<patterns>;fm=<expressions>}`, its
//! pattern lists kept in declaration order. Two requests get the same hash exactly
//! when their canonical texts are equal, independent of who the user is.

use crate::context::PrivilegesEvaluationContext;
use crate::error::{EvaluationResult, PrivilegesEvaluationError};
use crate::query::QueryParser;
use crate::roles::{PermissionEntry, PermissionScope, Role};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Prefix of hashes that are digests rather than verbatim policy text.
pub const DIGEST_PREFIX: &str = "b3:";

/// Opaque restriction fingerprint of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AuthzHash(String);

impl AuthzHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the canonical text was too long and got digested.
    pub fn is_digest(&self) -> bool {
        self.0.starts_with(DIGEST_PREFIX)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AuthzHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the canonical policy text of one request.
#[derive(Debug)]
pub(crate) struct CanonicalPolicy<'g> {
    generation: &'g str,
    unrestricted: BTreeSet<String>,
    restricted: BTreeSet<String>,
    unknown: BTreeSet<String>,
}

impl<'g> CanonicalPolicy<'g> {
    pub fn new(generation: &'g str) -> Self {
        Self {
            generation,
            unrestricted: BTreeSet::new(),
            restricted: BTreeSet::new(),
            unknown: BTreeSet::new(),
        }
    }

    /// Records a target index missing from the metadata snapshot.
    pub fn add_unknown_index(&mut self, index: &str) {
        self.unknown.insert(index.to_string());
    }

    /// Records an applicable entry.
    ///
    /// Returns `Ok(false)` when the entry's DLS clause needs a user
    /// attribute that is absent; such entries are left out.
    pub fn add_entry(
        &mut self,
        role: &Role,
        entry: &PermissionEntry,
        context: &PrivilegesEvaluationContext,
        parser: &dyn QueryParser,
    ) -> EvaluationResult<bool> {
        let patterns = entry.selector().canonical_patterns(role.name(), context)?;
        let scope = scope_tag(entry.scope());

        if entry.is_unrestricted() {
            self.unrestricted
                .extend(patterns.iter().map(|pattern| format!("{scope}:{pattern}")));
            return Ok(true);
        }

        let dls = match &entry.dls {
            None => String::from("-"),
            Some(clause) => match clause.render(role.name(), context, parser) {
                Ok(query) => query.as_str().to_string(),
                Err(PrivilegesEvaluationError::MissingAttribute { .. }) => return Ok(false),
                Err(error) => return Err(error),
            },
        };
        let fls = entry
            .fls()
            .map(|fls| fls.sources().to_vec())
            .unwrap_or_default();
        let masks: Vec<&str> = entry
            .masks()
            .map(|masks| masks.sources().collect())
            .unwrap_or_default();

        self.restricted.insert(format!(
            "{scope}:{}{{dls={dls};fls={};fm={}}}",
            list(&patterns),
            list(&fls),
            list(&masks),
        ));
        Ok(true)
    }

    pub fn render(&self) -> String {
        format!(
            "g={};u={};r={};x={}",
            self.generation,
            list(&self.unrestricted),
            list(&self.restricted),
            list(&self.unknown),
        )
    }

    /// Canonical text if it fits in `max_verbatim_len` bytes, its digest
    /// otherwise.
    pub fn finish(&self, max_verbatim_len: usize) -> AuthzHash {
        let text = self.render();
        if text.len() <= max_verbatim_len {
            AuthzHash(text)
        } else {
            AuthzHash(format!(
                "{DIGEST_PREFIX}{}",
                blake3::hash(text.as_bytes()).to_hex()
            ))
        }
    }
}

fn scope_tag(scope: PermissionScope) -> &'static str {
    match scope {
        PermissionScope::Index => "i",
        PermissionScope::Alias => "a",
        PermissionScope::DataStream => "d",
    }
}

/// JSON array text; unambiguous for any item content.
fn list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Value::Array(
        items
            .into_iter()
            .map(|item| Value::String(item.as_ref().to_string()))
            .collect(),
    )
    .to_string()
}
