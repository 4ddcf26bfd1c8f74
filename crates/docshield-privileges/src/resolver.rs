//! Deciding which permission entries apply to a target index.
//!
//! An index-scoped entry is matched against the index name, every alias
//! containing it and every data stream it backs. Alias- and data-stream-scoped
//! entries are matched against the aliases or data streams only, so they apply
//! to all current members.

use crate::context::PrivilegesEvaluationContext;
use crate::error::{EvaluationResult, PrivilegesEvaluationError, Result};
use crate::meta::MetaGraph;
use crate::pattern::{Pattern, PatternCache};
use crate::roles::{PermissionEntry, PermissionScope, Role};
use crate::template::{Template, TemplateError};
use std::sync::Arc;

#[derive(Debug)]
enum Term {
    Static(Arc<Pattern>),
    Templated {
        template: Template,
        /// `None` for regular expressions, which cannot be pre-screened.
        skeleton: Option<Pattern>,
    },
}

#[derive(Debug)]
struct SelectorTerm {
    negated: bool,
    term: Term,
}

/// Ordered, possibly negated, possibly templated target patterns of one entry.
#[derive(Debug)]
pub struct IndexSelector {
    sources: Vec<String>,
    terms: Vec<SelectorTerm>,
}

impl IndexSelector {
    pub(crate) fn compile(sources: &[String], cache: &mut PatternCache) -> Result<Self> {
        let terms = sources
            .iter()
            .map(|source| -> Result<SelectorTerm> {
                let (negated, body) = match source.strip_prefix('-') {
                    Some(body) => (true, body),
                    None => (false, source.as_str()),
                };
                let template = Template::parse(body)?;
                let term = if template.is_constant() {
                    Term::Static(cache.compile(body)?)
                } else {
                    let skeleton = if body.starts_with('/') {
                        None
                    } else {
                        Pattern::parse(&template.wildcard_skeleton()).ok()
                    };
                    Term::Templated { template, skeleton }
                };
                Ok(SelectorTerm { negated, term })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sources: sources.to_vec(),
            terms,
        })
    }

    /// Pattern text as configured.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn uses_templates(&self) -> bool {
        self.terms
            .iter()
            .any(|term| matches!(term.term, Term::Templated { .. }))
    }

    /// Templates used by this selector.
    pub(crate) fn templates(&self) -> impl Iterator<Item = &Template> {
        self.terms.iter().filter_map(|term| match &term.term {
            Term::Templated { template, .. } => Some(template),
            Term::Static(_) => None,
        })
    }

    /// Whether the selector picks any of `candidates`.
    ///
    /// Terms are scanned from last to first and the first term touching a
    /// candidate decides. Templates of terms declared before the deciding
    /// term are never rendered, and a templated term whose wildcard skeleton
    /// cannot match is skipped without rendering.
    pub fn selects(
        &self,
        role: &str,
        context: &PrivilegesEvaluationContext,
        candidates: &[&str],
    ) -> EvaluationResult<bool> {
        for term in self.terms.iter().rev() {
            let touched = match &term.term {
                Term::Static(pattern) => candidates.iter().any(|c| pattern.matches(c)),
                Term::Templated { template, skeleton } => {
                    if skeleton
                        .as_ref()
                        .is_some_and(|skeleton| !candidates.iter().any(|c| skeleton.matches(c)))
                    {
                        continue;
                    }
                    let mut touched = false;
                    for rendered in render(template, role, context)? {
                        let pattern = compile_rendered(&rendered, role)?;
                        if candidates.iter().any(|c| pattern.matches(c)) {
                            touched = true;
                            break;
                        }
                    }
                    touched
                }
            };
            if touched {
                return Ok(!term.negated);
            }
        }
        Ok(false)
    }

    /// Pattern text after template expansion, negations kept.
    pub fn render(
        &self,
        role: &str,
        context: &PrivilegesEvaluationContext,
    ) -> EvaluationResult<Vec<String>> {
        let mut rendered = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let sign = if term.negated { "-" } else { "" };
            match &term.term {
                Term::Static(pattern) => rendered.push(format!("{sign}{pattern}")),
                Term::Templated { template, .. } => {
                    for alternative in render(template, role, context)? {
                        rendered.push(format!("{sign}{alternative}"));
                    }
                }
            }
        }
        Ok(rendered)
    }

    /// Like [`render`](Self::render), but a term whose template lacks a user
    /// attribute keeps its template text instead of failing.
    pub(crate) fn canonical_patterns(
        &self,
        role: &str,
        context: &PrivilegesEvaluationContext,
    ) -> EvaluationResult<Vec<String>> {
        let mut rendered = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            let sign = if term.negated { "-" } else { "" };
            match &term.term {
                Term::Static(pattern) => rendered.push(format!("{sign}{pattern}")),
                Term::Templated { template, .. } => match template.render_alternatives(context) {
                    Ok(alternatives) => {
                        rendered.extend(alternatives.into_iter().map(|a| format!("{sign}{a}")));
                    }
                    Err(TemplateError::MissingAttribute(_)) => {
                        rendered.push(format!("{sign}{template}"));
                    }
                    Err(error) => return Err(template_error(error, role)),
                },
            }
        }
        Ok(rendered)
    }
}

fn render(
    template: &Template,
    role: &str,
    context: &PrivilegesEvaluationContext,
) -> EvaluationResult<Vec<String>> {
    template
        .render_alternatives(context)
        .map_err(|error| template_error(error, role))
}

fn compile_rendered(rendered: &str, role: &str) -> EvaluationResult<Pattern> {
    Pattern::parse(rendered).map_err(|source| PrivilegesEvaluationError::InvalidRenderedPattern {
        role: role.to_string(),
        pattern: rendered.to_string(),
        source,
    })
}

pub(crate) fn template_error(error: TemplateError, role: &str) -> PrivilegesEvaluationError {
    match error {
        TemplateError::MissingAttribute(attribute) => PrivilegesEvaluationError::MissingAttribute {
            role: role.to_string(),
            attribute,
        },
        TemplateError::Unrenderable {
            placeholder,
            reason,
        } => PrivilegesEvaluationError::TemplateRendering {
            role: role.to_string(),
            reason: format!("{placeholder}: {reason}"),
        },
    }
}

/// Names an entry of the given scope is matched against for `index`.
pub fn candidates<'m>(scope: PermissionScope, meta: &'m MetaGraph, index: &'m str) -> Vec<&'m str> {
    let aliases = meta.aliases_of(index).iter().map(String::as_str);
    let data_streams = meta.data_streams_of(index).iter().map(String::as_str);

    match scope {
        PermissionScope::Index => std::iter::once(index)
            .chain(aliases)
            .chain(data_streams)
            .collect(),
        PermissionScope::Alias => aliases.collect(),
        PermissionScope::DataStream => data_streams.collect(),
    }
}

/// Entries of `role` that apply to `index`, in declaration order.
pub fn applicable_permission_entries<'r>(
    context: &PrivilegesEvaluationContext,
    role: &'r Role,
    meta: &MetaGraph,
    index: &str,
) -> EvaluationResult<Vec<&'r PermissionEntry>> {
    let mut applicable = Vec::new();
    for entry in role.entries() {
        let names = candidates(entry.scope(), meta, index);
        if names.is_empty() {
            continue;
        }
        if entry.selector().selects(role.name(), context, &names)? {
            applicable.push(entry);
        }
    }
    Ok(applicable)
}
