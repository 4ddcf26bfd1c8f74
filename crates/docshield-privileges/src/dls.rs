//! Document-level security.
//!
//! Roles grant additively: a single applicable entry without a DLS clause
//! lifts every document restriction, otherwise the caller sees the union of
//! the documents matched by each clause.

use crate::context::PrivilegesEvaluationContext;
use crate::error::{ConfigurationError, EvaluationResult, PrivilegesEvaluationError, Result};
use crate::query::{Query, QueryParser};
use crate::resolver::template_error;
use crate::roles::{PermissionEntry, Role};
use crate::template::Template;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The document filter a request must be combined with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlsRestriction {
    Unrestricted,
    /// Documents matching any of the queries are visible. Never empty.
    Restricted(BTreeSet<Query>),
}

impl DlsRestriction {
    /// `Restricted` for a non-empty set, `Unrestricted` otherwise.
    pub fn from_queries(queries: impl IntoIterator<Item = Query>) -> Self {
        let queries: BTreeSet<Query> = queries.into_iter().collect();
        if queries.is_empty() {
            Self::Unrestricted
        } else {
            Self::Restricted(queries)
        }
    }

    /// Matches no document at all.
    pub fn full() -> Self {
        Self::Restricted(BTreeSet::from([Query::match_none()]))
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        match self {
            Self::Unrestricted => None,
            Self::Restricted(queries) => Some(queries.iter()),
        }
        .into_iter()
        .flatten()
    }

    /// Read-only diagnostic form.
    pub fn view(&self) -> DlsRestrictionView {
        DlsRestrictionView {
            is_unrestricted: self.is_unrestricted(),
            queries: self.queries().map(|q| q.body().clone()).collect(),
        }
    }
}

/// Diagnostic rendering of a [`DlsRestriction`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlsRestrictionView {
    pub is_unrestricted: bool,
    pub queries: Vec<Value>,
}

/// Per-index DLS restrictions of a multi-index request.
///
/// Only restricted indices are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DlsRestrictionMap {
    restricted: BTreeMap<String, Arc<DlsRestriction>>,
}

impl DlsRestrictionMap {
    pub(crate) fn insert(&mut self, index: &str, restriction: Arc<DlsRestriction>) {
        if !restriction.is_unrestricted() {
            self.restricted.insert(index.to_string(), restriction);
        }
    }

    /// True when no index carries a restriction.
    pub fn is_unrestricted(&self) -> bool {
        self.restricted.is_empty()
    }

    /// Restriction for `index`; `None` means unrestricted.
    pub fn get(&self, index: &str) -> Option<&DlsRestriction> {
        self.restricted.get(index).map(|restriction| &**restriction)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DlsRestriction)> {
        self.restricted
            .iter()
            .map(|(index, restriction)| (index.as_str(), &**restriction))
    }
}

/// The DLS clause of a permission entry.
#[derive(Debug)]
pub(crate) enum DlsClause {
    /// Parsed when the generation was built.
    Static(Query),
    /// Rendered and parsed per request.
    Templated(Template),
}

impl DlsClause {
    pub(crate) fn compile(body: &Value, parser: &dyn QueryParser) -> Result<Self> {
        let text = match body {
            Value::String(text) => text.clone(),
            Value::Object(_) => body.to_string(),
            _ => {
                return Err(ConfigurationError::InvalidDlsQuery {
                    reason: "DLS must be a query object or query text".to_string(),
                });
            }
        };

        let template = Template::parse(&text)?;
        if template.is_constant() {
            Ok(Self::Static(parser.parse(&text)?))
        } else {
            Ok(Self::Templated(template))
        }
    }

    pub(crate) fn is_templated(&self) -> bool {
        matches!(self, Self::Templated(_))
    }

    pub(crate) fn template(&self) -> Option<&Template> {
        match self {
            Self::Static(_) => None,
            Self::Templated(template) => Some(template),
        }
    }

    /// The query for this request.
    pub(crate) fn render(
        &self,
        role: &str,
        context: &PrivilegesEvaluationContext,
        parser: &dyn QueryParser,
    ) -> EvaluationResult<Query> {
        match self {
            Self::Static(query) => Ok(query.clone()),
            Self::Templated(template) => {
                let text = template
                    .render_json(context)
                    .map_err(|error| template_error(error, role))?;
                parser
                    .parse(&text)
                    .map_err(|source| PrivilegesEvaluationError::QueryRendering {
                        role: role.to_string(),
                        source,
                    })
            }
        }
    }
}

/// Combines the DLS clauses of all applicable entries.
pub(crate) fn combine(
    context: &PrivilegesEvaluationContext,
    applicable: &[(&Role, &PermissionEntry)],
    parser: &dyn QueryParser,
) -> EvaluationResult<DlsRestriction> {
    let mut queries = BTreeSet::new();
    for (role, entry) in applicable {
        match &entry.dls {
            None => return Ok(DlsRestriction::Unrestricted),
            Some(clause) => {
                queries.insert(clause.render(role.name(), context, parser)?);
            }
        }
    }
    Ok(DlsRestriction::from_queries(queries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::User;
    use crate::query::JsonQueryParser;
    use serde_json::json;

    fn ctx() -> PrivilegesEvaluationContext {
        PrivilegesEvaluationContext::new(
            User::new("jane").with_attribute("dept", json!("sales")),
            ["r"],
        )
    }

    #[test]
    fn test_from_queries() {
        assert!(DlsRestriction::from_queries([]).is_unrestricted());

        let q = Query::from_json(json!({"term": {"a": 1}}));
        let restriction = DlsRestriction::from_queries([q.clone(), q]);
        assert_eq!(restriction.queries().count(), 1);
        assert!(!restriction.is_unrestricted());
    }

    #[test]
    fn test_full_restriction_matches_nothing() {
        let full = DlsRestriction::full();
        assert_eq!(full.queries().next(), Some(&Query::match_none()));
    }

    #[test]
    fn test_view() {
        assert_eq!(
            serde_json::to_value(DlsRestriction::Unrestricted.view()).unwrap(),
            json!({"isUnrestricted": true, "queries": []})
        );

        let restriction = DlsRestriction::from_queries([Query::from_json(json!({"term": {"a": 1}}))]);
        assert_eq!(
            serde_json::to_value(restriction.view()).unwrap(),
            json!({"isUnrestricted": false, "queries": [{"term": {"a": 1}}]})
        );
    }

    #[test]
    fn test_restriction_map() {
        let mut map = DlsRestrictionMap::default();
        map.insert("a", Arc::new(DlsRestriction::Unrestricted));
        assert!(map.is_unrestricted());

        map.insert("b", Arc::new(DlsRestriction::full()));
        assert!(!map.is_unrestricted());
        assert!(map.get("a").is_none());
        assert!(map.get("b").is_some());
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn test_clause_compile() {
        let parser = JsonQueryParser;
        let clause = DlsClause::compile(&json!({"term": {"a": 1}}), &parser).unwrap();
        assert!(!clause.is_templated());

        let clause =
            DlsClause::compile(&json!(r#"{"term": {"dept": "${user.attrs.dept}"}}"#), &parser)
                .unwrap();
        assert!(clause.is_templated());

        assert!(DlsClause::compile(&json!(42), &parser).is_err());
        assert!(DlsClause::compile(&json!("{broken"), &parser).is_err());
    }

    #[test]
    fn test_clause_render() {
        let parser = JsonQueryParser;
        let clause =
            DlsClause::compile(&json!(r#"{"term": {"dept": "${user.attrs.dept}"}}"#), &parser)
                .unwrap();
        let query = clause.render("r", &ctx(), &parser).unwrap();
        assert_eq!(query, Query::from_json(json!({"term": {"dept": "sales"}})));

        let clause =
            DlsClause::compile(&json!(r#"{"term": {"x": "${user.attrs.absent}"}}"#), &parser)
                .unwrap();
        assert!(matches!(
            clause.render("r", &ctx(), &parser),
            Err(PrivilegesEvaluationError::MissingAttribute { .. })
        ));

        let clause = DlsClause::compile(&json!(r#"{"terms": ${user.name}}"#), &parser).unwrap();
        assert!(matches!(
            clause.render("r", &ctx(), &parser),
            Err(PrivilegesEvaluationError::QueryRendering { .. })
        ));
    }
}
