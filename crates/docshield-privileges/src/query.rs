//! Parsed DLS queries.
//!
//! The query DSL itself belongs to the search engine. This module only needs
//! structural equality and a canonical text form, both derived from the JSON
//! body with object keys sorted.

use crate::error::{ConfigurationError, Result};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A parsed query clause.
///
/// Two queries are equal when their bodies are structurally equal, regardless
/// of key order in the source text.
#[derive(Clone)]
pub struct Query {
    canonical: String,
    body: Value,
}

impl Query {
    /// Wraps an already parsed JSON body.
    pub fn from_json(body: Value) -> Self {
        let body = sorted(&body);
        let canonical = body.to_string();
        Self { canonical, body }
    }

    /// A query matching no document.
    pub fn match_none() -> Self {
        Self::from_json(serde_json::json!({ "match_none": {} }))
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Canonical JSON text.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Query {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Query {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.canonical).finish()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// Turns a DLS body into a [`Query`].
pub trait QueryParser: Send + Sync + fmt::Debug {
    fn parse(&self, body: &str) -> Result<Query>;
}

/// Accepts a JSON object holding exactly one query clause, such as
/// `{"term": {"dept": "sales"}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonQueryParser;

impl QueryParser for JsonQueryParser {
    fn parse(&self, body: &str) -> Result<Query> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| ConfigurationError::InvalidDlsQuery {
                reason: e.to_string(),
            })?;

        match &value {
            Value::Object(map) if map.len() == 1 => Ok(Query::from_json(value)),
            Value::Object(map) => Err(ConfigurationError::InvalidDlsQuery {
                reason: format!("expected exactly one query clause, found {}", map.len()),
            }),
            _ => Err(ConfigurationError::InvalidDlsQuery {
                reason: "query must be a JSON object".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn test_structural_equality_ignores_key_order() {
        let parser = JsonQueryParser;
        let a = parser
            .parse(r#"{"bool": {"must": [{"term": {"a": 1}}], "filter": []}}"#)
            .unwrap();
        let b = parser
            .parse(r#"{"bool":{"filter":[],"must":[{"term":{"a":1}}]}}"#)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"bool":{"filter":[],"must":[{"term":{"a":1}}]}}"#);

        let set: BTreeSet<Query> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = Query::from_json(json!({"terms": {"x": [1, 2]}}));
        let b = Query::from_json(json!({"terms": {"x": [2, 1]}}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parser_rejects_non_clauses() {
        let parser = JsonQueryParser;
        assert!(parser.parse("not json").is_err());
        assert!(parser.parse("[1, 2]").is_err());
        assert!(parser.parse("{}").is_err());
        assert!(matches!(
            parser.parse(r#"{"term": {}, "match": {}}"#),
            Err(ConfigurationError::InvalidDlsQuery { .. })
        ));
    }

    #[test]
    fn test_match_none_serializes_as_body() {
        let query = Query::match_none();
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"match_none": {}}));
    }
}
