//! `${...}` placeholders in index patterns and DLS bodies.
//!
//! Supported placeholders:
//! - `${user.name}`: the user name
//! - `${user.roles}`: the active role names, as a list
//! - `${user.attrs.NAME}`: the user attribute `NAME`
//!
//! Rendering is lazy: a template is only rendered when its value is needed for
//! a decision, so a missing attribute only fails requests that depend on it.

use crate::context::PrivilegesEvaluationContext;
use crate::error::{ConfigurationError, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

const ATTRIBUTE_PREFIX: &str = "user.attrs.";

/// A value source inside a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    UserName,
    UserRoles,
    Attribute(String),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserName => f.write_str("${user.name}"),
            Self::UserRoles => f.write_str("${user.roles}"),
            Self::Attribute(name) => write!(f, "${{{ATTRIBUTE_PREFIX}{name}}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Placeholder(Placeholder),
}

/// Why a template could not be rendered for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    MissingAttribute(String),
    Unrenderable { placeholder: String, reason: String },
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parses `source`, validating every placeholder.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigurationError::InvalidTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| invalid("unterminated placeholder"))?;
            let name = after[..end].trim();

            let placeholder = match name {
                "user.name" => Placeholder::UserName,
                "user.roles" => Placeholder::UserRoles,
                _ => match name.strip_prefix(ATTRIBUTE_PREFIX) {
                    Some(attribute) if !attribute.is_empty() => {
                        Placeholder::Attribute(attribute.to_string())
                    }
                    _ => return Err(invalid(&format!("unknown placeholder '{name}'"))),
                },
            };
            parts.push(Part::Placeholder(placeholder));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template contains no placeholder.
    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|part| matches!(part, Part::Literal(_)))
    }

    /// Placeholders used by this template.
    pub fn placeholders(&self) -> BTreeSet<&Placeholder> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Placeholder(p) => Some(p),
                Part::Literal(_) => None,
            })
            .collect()
    }

    /// The template with every placeholder replaced by `*`.
    ///
    /// Every rendering of the template, read as a wildcard pattern, matches a
    /// subset of what the skeleton matches.
    pub fn wildcard_skeleton(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(text) => text.as_str(),
                Part::Placeholder(_) => "*",
            })
            .collect()
    }

    /// Renders into plain strings.
    ///
    /// A list-valued placeholder yields one alternative per element; several
    /// list-valued placeholders yield every combination.
    pub fn render_alternatives(
        &self,
        context: &PrivilegesEvaluationContext,
    ) -> std::result::Result<Vec<String>, TemplateError> {
        let mut alternatives = vec![String::new()];

        for part in &self.parts {
            let choices = match part {
                Part::Literal(text) => vec![text.clone()],
                Part::Placeholder(placeholder) => {
                    plain_values(placeholder, &resolve(placeholder, context)?)?
                }
            };

            alternatives = alternatives
                .iter()
                .flat_map(|prefix| choices.iter().map(move |choice| format!("{prefix}{choice}")))
                .collect();
        }

        Ok(alternatives)
    }

    /// Renders into JSON text.
    ///
    /// String values are inserted JSON-escaped without quotes, so they belong
    /// inside a string literal of the template; other values are inserted as
    /// JSON.
    pub fn render_json(
        &self,
        context: &PrivilegesEvaluationContext,
    ) -> std::result::Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(placeholder) => {
                    match resolve(placeholder, context)? {
                        Value::String(text) => {
                            let quoted = Value::String(text).to_string();
                            out.push_str(&quoted[1..quoted.len() - 1]);
                        }
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn resolve(
    placeholder: &Placeholder,
    context: &PrivilegesEvaluationContext,
) -> std::result::Result<Value, TemplateError> {
    match placeholder {
        Placeholder::UserName => Ok(Value::String(context.user().name().to_string())),
        Placeholder::UserRoles => Ok(Value::Array(
            context
                .roles()
                .iter()
                .map(|role| Value::String(role.clone()))
                .collect(),
        )),
        Placeholder::Attribute(name) => context
            .user()
            .attribute(name)
            .cloned()
            .ok_or_else(|| TemplateError::MissingAttribute(name.clone())),
    }
}

fn plain_values(
    placeholder: &Placeholder,
    value: &Value,
) -> std::result::Result<Vec<String>, TemplateError> {
    let unrenderable = |reason: &str| TemplateError::Unrenderable {
        placeholder: placeholder.to_string(),
        reason: reason.to_string(),
    };

    match value {
        Value::String(text) => Ok(vec![text.clone()]),
        Value::Number(number) => Ok(vec![number.to_string()]),
        Value::Bool(flag) => Ok(vec![flag.to_string()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                Value::Bool(flag) => Ok(flag.to_string()),
                _ => Err(unrenderable("list elements must be scalars")),
            })
            .collect(),
        Value::Null => Err(unrenderable("value is null")),
        Value::Object(_) => Err(unrenderable("objects cannot be rendered into a name")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::User;
    use serde_json::json;

    fn context() -> PrivilegesEvaluationContext {
        let user = User::new("jane")
            .with_attribute("dept", json!("sales"))
            .with_attribute("regions", json!(["eu", "us"]))
            .with_attribute("level", json!(3))
            .with_attribute("quote", json!("a\"b"))
            .with_attribute("nested", json!({"a": 1}));
        PrivilegesEvaluationContext::new(user, ["reader", "writer"])
    }

    #[test]
    fn test_parse_constant() {
        let template = Template::parse("logs-*").unwrap();
        assert!(template.is_constant());
        assert!(template.placeholders().is_empty());
        assert_eq!(template.render_alternatives(&context()).unwrap(), vec!["logs-*"]);
    }

    #[test]
    fn test_parse_placeholders() {
        let template = Template::parse("idx_${user.attrs.dept}_${user.name}").unwrap();
        assert!(!template.is_constant());
        let placeholders: Vec<_> = template.placeholders().into_iter().cloned().collect();
        assert_eq!(
            placeholders,
            vec![Placeholder::UserName, Placeholder::Attribute("dept".into())]
        );
        assert_eq!(template.wildcard_skeleton(), "idx_*_*");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Template::parse("idx_${user.attrs.dept"),
            Err(ConfigurationError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            Template::parse("idx_${user.email}"),
            Err(ConfigurationError::InvalidTemplate { .. })
        ));
        assert!(Template::parse("idx_${user.attrs.}").is_err());
    }

    #[test]
    fn test_render_alternatives() {
        let ctx = context();
        let rendered = Template::parse("idx_${user.attrs.dept}_${user.attrs.level}")
            .unwrap()
            .render_alternatives(&ctx)
            .unwrap();
        assert_eq!(rendered, vec!["idx_sales_3"]);

        let rendered = Template::parse("logs-${user.attrs.regions}-${user.name}")
            .unwrap()
            .render_alternatives(&ctx)
            .unwrap();
        assert_eq!(rendered, vec!["logs-eu-jane", "logs-us-jane"]);

        let rendered = Template::parse("role_${user.roles}")
            .unwrap()
            .render_alternatives(&ctx)
            .unwrap();
        assert_eq!(rendered, vec!["role_reader", "role_writer"]);
    }

    #[test]
    fn test_render_missing_and_unrenderable() {
        let ctx = context();
        assert_eq!(
            Template::parse("idx_${user.attrs.absent}")
                .unwrap()
                .render_alternatives(&ctx),
            Err(TemplateError::MissingAttribute("absent".into()))
        );
        assert!(matches!(
            Template::parse("idx_${user.attrs.nested}")
                .unwrap()
                .render_alternatives(&ctx),
            Err(TemplateError::Unrenderable { .. })
        ));
    }

    #[test]
    fn test_render_json() {
        let ctx = context();
        let rendered = Template::parse(
            r#"{"bool":{"must":[{"term":{"dept":"${user.attrs.dept}"}},{"terms":{"region":${user.attrs.regions}}},{"term":{"q":"${user.attrs.quote}"}}]}}"#,
        )
        .unwrap()
        .render_json(&ctx)
        .unwrap();

        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            value,
            json!({"bool": {"must": [
                {"term": {"dept": "sales"}},
                {"terms": {"region": ["eu", "us"]}},
                {"term": {"q": "a\"b"}}
            ]}})
        );
    }
}
