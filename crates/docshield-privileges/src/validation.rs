//! Write-time validation of role documents.
//!
//! Compiling catches static defects. Templated patterns and DLS bodies are
//! only parsed once rendered, so validation also renders them for a sample
//! user and reports what would fail at request time.

use crate::context::{PrivilegesEvaluationContext, User};
use crate::dls::DlsClause;
use crate::error::{ConfigurationError, PrivilegesEvaluationError, ValidationErrors};
use crate::generation::Generation;
use crate::pattern::Pattern;
use crate::query::{JsonQueryParser, QueryParser};
use crate::roles::{PermissionEntry, Role, RolesDocument};
use crate::template::{Placeholder, Template};
use docshield_config::DocshieldConfig;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

const SAMPLE: &str = "sample";

/// Checks `document` with the JSON query parser.
pub fn validate_roles(
    document: &RolesDocument,
    config: &DocshieldConfig,
) -> Result<(), ValidationErrors> {
    validate_roles_with_parser(document, config, Arc::new(JsonQueryParser))
}

/// Checks `document`, reporting every error found, keyed by role.
pub fn validate_roles_with_parser(
    document: &RolesDocument,
    config: &DocshieldConfig,
    parser: Arc<dyn QueryParser>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let generation = Generation::compile(document, config, parser, &mut errors);

    for name in generation.role_names() {
        if let Some(role) = generation.role(name) {
            for entry in role.entries() {
                simulate_selector(role, entry, &mut errors);
                if let Some(clause) = &entry.dls {
                    simulate_dls(role, clause, generation.parser(), &mut errors);
                }
            }
        }
    }

    debug!(roles = document.len(), errors = errors.len(), "Validated role document");
    errors.into_result(())
}

/// A context giving every attribute used by `templates` the value `value`.
fn sample_context<'t>(
    templates: impl IntoIterator<Item = &'t Template>,
    value: &Value,
) -> PrivilegesEvaluationContext {
    let user = templates
        .into_iter()
        .flat_map(Template::placeholders)
        .fold(User::new(SAMPLE), |user, placeholder| match placeholder {
            Placeholder::Attribute(name) => user.with_attribute(name.clone(), value.clone()),
            Placeholder::UserName | Placeholder::UserRoles => user,
        });
    PrivilegesEvaluationContext::new(user, [SAMPLE])
}

fn simulate_selector(role: &Role, entry: &PermissionEntry, errors: &mut ValidationErrors) {
    let selector = entry.selector();
    if !selector.uses_templates() {
        return;
    }

    let context = sample_context(selector.templates(), &json!(SAMPLE));
    match selector.render(role.name(), &context) {
        Ok(rendered) => {
            for pattern in rendered {
                let body = pattern.strip_prefix('-').unwrap_or(&pattern);
                if let Err(error) = Pattern::parse(body) {
                    errors.add(role.name(), error);
                }
            }
        }
        Err(error) => errors.add(role.name(), configuration_error(error)),
    }
}

fn simulate_dls(
    role: &Role,
    clause: &DlsClause,
    parser: &dyn QueryParser,
    errors: &mut ValidationErrors,
) {
    let Some(template) = clause.template() else {
        return;
    };

    // A placeholder may stand for a string, a list or a number.
    let samples = [json!(SAMPLE), json!([SAMPLE]), json!(1)];
    let mut first_error = None;
    for sample in &samples {
        let context = sample_context([template], sample);
        match clause.render(role.name(), &context, parser) {
            Ok(_) => return,
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }
    }

    if let Some(error) = first_error {
        errors.add(
            role.name(),
            ConfigurationError::InvalidDlsQuery {
                reason: format!("{template}: {}", configuration_error(error)),
            },
        );
    }
}

fn configuration_error(error: PrivilegesEvaluationError) -> ConfigurationError {
    match error {
        PrivilegesEvaluationError::InvalidRenderedPattern { source, .. }
        | PrivilegesEvaluationError::QueryRendering { source, .. } => source,
        PrivilegesEvaluationError::MissingAttribute { attribute, .. } => {
            ConfigurationError::InvalidTemplate {
                template: attribute,
                reason: "attribute not available".to_string(),
            }
        }
        PrivilegesEvaluationError::TemplateRendering { reason, .. } => {
            ConfigurationError::InvalidTemplate {
                template: String::new(),
                reason,
            }
        }
    }
}
