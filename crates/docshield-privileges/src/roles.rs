//! Role configuration: the serialized document and its compiled form.

use crate::dls::DlsClause;
use crate::error::{ConfigurationError, ValidationErrors};
use crate::fls::FieldPatterns;
use crate::masking::FieldMasks;
use crate::pattern::PatternCache;
use crate::query::QueryParser;
use crate::resolver::IndexSelector;
use docshield_config::MaskingConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Serialized configuration
// ---------------------------------------------------------------------------

/// Role name to role definition, as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolesDocument {
    roles: BTreeMap<String, RoleDefinition>,
}

impl RolesDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, name: impl Into<String>, role: RoleDefinition) -> Self {
        self.roles.insert(name.into(), role);
        self
    }

    pub fn roles(&self) -> &BTreeMap<String, RoleDefinition> {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// One role's grants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoleDefinition {
    pub description: Option<String>,
    pub index_permissions: Vec<PermissionDefinition>,
    pub alias_permissions: Vec<PermissionDefinition>,
    pub data_stream_permissions: Vec<PermissionDefinition>,
}

impl RoleDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_permission(mut self, permission: PermissionDefinition) -> Self {
        self.index_permissions.push(permission);
        self
    }

    pub fn alias_permission(mut self, permission: PermissionDefinition) -> Self {
        self.alias_permissions.push(permission);
        self
    }

    pub fn data_stream_permission(mut self, permission: PermissionDefinition) -> Self {
        self.data_stream_permissions.push(permission);
        self
    }
}

/// A grant scoped to a list of target patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionDefinition {
    /// Target patterns; `-` negates, `${...}` templates allowed.
    #[serde(
        rename = "index_patterns",
        alias = "alias_patterns",
        alias = "data_stream_patterns"
    )]
    pub patterns: Vec<String>,
    /// Query body, either as an object or as (templated) text.
    pub dls: Option<Value>,
    /// Field patterns; `~` negates.
    pub fls: Vec<String>,
    /// `field[::ALGO]` or `field::/re/::repl[::/re/::repl]*`.
    pub masked_fields: Vec<String>,
}

impl PermissionDefinition {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the DLS body from JSON text.
    pub fn dls(mut self, body: impl Into<String>) -> Self {
        self.dls = Some(Value::String(body.into()));
        self
    }

    pub fn fls<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fls = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn masked_fields<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.masked_fields = expressions.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Compiled configuration
// ---------------------------------------------------------------------------

/// What a permission entry's patterns are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionScope {
    /// The index, its aliases and its data streams.
    Index,
    /// Aliases containing the index.
    Alias,
    /// Data streams backed by the index.
    DataStream,
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Index => "index",
            Self::Alias => "alias",
            Self::DataStream => "data_stream",
        })
    }
}

/// A compiled grant.
#[derive(Debug)]
pub struct PermissionEntry {
    pub(crate) scope: PermissionScope,
    pub(crate) selector: IndexSelector,
    pub(crate) dls: Option<DlsClause>,
    pub(crate) fls: Option<Arc<FieldPatterns>>,
    pub(crate) masks: Option<Arc<FieldMasks>>,
}

impl PermissionEntry {
    pub fn scope(&self) -> PermissionScope {
        self.scope
    }

    pub fn selector(&self) -> &IndexSelector {
        &self.selector
    }

    pub fn fls(&self) -> Option<&FieldPatterns> {
        self.fls.as_deref()
    }

    pub fn masks(&self) -> Option<&FieldMasks> {
        self.masks.as_deref()
    }

    pub fn has_dls(&self) -> bool {
        self.dls.is_some()
    }

    /// No DLS, FLS or masking on this entry.
    pub fn is_unrestricted(&self) -> bool {
        self.dls.is_none() && self.fls.is_none() && self.masks.is_none()
    }
}

/// A compiled role.
#[derive(Debug)]
pub struct Role {
    name: String,
    entries: Vec<PermissionEntry>,
}

impl Role {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    pub(crate) fn uses_templates(&self) -> bool {
        self.entries.iter().any(|entry| {
            entry.selector.uses_templates() || entry.dls.as_ref().is_some_and(DlsClause::is_templated)
        })
    }
}

/// Shared state while compiling one generation.
pub(crate) struct Compiler<'a> {
    pub patterns: PatternCache,
    pub parser: &'a dyn QueryParser,
    pub masking: &'a MaskingConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(parser: &'a dyn QueryParser, masking: &'a MaskingConfig) -> Self {
        Self {
            patterns: PatternCache::new(),
            parser,
            masking,
        }
    }

    /// Compiles a role, recording every defect under the role name.
    ///
    /// Defective entries are left out of the returned role.
    pub fn compile_role(
        &mut self,
        name: &str,
        definition: &RoleDefinition,
        errors: &mut ValidationErrors,
    ) -> Role {
        let scoped = [
            (PermissionScope::Index, &definition.index_permissions),
            (PermissionScope::Alias, &definition.alias_permissions),
            (PermissionScope::DataStream, &definition.data_stream_permissions),
        ];

        let mut entries = Vec::new();
        for (scope, permissions) in scoped {
            for permission in permissions {
                let mut entry_errors = ValidationErrors::new();
                if let Some(entry) = self.compile_entry(scope, permission, name, &mut entry_errors)
                {
                    if entry_errors.is_empty() {
                        entries.push(entry);
                    }
                }
                errors.merge(entry_errors);
            }
        }

        Role {
            name: name.to_string(),
            entries,
        }
    }

    fn compile_entry(
        &mut self,
        scope: PermissionScope,
        permission: &PermissionDefinition,
        role: &str,
        errors: &mut ValidationErrors,
    ) -> Option<PermissionEntry> {
        if permission.patterns.is_empty() {
            errors.add(
                role,
                ConfigurationError::InvalidPattern {
                    pattern: String::new(),
                    reason: format!("{scope} permission without patterns"),
                },
            );
            return None;
        }

        let selector =
            errors.capture(role, || IndexSelector::compile(&permission.patterns, &mut self.patterns));

        let dls = match &permission.dls {
            Some(body) => errors
                .capture(role, || DlsClause::compile(body, self.parser))
                .map(Some),
            None => Some(None),
        };

        let fls = if permission.fls.is_empty() {
            Some(None)
        } else {
            errors
                .capture(role, || FieldPatterns::compile(&permission.fls, &mut self.patterns))
                .map(|patterns| Some(Arc::new(patterns)))
        };

        let masks = if permission.masked_fields.is_empty() {
            Some(None)
        } else {
            errors
                .capture(role, || {
                    FieldMasks::compile(&permission.masked_fields, &mut self.patterns, self.masking)
                })
                .map(|masks| Some(Arc::new(masks)))
        };

        Some(PermissionEntry {
            scope,
            selector: selector?,
            dls: dls?,
            fls: fls?,
            masks: masks?,
        })
    }
}
