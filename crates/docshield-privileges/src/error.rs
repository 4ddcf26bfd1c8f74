//! Error types for configuration building and privilege evaluation.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A defect in the static role configuration.
///
/// Raised while a configuration generation is built; a generation with any
/// configuration error is rejected as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A wildcard pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A `/.../` pattern or mask substitution is not a valid regular expression.
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// A `${...}` placeholder is malformed or unknown.
    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A DLS body is not a valid query.
    #[error("Invalid DLS query: {reason}")]
    InvalidDlsQuery { reason: String },

    /// A masked field expression could not be parsed.
    #[error("Invalid masking expression '{expression}': {reason}")]
    InvalidMaskExpression { expression: String, reason: String },

    /// A mask expression names a digest that is not supported.
    #[error("Unknown digest algorithm '{0}'")]
    UnknownAlgorithm(String),
}

/// Result type for configuration building.
pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// A failure while evaluating privileges for a concrete request.
///
/// Always fatal for the request: callers must deny rather than fall back to
/// unrestricted access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrivilegesEvaluationError {
    /// A template needed for the decision refers to an attribute the user lacks.
    #[error("Role '{role}' requires user attribute '{attribute}' which is not set")]
    MissingAttribute { role: String, attribute: String },

    /// An attribute value cannot be substituted (for example a JSON object
    /// inside an index pattern).
    #[error("Role '{role}' cannot render template: {reason}")]
    TemplateRendering { role: String, reason: String },

    /// A rendered index pattern failed to compile.
    #[error("Role '{role}' rendered invalid pattern '{pattern}': {source}")]
    InvalidRenderedPattern {
        role: String,
        pattern: String,
        #[source]
        source: ConfigurationError,
    },

    /// A rendered DLS body failed to parse.
    #[error("Role '{role}' rendered an invalid DLS query: {source}")]
    QueryRendering {
        role: String,
        #[source]
        source: ConfigurationError,
    },
}

impl PrivilegesEvaluationError {
    /// Role whose configuration caused the failure.
    pub fn role(&self) -> &str {
        match self {
            Self::MissingAttribute { role, .. }
            | Self::TemplateRendering { role, .. }
            | Self::InvalidRenderedPattern { role, .. }
            | Self::QueryRendering { role, .. } => role,
        }
    }
}

/// Result type for privilege evaluation.
pub type EvaluationResult<T> = std::result::Result<T, PrivilegesEvaluationError>;

/// All configuration errors found in one pass, grouped by key (usually the
/// role name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<ConfigurationError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error under `key`.
    pub fn add(&mut self, key: impl Into<String>, error: ConfigurationError) {
        self.errors.entry(key.into()).or_default().push(error);
    }

    /// Moves every error of `other` into `self`.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (key, errors) in other.errors {
            self.errors.entry(key).or_default().extend(errors);
        }
    }

    /// Runs `f`, recording its error under `key`. Returns the value on success.
    pub fn capture<T>(
        &mut self,
        key: &str,
        f: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        match f() {
            Ok(value) => Some(value),
            Err(error) => {
                self.add(key, error);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of errors across all keys.
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Errors recorded for `key`.
    pub fn get(&self, key: &str) -> &[ConfigurationError] {
        self.errors.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ConfigurationError])> {
        self.errors
            .iter()
            .map(|(key, errors)| (key.as_str(), errors.as_slice()))
    }

    /// `Ok(value)` when no errors were recorded.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.len())?;
        for (key, errors) in &self.errors {
            for error in errors {
                write!(f, "\n  {key}: {error}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
