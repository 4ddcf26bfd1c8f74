//! Field masking.
//!
//! A masked field stays visible but its value is replaced. Each masked field
//! expression has one of the forms:
//!
//! | Expression                       | Masked value                                  |
//! |----------------------------------|-----------------------------------------------|
//! | `ssn`                            | default digest (SHA-256 unless configured), hex |
//! | `ssn::SHA-512`                   | SHA-512 digest, hex                           |
//! | `phone::/\d{3}$/::XXX`           | regex substitutions applied in order          |
//!
//! A configured prefix is prepended to every masked value.
//!
//! ## Examples
//!
//! ```
//! use docshield_config::MaskingConfig;
//! use docshield_privileges::masking::MaskingExpression;
//! use docshield_privileges::pattern::PatternCache;
//!
//! let expression = MaskingExpression::parse(
//!     "phone::/[0-9]{4}$/::XXXX",
//!     &mut PatternCache::new(),
//!     &MaskingConfig::default(),
//! )?;
//! assert_eq!(expression.function().apply_str("555-1234"), "555-XXXX");
//! # Ok::<(), docshield_privileges::ConfigurationError>(())
//! ```

use crate::error::{ConfigurationError, Result};
use crate::fls::{FieldPatterns, self_and_ancestors, strip_keyword};
use crate::pattern::{Pattern, PatternCache};
use docshield_config::{DigestAlgorithm, MaskingConfig};
use regex::Regex;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;

const SEPARATOR: &str = "::";

// ---------------------------------------------------------------------------
// MaskingFunction
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum MaskKind {
    Digest {
        algorithm: DigestAlgorithm,
        /// Only the default digest is salted.
        salted: bool,
    },
    Substitute(Vec<(Regex, String)>),
}

/// Turns a field value into its masked form. Pure and deterministic.
#[derive(Clone)]
pub struct MaskingFunction {
    /// Expression text after the field pattern; empty for the default digest.
    spec: String,
    kind: MaskKind,
    prefix: Option<String>,
    salt: Option<Vec<u8>>,
}

impl MaskingFunction {
    /// The default digest as configured.
    pub fn default_digest(config: &MaskingConfig) -> Self {
        Self {
            spec: String::new(),
            kind: MaskKind::Digest {
                algorithm: config.default_algorithm,
                salted: true,
            },
            prefix: config.prefix.clone(),
            salt: config.salt.as_ref().map(|salt| salt.as_bytes().to_vec()),
        }
    }

    /// Parses the part of an expression following the field pattern.
    fn parse(tokens: &[&str], expression: &str, config: &MaskingConfig) -> Result<Self> {
        let invalid = |reason: &str| ConfigurationError::InvalidMaskExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let mut function = Self::default_digest(config);
        function.spec = tokens.join(SEPARATOR);

        match tokens {
            [] => {}
            [algorithm] if !algorithm.starts_with('/') => {
                let algorithm = algorithm
                    .parse::<DigestAlgorithm>()
                    .map_err(|_| ConfigurationError::UnknownAlgorithm((*algorithm).to_string()))?;
                function.kind = MaskKind::Digest {
                    algorithm,
                    salted: false,
                };
            }
            _ if tokens.len() % 2 != 0 => {
                return Err(invalid("regular expressions and replacements must come in pairs"));
            }
            _ => {
                let steps = tokens
                    .chunks(2)
                    .map(|pair| -> Result<(Regex, String)> {
                        let source = pair[0];
                        let body = source
                            .strip_prefix('/')
                            .and_then(|rest| rest.strip_suffix('/'))
                            .ok_or_else(|| invalid("regular expressions must be wrapped in '/'"))?;
                        let regex = Regex::new(body).map_err(|e| ConfigurationError::InvalidRegex {
                            pattern: source.to_string(),
                            reason: e.to_string(),
                        })?;
                        Ok((regex, pair[1].to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                function.kind = MaskKind::Substitute(steps);
            }
        }

        Ok(function)
    }

    /// Masks raw bytes.
    pub fn apply(&self, value: &[u8]) -> Vec<u8> {
        let masked = match &self.kind {
            MaskKind::Digest { algorithm, salted } => {
                let salt = if *salted { self.salt.as_deref() } else { None };
                hex::encode(digest(*algorithm, salt, value))
            }
            MaskKind::Substitute(steps) => {
                let mut text = String::from_utf8_lossy(value).into_owned();
                for (regex, replacement) in steps {
                    text = regex.replace_all(&text, replacement.as_str()).into_owned();
                }
                text
            }
        };

        match &self.prefix {
            Some(prefix) => format!("{prefix}{masked}").into_bytes(),
            None => masked.into_bytes(),
        }
    }

    /// Masks a string value.
    pub fn apply_str(&self, value: &str) -> String {
        String::from_utf8_lossy(&self.apply(value.as_bytes())).into_owned()
    }

    /// Expression text after the field pattern, empty for the default digest.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Digest used, if this function hashes.
    pub fn algorithm(&self) -> Option<DigestAlgorithm> {
        match self.kind {
            MaskKind::Digest { algorithm, .. } => Some(algorithm),
            MaskKind::Substitute(_) => None,
        }
    }
}

fn digest(algorithm: DigestAlgorithm, salt: Option<&[u8]>, value: &[u8]) -> Vec<u8> {
    fn run<D: Digest>(salt: Option<&[u8]>, value: &[u8]) -> Vec<u8> {
        let mut hasher = D::new();
        if let Some(salt) = salt {
            hasher.update(salt);
        }
        hasher.update(value);
        hasher.finalize().to_vec()
    }

    match algorithm {
        DigestAlgorithm::Sha256 => run::<Sha256>(salt, value),
        DigestAlgorithm::Sha384 => run::<Sha384>(salt, value),
        DigestAlgorithm::Sha512 => run::<Sha512>(salt, value),
        DigestAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            if let Some(salt) = salt {
                hasher.update(salt);
            }
            hasher.update(value);
            hasher.finalize().as_bytes().to_vec()
        }
    }
}

impl fmt::Debug for MaskingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskingFunction")
            .field("spec", &self.spec)
            .field("algorithm", &self.algorithm())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for MaskingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.algorithm() {
            Some(algorithm) if self.spec.is_empty() => write!(f, "default ({algorithm})"),
            _ => f.write_str(&self.spec),
        }
    }
}

impl PartialEq for MaskingFunction {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
            && self.algorithm() == other.algorithm()
            && self.prefix == other.prefix
            && self.salt == other.salt
    }
}

impl Eq for MaskingFunction {}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// One masked field expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskingExpression {
    source: String,
    pattern: Arc<Pattern>,
    function: Arc<MaskingFunction>,
}

impl MaskingExpression {
    pub fn parse(source: &str, cache: &mut PatternCache, config: &MaskingConfig) -> Result<Self> {
        let tokens: Vec<&str> = source.split(SEPARATOR).collect();
        let (field, rest) = tokens.split_first().ok_or_else(|| {
            ConfigurationError::InvalidMaskExpression {
                expression: source.to_string(),
                reason: "missing field name".to_string(),
            }
        })?;
        if field.is_empty() {
            return Err(ConfigurationError::InvalidMaskExpression {
                expression: source.to_string(),
                reason: "missing field name".to_string(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            pattern: cache.compile(field)?,
            function: Arc::new(MaskingFunction::parse(rest, source, config)?),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn function(&self) -> &MaskingFunction {
        &self.function
    }

    fn covers(&self, path: &str) -> bool {
        self_and_ancestors(path).any(|candidate| self.pattern.matches(candidate))
    }
}

/// The masked field expressions of one permission entry.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldMasks {
    expressions: Vec<MaskingExpression>,
}

impl FieldMasks {
    pub fn compile(
        sources: &[String],
        cache: &mut PatternCache,
        config: &MaskingConfig,
    ) -> Result<Self> {
        let expressions = sources
            .iter()
            .map(|source| MaskingExpression::parse(source, cache, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { expressions })
    }

    /// The function of the last expression covering `path` or an ancestor.
    pub fn get(&self, path: &str) -> Option<&MaskingFunction> {
        self.expressions
            .iter()
            .rev()
            .find(|expression| expression.covers(path))
            .map(MaskingExpression::function)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(MaskingExpression::source)
    }
}

// ---------------------------------------------------------------------------
// FieldMaskingRule
// ---------------------------------------------------------------------------

/// The masks and field visibility contributed by one applicable entry.
#[derive(Debug, Clone)]
pub struct MaskingPart {
    pub(crate) masks: Option<Arc<FieldMasks>>,
    pub(crate) fls: Option<Arc<FieldPatterns>>,
}

impl MaskingPart {
    pub fn new(masks: Option<Arc<FieldMasks>>, fls: Option<Arc<FieldPatterns>>) -> Self {
        Self { masks, fls }
    }

    fn sees(&self, path: &str) -> bool {
        self.fls
            .as_ref()
            .is_none_or(|fls| fls.is_allowed_recursive(path))
    }

    fn mask(&self, path: &str) -> Option<&MaskingFunction> {
        self.masks.as_ref().and_then(|masks| masks.get(path))
    }
}

/// The effective masking for one request and target index.
#[derive(Debug)]
pub enum FieldMaskingRule {
    /// Nothing is masked.
    AllowAll,
    /// Every value is masked with the given function.
    MaskAll(Arc<MaskingFunction>),
    /// Exactly one applicable entry masks fields.
    SingleRole(Arc<FieldMasks>),
    /// A field is masked only if every entry able to see it masks it.
    MultiRole(Vec<MaskingPart>),
}

impl FieldMaskingRule {
    /// Builds the rule from every applicable entry.
    pub fn from_parts(parts: Vec<MaskingPart>) -> Self {
        if parts
            .iter()
            .any(|part| part.masks.is_none() && part.fls.is_none())
            || parts.iter().all(|part| part.masks.is_none())
        {
            return Self::AllowAll;
        }

        if let [part] = parts.as_slice() {
            if let Some(masks) = &part.masks {
                return Self::SingleRole(Arc::clone(masks));
            }
        }

        Self::MultiRole(parts)
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::AllowAll)
    }

    /// The masking function for `path`, if its value must be masked.
    pub fn get(&self, path: &str) -> Option<&MaskingFunction> {
        let path = strip_keyword(path);
        match self {
            Self::AllowAll => None,
            Self::MaskAll(function) => Some(function.as_ref()),
            Self::SingleRole(masks) => masks.get(path),
            Self::MultiRole(parts) => {
                let visible: Vec<&MaskingPart> = parts.iter().filter(|part| part.sees(path)).collect();
                let considered = if visible.is_empty() {
                    parts.iter().collect()
                } else {
                    visible
                };

                let mut first = None;
                for part in considered {
                    let function = part.mask(path)?;
                    first.get_or_insert(function);
                }
                first
            }
        }
    }

    /// Masked field expressions per part, for diagnostics.
    pub fn expression_lists(&self) -> Vec<Vec<&str>> {
        match self {
            Self::AllowAll => Vec::new(),
            Self::MaskAll(_) => vec![vec!["*"]],
            Self::SingleRole(masks) => vec![masks.sources().collect()],
            Self::MultiRole(parts) => parts
                .iter()
                .map(|part| part.masks.as_ref().map(|m| m.sources().collect()).unwrap_or_default())
                .collect(),
        }
    }
}
