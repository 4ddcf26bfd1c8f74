//! Configuration management for docshield
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (DOCSHIELD_* prefix, `__` between sections)
//! 3. docshield.local.toml (gitignored, local overrides)
//! 4. docshield.toml (git-tracked, project config)
//! 5. ~/.config/docshield/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! Role documents and metadata snapshots are separate files; see
//! [`load_document`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod documents;
mod error;
mod loader;
mod paths;

pub use documents::{DocumentFormat, load_document};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{ConfigLayer, Paths};

/// Upper bound for `authz_hash.max_verbatim_len`.
pub const MAX_VERBATIM_LEN_LIMIT: usize = 4096;

/// Main docshield configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocshieldConfig {
    pub masking: MaskingConfig,
    pub cache: CacheConfig,
    pub authz_hash: AuthzHashConfig,
    pub logging: LoggingConfig,
    pub files: FilesConfig,
}

/// Field masking defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaskingConfig {
    /// Digest used by mask expressions without an explicit algorithm.
    pub default_algorithm: DigestAlgorithm,
    /// Literal prepended to every masked value.
    pub prefix: Option<String>,
    /// Mixed into the default digest only.
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-rule bound on memoized field path decisions.
    pub field_decisions: usize,
    /// Per-generation bound on memoized restriction objects.
    pub restrictions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            field_decisions: 10_000,
            restrictions: 4_096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthzHashConfig {
    /// Canonical policy strings up to this length are used as the hash verbatim.
    pub max_verbatim_len: usize,
}

impl Default for AuthzHashConfig {
    fn default() -> Self {
        Self {
            max_verbatim_len: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// Role document (TOML or JSON).
    pub roles: Option<PathBuf>,
    /// Cluster metadata snapshot (TOML or JSON).
    pub metadata: Option<PathBuf>,
}

/// Digest algorithms available to field masking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    #[default]
    #[serde(rename = "sha-256", alias = "SHA-256", alias = "sha256", alias = "SHA256")]
    Sha256,
    #[serde(rename = "sha-384", alias = "SHA-384", alias = "sha384", alias = "SHA384")]
    Sha384,
    #[serde(rename = "sha-512", alias = "SHA-512", alias = "sha512", alias = "SHA512")]
    Sha512,
    #[serde(rename = "blake3", alias = "BLAKE3")]
    Blake3,
}

impl DigestAlgorithm {
    /// Canonical display name, as accepted in mask expressions.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
            Self::Blake3 => "BLAKE3",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            "BLAKE3" => Ok(Self::Blake3),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl DocshieldConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.cache.field_decisions == 0 {
            return Err(ConfigError::ValidationError(
                "cache.field_decisions must be greater than zero".to_string(),
            ));
        }
        if self.cache.restrictions == 0 {
            return Err(ConfigError::ValidationError(
                "cache.restrictions must be greater than zero".to_string(),
            ));
        }
        if self.authz_hash.max_verbatim_len > MAX_VERBATIM_LEN_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "authz_hash.max_verbatim_len must not exceed {MAX_VERBATIM_LEN_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        for path in [&mut self.files.roles, &mut self.files.metadata]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
