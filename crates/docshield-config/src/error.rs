//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown digest algorithm '{0}' (expected one of: SHA-256, SHA-384, SHA-512, BLAKE3)")]
    UnknownAlgorithm(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Unsupported document format for {path} (expected .toml or .json)")]
    UnsupportedFormat { path: PathBuf },

    #[error("XDG directory error: {0}")]
    XdgError(String),
}
