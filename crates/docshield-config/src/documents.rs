//! Reading role documents and metadata snapshots from disk.

use crate::ConfigError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// On-disk formats accepted for documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Json,
}

impl DocumentFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> std::result::Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Parses `content` in this format.
    pub fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T> {
        match self {
            Self::Toml => toml::from_str(content).context("Failed to parse TOML document"),
            Self::Json => serde_json::from_str(content).context("Failed to parse JSON document"),
        }
    }
}

/// Reads and deserializes a TOML or JSON document.
pub fn load_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let format = DocumentFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    format
        .parse(&content)
        .with_context(|| format!("Invalid document {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        tags: BTreeMap<String, Vec<String>>,
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("roles.TOML")).unwrap(),
            DocumentFormat::Toml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("meta.json")).unwrap(),
            DocumentFormat::Json
        );
        assert!(DocumentFormat::from_path(Path::new("roles.yml")).is_err());
        assert!(DocumentFormat::from_path(Path::new("roles")).is_err());
    }

    #[test]
    fn test_load_toml_and_json_agree() {
        let dir = tempdir().expect("Failed to create temp dir");
        let toml_path = dir.path().join("doc.toml");
        let json_path = dir.path().join("doc.json");

        fs::write(&toml_path, "name = \"a\"\n[tags]\nx = [\"1\", \"2\"]\n").unwrap();
        fs::write(&json_path, r#"{"name": "a", "tags": {"x": ["1", "2"]}}"#).unwrap();

        let from_toml: Doc = load_document(&toml_path).unwrap();
        let from_json: Doc = load_document(&json_path).unwrap();
        assert_eq!(from_toml, from_json);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("absent.json");
        let err = load_document::<Doc>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
