//! Configuration loader with multi-source merging

use crate::{DocshieldConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use tracing::debug;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "DOCSHIELD".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "DOCSHIELD")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/docshield/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<DocshieldConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = DocshieldConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project and local files
        for (layer, file) in Paths::new().existing_layers(&self.project_dir, self.include_user_config) {
            debug!(layer = %layer, file = %file.display(), "Adding configuration layer");
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (DOCSHIELD_MASKING__PREFIX=...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut docshield_config: DocshieldConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        docshield_config
            .validate()
            .context("Configuration failed validation")?;

        docshield_config.resolve_paths(&self.project_dir);

        Ok(docshield_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> DocshieldConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
