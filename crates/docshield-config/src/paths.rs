//! Where configuration files live.

use crate::ConfigError;
use directories::ProjectDirs;
use std::fmt;
use std::path::{Path, PathBuf};

/// A configuration file layer, in ascending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigLayer {
    /// `~/.config/docshield/config.toml`
    User,
    /// `docshield.toml`, checked in next to the role documents.
    Project,
    /// `docshield.local.toml`, never checked in.
    Local,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        })
    }
}

/// Platform directories for docshield.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "Docshield", "docshield"),
        }
    }

    /// The user config directory, e.g. `~/.config/docshield/`.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("no home directory for user config".to_string()))
    }

    /// The file backing `layer` for a project rooted at `project_dir`.
    pub fn layer_file(
        &self,
        layer: ConfigLayer,
        project_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ConfigError> {
        let project_dir = project_dir.as_ref();
        match layer {
            ConfigLayer::User => Ok(self.user_config_dir()?.join("config.toml")),
            ConfigLayer::Project => Ok(project_dir.join("docshield.toml")),
            ConfigLayer::Local => Ok(project_dir.join("docshield.local.toml")),
        }
    }

    /// Existing layer files, lowest precedence first.
    ///
    /// A missing home directory only drops the user layer.
    pub fn existing_layers(
        &self,
        project_dir: impl AsRef<Path>,
        include_user: bool,
    ) -> Vec<(ConfigLayer, PathBuf)> {
        let project_dir = project_dir.as_ref();
        [ConfigLayer::User, ConfigLayer::Project, ConfigLayer::Local]
            .into_iter()
            .filter(|layer| include_user || *layer != ConfigLayer::User)
            .filter_map(|layer| {
                let file = self.layer_file(layer, project_dir).ok()?;
                file.exists().then_some((layer, file))
            })
            .collect()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
