//! CLI command implementations.

pub mod explain;
pub mod hash;
pub mod mask;
pub mod validate;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use docshield_config::{DocshieldConfig, load_document};
use docshield_privileges::{
    Generation, MetaGraph, PrivilegesEvaluationContext, RolesDocument, User,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Who is asking, and against which configuration.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// User name.
    #[arg(short, long)]
    pub user: String,

    /// Active role (repeatable).
    #[arg(short = 'r', long = "role")]
    pub roles: Vec<String>,

    /// User attribute as KEY=VALUE; VALUE is read as JSON when it parses.
    #[arg(short, long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, Value)>,

    /// Role document (TOML or JSON); defaults to `files.roles`.
    #[arg(long = "roles")]
    pub roles_file: Option<PathBuf>,

    /// Metadata snapshot (TOML or JSON); defaults to `files.metadata`.
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,
}

impl RequestArgs {
    pub fn context(&self) -> PrivilegesEvaluationContext {
        let user = self
            .attributes
            .iter()
            .fold(User::new(&self.user), |user, (key, value)| {
                user.with_attribute(key, value.clone())
            });
        PrivilegesEvaluationContext::new(user, &self.roles)
    }

    pub fn generation(&self, config: &DocshieldConfig) -> Result<Generation> {
        let roles = load_roles(config, self.roles_file.as_deref())?;
        Generation::build(&roles, config).map_err(|errors| anyhow!("{errors}"))
    }

    pub fn meta(&self, config: &DocshieldConfig) -> Result<MetaGraph> {
        let path = self
            .metadata
            .as_deref()
            .or(config.files.metadata.as_deref())
            .context("No metadata snapshot given; pass --metadata or set files.metadata")?;
        load_document(path)
    }
}

pub fn load_roles(config: &DocshieldConfig, path: Option<&Path>) -> Result<RolesDocument> {
    let Some(path) = path.or(config.files.roles.as_deref()) else {
        bail!("No role document given; pass --roles or set files.roles");
    };
    load_document(path)
}

fn parse_attribute(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        bail!("attribute name must not be empty");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
