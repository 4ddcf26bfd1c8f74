//! docshield operator CLI.
//!
//! Checks role documents and shows what a user would see in an index.
//!
//! # Quick Start
//!
//! ```bash
//! # Check a role document
//! docshield validate --roles roles.toml
//!
//! # Show DLS, FLS and masking for a user on an index
//! docshield explain --roles roles.toml --metadata meta.json \
//!     --user jane --role hr_reader --attr dept=sales --index hr-eu
//!
//! # Mask a value the way a masked field expression would
//! docshield mask 'email::/^[^@]+/::***' jane@example.com
//! ```

mod commands;
mod style;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::RequestArgs;
use docshield_config::ConfigLoader;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// docshield - document, field and value authorization for search.
#[derive(Parser)]
#[command(name = "docshield")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding docshield.toml (defaults to the current directory).
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a role document and report every configuration error.
    Validate {
        /// Role document (TOML or JSON); defaults to `files.roles`.
        #[arg(short, long)]
        roles: Option<PathBuf>,
    },

    /// Show the DLS, FLS and masking restrictions for a request.
    Explain {
        #[command(flatten)]
        request: RequestArgs,

        /// Target index.
        #[arg(short, long)]
        index: String,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the authz hash of a request.
    Hash {
        #[command(flatten)]
        request: RequestArgs,

        /// Target indices.
        #[arg(short, long = "index", required = true)]
        indices: Vec<String>,
    },

    /// Apply a masked field expression to a value.
    Mask {
        /// Expression such as `ssn`, `ssn::SHA-512` or `phone::/\d{4}$/::XXXX`.
        expression: String,

        /// Value to mask.
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.project_dir {
        loader = loader.with_project_dir(dir);
    }
    let config = loader.load().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(
        project_dir = ?cli.project_dir,
        algorithm = %config.masking.default_algorithm,
        "Loaded configuration"
    );

    match cli.command {
        Commands::Validate { roles } => commands::validate::run(&config, roles.as_deref()),
        Commands::Explain {
            request,
            index,
            json,
        } => commands::explain::run(&config, &request, &index, json),
        Commands::Hash { request, indices } => commands::hash::run(&config, &request, &indices),
        Commands::Mask { expression, value } => commands::mask::run(&config, &expression, &value),
    }
}
