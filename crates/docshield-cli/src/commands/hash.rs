//! Print the authz hash of a request.

use super::RequestArgs;
use anyhow::{Context, Result};
use docshield_config::DocshieldConfig;

pub fn run(config: &DocshieldConfig, request: &RequestArgs, indices: &[String]) -> Result<()> {
    let generation = request.generation(config)?;
    let meta = request.meta(config)?;

    let hash = generation
        .authz_hash(&request.context(), &meta, indices)
        .context("Failed to compute authz hash")?;
    println!("{hash}");
    Ok(())
}
