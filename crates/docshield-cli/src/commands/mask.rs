//! Apply a masked field expression to a value.

use anyhow::{Context, Result};
use docshield_config::DocshieldConfig;
use docshield_privileges::masking::MaskingExpression;
use docshield_privileges::pattern::PatternCache;

pub fn run(config: &DocshieldConfig, expression: &str, value: &str) -> Result<()> {
    let expression = MaskingExpression::parse(expression, &mut PatternCache::new(), &config.masking)
        .with_context(|| format!("Invalid mask expression '{expression}'"))?;
    println!("{}", expression.function().apply_str(value));
    Ok(())
}
