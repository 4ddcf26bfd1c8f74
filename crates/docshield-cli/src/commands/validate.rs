//! Check a role document.

use super::load_roles;
use crate::style::{SemanticStyle, print_error, print_success};
use anyhow::{Result, bail};
use docshield_config::DocshieldConfig;
use docshield_privileges::validate_roles;
use std::path::Path;

pub fn run(config: &DocshieldConfig, roles: Option<&Path>) -> Result<()> {
    let document = load_roles(config, roles)?;

    match validate_roles(&document, config) {
        Ok(()) => {
            let count = document.len();
            let word = if count == 1 { "role" } else { "roles" };
            print_success(&format!("{count} {word} valid"));
            Ok(())
        }
        Err(errors) => {
            for (role, role_errors) in errors.iter() {
                for error in role_errors {
                    print_error(&format!("{}: {error}", role.code()));
                }
            }
            bail!("{} configuration error(s)", errors.len())
        }
    }
}
