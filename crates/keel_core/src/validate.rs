//! Name validation for environments and applications.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CoreError, CoreResult};

const MAX_NAME_LEN: usize = 255;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9\-]*$").expect("valid name pattern"))
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::InvalidName {
            name: name.to_string(),
            reason: "value must not be empty".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidName {
            name: name.to_string(),
            reason: format!("value must not exceed {} characters", MAX_NAME_LEN),
        });
    }
    if !name_pattern().is_match(name) {
        return Err(CoreError::InvalidName {
            name: name.to_string(),
            reason: "value must start with a lowercase letter and contain only lowercase letters, numbers, and hyphens".to_string(),
        });
    }
    Ok(())
}

/// Validate an environment name.
pub fn validate_environment_name(name: &str) -> CoreResult<()> {
    validate_name(name)
}

/// Validate an application name.
pub fn validate_application_name(name: &str) -> CoreResult<()> {
    validate_name(name)
}
