//! Centralized validation logic for user inputs.
//!
//! Branch names double as filesystem path segments, git branch names and
//! docker-compose project name fragments, so the accepted charset is the
//! intersection of what all three tolerate.

use crate::error::{HovelError, Result};

/// Maximum branch name length (a git ref component and a compose project
/// fragment both stay comfortably below this).
const MAX_BRANCH_NAME_LEN: usize = 63;

/// Validate a branch name.
///
/// Accepted names start with an ASCII alphanumeric character followed by up
/// to 62 alphanumerics, underscores or hyphens.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(HovelError::InvalidRequest)` if invalid
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HovelError::InvalidRequest(
            "branch_name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_BRANCH_NAME_LEN {
        return Err(HovelError::InvalidRequest(format!(
            "branch_name must be at most {} characters",
            MAX_BRANCH_NAME_LEN
        )));
    }

    let mut chars = name.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphanumeric() {
        return Err(HovelError::InvalidRequest(
            "branch_name must start with a letter or digit".to_string(),
        ));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(HovelError::InvalidRequest(format!(
            "branch_name '{}' contains invalid characters (only alphanumeric, '_' and '-' allowed)",
            name
        )));
    }

    Ok(())
}
