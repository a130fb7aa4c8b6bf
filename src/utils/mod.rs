pub mod masking;
pub mod prompt;
pub mod workdir;

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use which::which;

use crate::errors::{AppError, Result};

/// Finds an executable in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|_| {
        AppError::process(
            name,
            format!(
                "{} executable not found in PATH. Please ensure it is installed and in your PATH.",
                name
            ),
        )
    })
}

/// Lowercases and replaces anything outside `[a-z0-9_.-]` so the value is a valid volume name.
pub fn sanitize_volume_name(input: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9_.-]+").expect("static regex"));
    let lowered = input.to_lowercase();
    let replaced = invalid.replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches(|c| c == '-' || c == '.' || c == '_');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_names_are_sanitized() {
        assert_eq!(sanitize_volume_name("Orders DB"), "orders-db");
        assert_eq!(sanitize_volume_name("app_prod.v2"), "app_prod.v2");
        assert_eq!(sanitize_volume_name("--$weird$--"), "weird");
        assert_eq!(sanitize_volume_name("%%%"), "default");
    }

    #[test]
    fn missing_executable_is_a_process_failure() {
        let err = find_executable("definitely-not-a-real-binary-7f3a").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
