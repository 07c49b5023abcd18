//! Configuration validation framework

use crate::{ConfigError, ConfigResult};
use std::path::Path;

/// Trait for validating configuration values
pub trait Validate {
    /// Validate this configuration object
    ///
    /// # Errors
    /// Returns validation errors if the configuration is invalid
    fn validate(&self) -> ConfigResult<()>;
}

/// Validate a value is within a range
///
/// # Errors
/// Returns `ConfigError::OutOfRange` if value is outside the specified range
pub fn validate_range(value: u64, min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange {
            field: field_name.to_string(),
            value,
            min,
            max,
        })
    } else {
        Ok(())
    }
}

/// Validate a string is not empty
///
/// # Errors
/// Returns `ConfigError::MissingField` if the string is empty or whitespace-only
pub fn validate_non_empty(value: &str, field_name: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField {
            field: field_name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validate a path is either absent or an existing directory
///
/// The suggester creates missing directories lazily, but refuses to start
/// when the path is taken by a regular file.
///
/// # Errors
/// Returns `ConfigError::NotADirectory` if the path exists and is not a directory
pub fn validate_directory(path: &Path) -> ConfigResult<()> {
    if path.exists() && !path.is_dir() {
        Err(ConfigError::NotADirectory {
            path: path.display().to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range_bounds_are_inclusive() {
        assert!(validate_range(1, 1, 10, "x").is_ok());
        assert!(validate_range(10, 1, 10, "x").is_ok());
        assert!(matches!(
            validate_range(11, 1, 10, "x"),
            Err(ConfigError::OutOfRange { value: 11, .. })
        ));
    }

    #[test]
    fn test_validate_non_empty_rejects_whitespace() {
        assert!(validate_non_empty("  ", "name").is_err());
        assert!(validate_non_empty("full", "name").is_ok());
    }

    #[test]
    fn test_validate_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_directory(dir.path()).is_ok());
        assert!(validate_directory(&dir.path().join("missing")).is_ok());

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_directory(&file),
            Err(ConfigError::NotADirectory { .. })
        ));
    }
}
