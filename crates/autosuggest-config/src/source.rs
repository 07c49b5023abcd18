//! Configuration source loading and composition

use crate::validation::Validate;
use crate::{ApplicationConfig, ConfigResult};
use std::path::Path;

/// Trait for loading configuration from different sources
pub trait ConfigurationSource {
    /// Produce a configuration, starting from the one assembled so far
    ///
    /// # Errors
    /// Returns configuration loading errors
    fn load(&self, base: ApplicationConfig) -> ConfigResult<ApplicationConfig>;

    /// Get the name of this configuration source
    fn name(&self) -> &str;

    /// Get the priority of this source (higher number = higher priority)
    fn priority(&self) -> u8;
}

/// Load configuration from environment variables
pub struct EnvironmentSource;

impl ConfigurationSource for EnvironmentSource {
    fn load(&self, base: ApplicationConfig) -> ConfigResult<ApplicationConfig> {
        Ok(base.with_env_overrides())
    }

    fn name(&self) -> &'static str {
        "environment"
    }

    fn priority(&self) -> u8 {
        100 // Environment variables override everything
    }
}

/// Load configuration from TOML file
///
/// Missing keys fall back to defaults, so a file may set only what it needs.
pub struct TomlFileSource {
    path: std::path::PathBuf,
}

impl TomlFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigurationSource for TomlFileSource {
    fn load(&self, _base: ApplicationConfig) -> ConfigResult<ApplicationConfig> {
        let content = std::fs::read_to_string(&self.path)?;
        let config: ApplicationConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn name(&self) -> &'static str {
        "toml_file"
    }

    fn priority(&self) -> u8 {
        50 // Below env vars, above defaults
    }
}

/// Type alias for configuration sources
type ConfigSources = Vec<Box<dyn ConfigurationSource>>;

/// Configuration loader that combines multiple sources
pub struct ConfigurationLoader {
    sources: ConfigSources,
}

impl ConfigurationLoader {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigurationSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Load configuration from all sources with priority ordering
    ///
    /// A source that fails to load is logged and skipped; the result is
    /// validated once every source has been applied.
    ///
    /// # Errors
    /// Returns validation errors for the combined configuration
    pub fn load(&self) -> ConfigResult<ApplicationConfig> {
        let mut config = ApplicationConfig::default();

        // Lowest priority first, so higher priorities are applied last
        let mut sorted_sources = self.sources.iter().collect::<Vec<_>>();
        sorted_sources.sort_by_key(|source| source.priority());

        for source in sorted_sources {
            match source.load(config.clone()) {
                Ok(source_config) => {
                    tracing::debug!(source = source.name(), "Loaded configuration");
                    config = source_config;
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Failed to load configuration source");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_without_sources_yields_defaults() {
        let config = ConfigurationLoader::new().load().unwrap();
        assert_eq!(config.suggester.result_size, crate::DEFAULT_RESULT_SIZE);
    }

    #[test]
    fn test_toml_source_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosuggest.toml");
        std::fs::write(
            &path,
            "[suggester]\nresult_size = 3\nallow_most_popular = false\n",
        )
        .unwrap();

        let config = ConfigurationLoader::new()
            .add_source(Box::new(TomlFileSource::new(&path)))
            .load()
            .unwrap();

        assert_eq!(config.suggester.result_size, 3);
        assert!(!config.suggester.allow_most_popular);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigurationLoader::new()
            .add_source(Box::new(TomlFileSource::new("/nonexistent/autosuggest.toml")))
            .load();
        assert!(config.is_ok());
    }

    #[test]
    fn test_invalid_file_contents_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosuggest.toml");
        std::fs::write(&path, "[suggester]\nresult_size = 0\n").unwrap();

        let result = ConfigurationLoader::new()
            .add_source(Box::new(TomlFileSource::new(&path)))
            .load();
        assert!(result.is_err());
    }
}
