//! Centralized configuration management for autosuggest
//!
//! This crate provides type-safe, validated configuration for the suggester
//! engine and the binaries built on top of it, with support for multiple
//! sources (environment, TOML files).
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;
pub mod source;
pub mod validation;

pub use error::{ConfigError, ConfigResult};

use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Suggester Configuration
pub const DEFAULT_ENABLED: bool = true;
pub const DEFAULT_RESULT_SIZE: usize = 10;
pub const DEFAULT_MIN_CHARS: usize = 0;
pub const DEFAULT_MAX_PROJECTS: usize = 32_767; // Effectively unlimited
pub const DEFAULT_ALLOW_COMPLEX_QUERIES: bool = true;
pub const DEFAULT_ALLOW_MOST_POPULAR: bool = true;
pub const DEFAULT_PROJECTS_ENABLED: bool = true;
pub const DEFAULT_TIME_THRESHOLD_MS: u64 = 2000;
pub const DEFAULT_AWAIT_TERMINATION_SECS: u64 = 1800; // 30 minutes for large rebuilds
pub const DEFAULT_REBUILD_PARALLELISM_PERCENT: u8 = 80;
pub const DEFAULT_POPULARITY_WAIT_FOR_LOCK: bool = false; // Drop counts instead of waiting
const DEFAULT_SUGGESTER_DIR_NAME: &str = "autosuggest";

// Telemetry Configuration
const DEFAULT_TRACING_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "compact";
const DEFAULT_TELEMETRY_SERVICE_NAME: &str = "autosuggest";

/// Core configuration for the autosuggest application
///
/// All settings have safe defaults and can be overridden via environment variables.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Suggester engine configuration
    pub suggester: SuggesterConfig,

    /// Logging configuration
    pub telemetry: TelemetryConfig,
}

/// Suggester engine configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SuggesterConfig {
    /// Master switch; a disabled engine answers every search with no items
    pub enabled: bool,

    /// Root directory for persisted automatons and popularity counts
    pub suggester_dir: PathBuf,

    /// Maximum number of suggestions returned per search
    pub result_size: usize,

    /// Minimum typed characters before suggestions are computed
    pub min_chars: usize,

    /// Maximum number of projects a single search may fan out to
    pub max_projects: usize,

    /// Projects suggestions are built for (`None` = every project)
    pub allowed_projects: Option<Vec<String>>,

    /// Fields suggestions are built for (`None` = every indexed field)
    pub allowed_fields: Option<Vec<String>>,

    /// Whether non-prefix queries are evaluated against documents
    pub allow_complex_queries: bool,

    /// Whether search counts are tracked and mixed into rankings
    pub allow_most_popular: bool,

    /// Whether the index is split into per-project shards
    pub projects_enabled: bool,

    /// Deadline for complex-query fan-out, in milliseconds
    pub time_threshold_ms: u64,

    /// How long `init`/`close` wait for rebuild work, in seconds
    pub await_termination_secs: u64,

    /// Share of available CPUs used for rebuilds (0-100)
    pub rebuild_parallelism_percent: u8,

    /// Number of concurrent per-shard search tasks
    pub search_parallelism: usize,

    /// Whether popularity increments wait for a rebuilding shard
    pub popularity_wait_for_lock: bool,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            suggester_dir: default_suggester_dir(),
            result_size: DEFAULT_RESULT_SIZE,
            min_chars: DEFAULT_MIN_CHARS,
            max_projects: DEFAULT_MAX_PROJECTS,
            allowed_projects: None,
            allowed_fields: None,
            allow_complex_queries: DEFAULT_ALLOW_COMPLEX_QUERIES,
            allow_most_popular: DEFAULT_ALLOW_MOST_POPULAR,
            projects_enabled: DEFAULT_PROJECTS_ENABLED,
            time_threshold_ms: DEFAULT_TIME_THRESHOLD_MS,
            await_termination_secs: DEFAULT_AWAIT_TERMINATION_SECS,
            rebuild_parallelism_percent: DEFAULT_REBUILD_PARALLELISM_PERCENT,
            search_parallelism: available_cpus(),
            popularity_wait_for_lock: DEFAULT_POPULARITY_WAIT_FOR_LOCK,
        }
    }
}

/// Default persistence root: the platform data dir, or the temp dir as a fallback
fn default_suggester_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_SUGGESTER_DIR_NAME)
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Parse a comma-separated list, ignoring empty entries
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl SuggesterConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `AUTOSUGGEST_*` environment variables on top of `self`
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let suggester_dir = std::env::var("AUTOSUGGEST_SUGGESTER_DIR")
            .map(PathBuf::from)
            .unwrap_or(self.suggester_dir);

        let allowed_projects = std::env::var("AUTOSUGGEST_ALLOWED_PROJECTS")
            .ok()
            .map(|s| parse_list(&s))
            .or(self.allowed_projects);

        let allowed_fields = std::env::var("AUTOSUGGEST_ALLOWED_FIELDS")
            .ok()
            .map(|s| parse_list(&s))
            .or(self.allowed_fields);

        Self {
            enabled: env_parse("AUTOSUGGEST_ENABLED").unwrap_or(self.enabled),
            suggester_dir,
            result_size: env_parse("AUTOSUGGEST_RESULT_SIZE").unwrap_or(self.result_size),
            min_chars: env_parse("AUTOSUGGEST_MIN_CHARS").unwrap_or(self.min_chars),
            max_projects: env_parse("AUTOSUGGEST_MAX_PROJECTS").unwrap_or(self.max_projects),
            allowed_projects,
            allowed_fields,
            allow_complex_queries: env_parse("AUTOSUGGEST_ALLOW_COMPLEX_QUERIES")
                .unwrap_or(self.allow_complex_queries),
            allow_most_popular: env_parse("AUTOSUGGEST_ALLOW_MOST_POPULAR")
                .unwrap_or(self.allow_most_popular),
            projects_enabled: env_parse("AUTOSUGGEST_PROJECTS_ENABLED")
                .unwrap_or(self.projects_enabled),
            time_threshold_ms: env_parse("AUTOSUGGEST_TIME_THRESHOLD_MS")
                .unwrap_or(self.time_threshold_ms),
            await_termination_secs: env_parse("AUTOSUGGEST_AWAIT_TERMINATION_SECS")
                .unwrap_or(self.await_termination_secs),
            rebuild_parallelism_percent: env_parse("AUTOSUGGEST_REBUILD_PARALLELISM_PERCENT")
                .unwrap_or(self.rebuild_parallelism_percent),
            search_parallelism: env_parse("AUTOSUGGEST_SEARCH_PARALLELISM")
                .unwrap_or(self.search_parallelism),
            popularity_wait_for_lock: env_parse("AUTOSUGGEST_POPULARITY_WAIT_FOR_LOCK")
                .unwrap_or(self.popularity_wait_for_lock),
        }
    }

    /// Deadline for complex-query fan-out
    pub const fn time_threshold(&self) -> Duration {
        Duration::from_millis(self.time_threshold_ms)
    }

    /// Maximum wait for rebuild work during `init` and `close`
    pub const fn await_termination(&self) -> Duration {
        Duration::from_secs(self.await_termination_secs)
    }

    /// Number of rebuild workers derived from the CPU percentage, at least one
    pub fn rebuild_parallelism(&self) -> usize {
        let cpus = available_cpus();
        let scaled = cpus
            .saturating_mul(usize::from(self.rebuild_parallelism_percent))
            .saturating_div(100);
        scaled.max(1)
    }

    /// Whether `project` is eligible for suggestions
    pub fn is_project_allowed(&self, project: &str) -> bool {
        self.allowed_projects
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|p| p == project))
    }
}

impl validation::Validate for SuggesterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_directory(&self.suggester_dir)?;
        validation::validate_range(self.result_size as u64, 1, 10_000, "result_size")?;
        validation::validate_range(self.max_projects as u64, 1, u64::MAX, "max_projects")?;
        validation::validate_range(self.time_threshold_ms, 1, u64::MAX, "time_threshold_ms")?;
        validation::validate_range(
            self.await_termination_secs,
            1,
            u64::MAX,
            "await_termination_secs",
        )?;
        validation::validate_range(
            u64::from(self.rebuild_parallelism_percent),
            0,
            100,
            "rebuild_parallelism_percent",
        )?;
        validation::validate_range(
            self.search_parallelism as u64,
            1,
            4096,
            "search_parallelism",
        )?;

        if let Some(fields) = &self.allowed_fields {
            for field in fields {
                validation::validate_non_empty(field, "allowed_fields")?;
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Tracing level (trace, debug, info, warn, error)
    pub tracing_level: String,

    /// Log line format (json, compact)
    pub log_format: String,

    /// Service name recorded on log lines
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tracing_level: DEFAULT_TRACING_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            service_name: DEFAULT_TELEMETRY_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `AUTOSUGGEST_TELEMETRY_*` environment variables on top of `self`
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            tracing_level: std::env::var("AUTOSUGGEST_TELEMETRY_TRACING_LEVEL")
                .unwrap_or(self.tracing_level),
            log_format: std::env::var("AUTOSUGGEST_TELEMETRY_LOG_FORMAT")
                .unwrap_or(self.log_format),
            service_name: std::env::var("AUTOSUGGEST_TELEMETRY_SERVICE_NAME")
                .unwrap_or(self.service_name),
        }
    }
}

impl validation::Validate for TelemetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.service_name, "service_name")?;

        match self.log_format.to_lowercase().as_str() {
            "json" | "compact" | "text" => {}
            _ => {
                return Err(ConfigError::Generic {
                    message: format!("Invalid log format: {}", self.log_format),
                });
            }
        }

        match self.tracing_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Generic {
                message: format!("Invalid tracing level: {}", self.tracing_level),
            }),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides to both sections
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            suggester: self.suggester.with_env_overrides(),
            telemetry: self.telemetry.with_env_overrides(),
        }
    }
}

impl validation::Validate for ApplicationConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.suggester.validate()?;
        self.telemetry.validate()?;

        if let Some(projects) = &self.suggester.allowed_projects
            && !self.suggester.projects_enabled
            && !projects.is_empty()
        {
            return Err(ConfigError::Generic {
                message: "allowed_projects requires projects_enabled".to_string(),
            });
        }

        Ok(())
    }
}
