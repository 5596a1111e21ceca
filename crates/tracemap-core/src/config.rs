//! Configuration for tracemap
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Conversion into engine settings (histogram schema, sampler, grouping)

use crate::application::ServiceType;
use crate::grouping::{GroupingRule, PatternGrouping};
use crate::histogram::HistogramSchema;
use crate::store::LinkStore;
use crate::topology::TopologyBuilder;
use crate::window::{DownSampler, DEFAULT_MAX_BUCKETS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete tracemap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracemapConfig {
    pub logging: LoggingSettings,

    pub query: QuerySettings,

    /// Response time slot thresholds
    pub histogram: HistogramSettings,

    pub grouping: GroupingSettings,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Deadline for one topology build
    pub timeout_ms: u64,

    /// Upper bound on buckets for long ranges
    pub max_buckets: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

impl QuerySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sampler(&self) -> DownSampler {
        DownSampler::new(self.max_buckets)
    }
}

/// Histogram thresholds in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramSettings {
    pub fast_ms: u64,
    pub normal_ms: u64,
    pub slow_ms: u64,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        let schema = HistogramSchema::default();
        Self {
            fast_ms: schema.fast_ms(),
            normal_ms: schema.normal_ms(),
            slow_ms: schema.slow_ms(),
        }
    }
}

impl HistogramSettings {
    pub fn schema(&self) -> ConfigResult<HistogramSchema> {
        HistogramSchema::new(self.fast_ms, self.normal_ms, self.slow_ms)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Node grouping rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    pub rules: Vec<GroupingRuleConfig>,
}

/// One `[[grouping.rules]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingRuleConfig {
    /// Regex matched against the application name
    pub pattern: String,

    /// Name of the grouped node
    pub group: String,

    /// Restrict the rule to one service type code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<u16>,
}

impl GroupingSettings {
    pub fn build(&self) -> ConfigResult<PatternGrouping> {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let built = GroupingRule::new(&rule.pattern, rule.group.clone()).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "Invalid grouping pattern '{}': {}",
                        rule.pattern, e
                    ))
                })?;
                Ok(match rule.service_type {
                    Some(code) => built.with_service_type(ServiceType(code)),
                    None => built,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(PatternGrouping::new(rules))
    }
}

impl TracemapConfig {
    /// Topology builder configured from these settings
    pub fn topology_builder(&self, store: Arc<dyn LinkStore>) -> ConfigResult<TopologyBuilder> {
        Ok(TopologyBuilder::new(store)
            .with_schema(self.histogram.schema()?)
            .with_sampler(Arc::new(self.query.sampler()))
            .with_timeout(self.query.timeout()))
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. TRACEMAP_CONFIG environment variable
    /// 3. ~/.config/tracemap/config.toml
    /// 4. /etc/tracemap/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<TracemapConfig> {
        let mut config = match self.find_config_file()? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                self.load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                TracemapConfig::default()
            }
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use. An explicit CLI path must exist.
    fn find_config_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::NotFound(path.clone()));
        }

        if let Ok(env_path) = std::env::var("TRACEMAP_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!("TRACEMAP_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Ok(Some(path));
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/tracemap/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn load_from_file(&self, path: &Path) -> ConfigResult<TracemapConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: TracemapConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut TracemapConfig) {
        if let Ok(val) = std::env::var("TRACEMAP_LOG_LEVEL") {
            config.logging.level = val;
        }
        if let Ok(val) = std::env::var("TRACEMAP_QUERY_TIMEOUT_MS") {
            match val.parse() {
                Ok(timeout_ms) => config.query.timeout_ms = timeout_ms,
                Err(_) => warn!("Ignoring TRACEMAP_QUERY_TIMEOUT_MS={}", val),
            }
        }
    }

    pub fn validate(&self, config: &TracemapConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.logging.level, valid_levels
            )));
        }

        if config.query.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Query timeout cannot be 0".to_string(),
            ));
        }
        if config.query.max_buckets < 3 {
            return Err(ConfigError::ValidationError(format!(
                "max_buckets must be at least 3, got {}",
                config.query.max_buckets
            )));
        }

        config.histogram.schema()?;
        config.grouping.build()?;

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &TracemapConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tracemap").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform-specific directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
