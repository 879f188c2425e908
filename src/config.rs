//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides, and turns
//! the result into an explicit [`Store`] and [`Evaluator`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::ApiConfig;
use crate::query::{Evaluator, FunctionRegistry, TimeRangeResolver};
use crate::store::{CsvFinder, Finder, LeafConflictPolicy, RemoteFinder, Store, StoreConfig};

const ENV_PREFIX: &str = "GRAPHITE_RENDER_";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Timezone for requests that name none
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub finders: Vec<FinderConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Store tuning
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_finder_timeout")]
    pub finder_timeout_ms: u64,

    #[serde(default = "default_step")]
    pub default_step: i64,

    #[serde(default)]
    pub leaf_conflict: LeafConflictPolicy,
}

fn default_finder_timeout() -> u64 {
    10_000
}

fn default_step() -> i64 {
    60
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            finder_timeout_ms: default_finder_timeout(),
            default_step: default_step(),
            leaf_conflict: LeafConflictPolicy::default(),
        }
    }
}

impl StoreSection {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            finder_timeout: Duration::from_millis(self.finder_timeout_ms),
            default_step: self.default_step,
            leaf_conflict: self.leaf_conflict,
        }
    }
}

/// One `[[finders]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FinderConfig {
    /// Directory tree of `<path>.csv` files
    Csv {
        directory: PathBuf,
        #[serde(default = "default_step")]
        step: i64,
    },
    /// Another render API
    Remote {
        url: String,
        #[serde(default = "default_remote_timeout")]
        timeout_ms: u64,
    },
}

fn default_remote_timeout() -> u64 {
    5_000
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            api: ApiConfig::default(),
            store: StoreSection::default(),
            finders: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `$GRAPHITE_RENDER_CONFIG` or the default locations
    ///
    /// An explicitly named file must load; the default locations are tried
    /// in turn and skipped when unreadable.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(format!("{}CONFIG", ENV_PREFIX)) {
            return Self::load_with_env(Path::new(&path));
        }

        let config_paths = [
            dirs::config_dir().map(|p| p.join("graphite-render").join("config.toml")),
            Some(PathBuf::from("/etc/graphite-render/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Ok(Self::from_env())
    }

    /// Apply `GRAPHITE_RENDER_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// Apply overrides from `lookup`, keyed without the prefix
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(p) => self.api.port = p,
                Err(_) => tracing::warn!(port = %port, "ignoring invalid port override"),
            }
        }
        if let Some(tz) = lookup("TIME_ZONE") {
            self.time_zone = tz;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(dir) = lookup("CSV_DIR") {
            self.finders.push(FinderConfig::Csv {
                directory: PathBuf::from(dir),
                step: default_step(),
            });
        }
    }

    /// Timezone resolver for requests
    pub fn resolver(&self) -> Result<TimeRangeResolver, ConfigError> {
        TimeRangeResolver::from_name(&self.time_zone)
            .map_err(|_| ConfigError::Invalid(format!("unknown time_zone '{}'", self.time_zone)))
    }

    /// Instantiate the configured finders, in configuration order
    pub fn build_finders(&self) -> Result<Vec<Arc<dyn Finder>>, ConfigError> {
        self.finders
            .iter()
            .map(|finder| -> Result<Arc<dyn Finder>, ConfigError> {
                match finder {
                    FinderConfig::Csv { directory, step } => {
                        if *step <= 0 {
                            return Err(ConfigError::Invalid(format!(
                                "csv finder {:?}: step must be positive",
                                directory
                            )));
                        }
                        Ok(Arc::new(CsvFinder::new(directory.clone(), *step)))
                    }
                    FinderConfig::Remote { url, timeout_ms } => {
                        let remote = RemoteFinder::new(url.clone(), Duration::from_millis(*timeout_ms))
                            .map_err(|e| ConfigError::Invalid(format!("remote finder {}: {}", url, e)))?;
                        Ok(Arc::new(remote))
                    }
                }
            })
            .collect()
    }

    /// Build the store over the configured finders
    pub fn build_store(&self) -> Result<Store, ConfigError> {
        let finders = self.build_finders()?;
        if finders.is_empty() {
            tracing::warn!("no finders configured, only generator targets will have data");
        }
        Ok(Store::new(finders, self.store.store_config()))
    }

    /// Build the evaluator with the builtin function library
    pub fn build_evaluator(&self) -> Result<Evaluator, ConfigError> {
        let store = Arc::new(self.build_store()?);
        Ok(Evaluator::new(store, Arc::new(FunctionRegistry::with_builtins()))
            .with_timeout(Duration::from_millis(self.api.request_timeout_ms)))
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "graphite_render={level},tower_http={level}",
            level = config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# graphite-render configuration
#
# Environment variables override these settings:
# - GRAPHITE_RENDER_CONFIG      (path of this file)
# - GRAPHITE_RENDER_HOST
# - GRAPHITE_RENDER_PORT
# - GRAPHITE_RENDER_TIME_ZONE
# - GRAPHITE_RENDER_LOG_LEVEL
# - GRAPHITE_RENDER_LOG_FORMAT
# - GRAPHITE_RENDER_CSV_DIR     (adds a csv finder)

# Timezone for requests without a tz parameter
time_zone = "UTC"

[api]
host = "0.0.0.0"
port = 8888

# Deadline for evaluating one render request (ms)
request_timeout_ms = 30000

# Allowed CORS origins, "*" for any
allowed_origins = []

[store]
# Upper bound on a single finder call (ms)
finder_timeout_ms = 10000

# Step of the empty series returned when no finder has data (seconds)
default_step = 60

# When finders disagree on leaf vs branch: first_registered | prefer_leaf
leaf_conflict = "first_registered"

# Finders are consulted in the order listed
# [[finders]]
# type = "csv"
# directory = "/var/lib/graphite-render/csv"
# step = 60

# [[finders]]
# type = "remote"
# url = "http://graphite.example.com"
# timeout_ms = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
