//! Configuration management for papersift
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! with a handful of environment overrides for deployment.

mod defaults;

pub use defaults::*;

use crate::embed::EmbeddingSql;
use crate::error::{Error, Result};
use crate::resilience::ResilienceOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable overriding `database.url`
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable overriding `catalog.base_url`
pub const ENV_CATALOG_URL: &str = "PAPERSIFT_CATALOG_URL";
/// Environment variable overriding `ai.provider`
pub const ENV_AI_PROVIDER: &str = "PAPERSIFT_AI_PROVIDER";
/// Environment variable overriding `ai.embedding_model`
pub const ENV_EMBEDDING_MODEL: &str = "PAPERSIFT_EMBEDDING_MODEL";
/// Environment variable overriding `ai.dimensions`
pub const ENV_EMBEDDING_DIMENSIONS: &str = "PAPERSIFT_EMBEDDING_DIMENSIONS";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// In-database embedding settings
    #[serde(default)]
    pub ai: AiConfig,

    /// arXiv API client settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Retry and circuit breaker settings for store calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (postgres://...)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_database_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection
    #[serde(default = "default_database_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

/// Embedding provider configuration.
///
/// Provider and model have no defaults: both must be configured, either in
/// the file or through the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    /// Embedding provider (`ollama` or `openai`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name passed to the provider's embedding function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Vector dimensionality; unset or non-positive means 1536
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<i64>,
}

impl AiConfig {
    /// Resolve the effective embedding dimensionality
    pub fn resolved_dimensions(&self) -> usize {
        match self.dimensions {
            Some(d) if d > 0 => d as usize,
            Some(d) => {
                warn!(
                    "Embedding dimensions {} is not positive; using {}",
                    d,
                    default_embedding_dimensions()
                );
                default_embedding_dimensions()
            }
            None => default_embedding_dimensions(),
        }
    }
}

/// Catalog client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the export API; `query` is resolved against it
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Entries requested per page
    #[serde(default = "default_catalog_page_size")]
    pub page_size: usize,

    /// Pause between pages in milliseconds
    #[serde(default = "default_catalog_page_delay")]
    pub page_delay_ms: u64,

    /// User agent string
    #[serde(default = "default_catalog_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

impl CatalogConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results returned when the request does not say
    #[serde(default = "default_search_top_k")]
    pub default_top_k: usize,

    /// Requests above this are clamped
    #[serde(default = "default_search_max_top_k")]
    pub max_top_k: usize,
}

/// Resilience configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Attempts per call, including the first
    #[serde(default = "default_resilience_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_resilience_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_resilience_max_delay")]
    pub max_delay_ms: u64,

    /// Randomize backoff delays
    #[serde(default = "default_resilience_jitter")]
    pub jitter: bool,

    /// Timeout for a single attempt in seconds
    #[serde(default = "default_resilience_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Timeout across all attempts in seconds
    #[serde(default = "default_resilience_total_timeout")]
    pub total_timeout_secs: u64,

    /// Failure ratio (0.0 - 1.0) that opens the circuit
    #[serde(default = "default_resilience_failure_ratio")]
    pub failure_ratio: f64,

    /// Calls needed in a sampling window before the circuit may open
    #[serde(default = "default_resilience_minimum_throughput")]
    pub minimum_throughput: u32,

    /// Sampling window in seconds
    #[serde(default = "default_resilience_sampling_duration")]
    pub sampling_duration_secs: u64,

    /// How long the circuit stays open in seconds
    #[serde(default = "default_resilience_break_duration")]
    pub break_duration_secs: u64,

    /// Run each ingestion transaction under the policy as well
    #[serde(default = "default_resilience_wrap_ingestion")]
    pub wrap_ingestion: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for papersift data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_database_max_connections(),
            acquire_timeout_secs: default_database_acquire_timeout(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            page_size: default_catalog_page_size(),
            page_delay_ms: default_catalog_page_delay(),
            user_agent: default_catalog_user_agent(),
            timeout_secs: default_catalog_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_search_top_k(),
            max_top_k: default_search_max_top_k(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_resilience_max_attempts(),
            base_delay_ms: default_resilience_base_delay(),
            max_delay_ms: default_resilience_max_delay(),
            jitter: default_resilience_jitter(),
            attempt_timeout_secs: default_resilience_attempt_timeout(),
            total_timeout_secs: default_resilience_total_timeout(),
            failure_ratio: default_resilience_failure_ratio(),
            minimum_throughput: default_resilience_minimum_throughput(),
            sampling_duration_secs: default_resilience_sampling_duration(),
            break_duration_secs: default_resilience_break_duration(),
            wrap_ingestion: default_resilience_wrap_ingestion(),
        }
    }
}

impl Config {
    /// Get the default base directory for papersift (~/.papersift)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".papersift")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Load configuration from a specific base directory, falling back to
    /// defaults when no file exists
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Apply `DATABASE_URL` and `PAPERSIFT_*` environment overrides on top
    /// of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            debug!("{} overrides database.url", ENV_DATABASE_URL);
            self.database.url = url;
        }
        if let Some(url) = lookup(ENV_CATALOG_URL) {
            debug!("{} overrides catalog.base_url", ENV_CATALOG_URL);
            self.catalog.base_url = url;
        }
        if let Some(provider) = lookup(ENV_AI_PROVIDER) {
            debug!("{} overrides ai.provider", ENV_AI_PROVIDER);
            self.ai.provider = Some(provider);
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            debug!("{} overrides ai.embedding_model", ENV_EMBEDDING_MODEL);
            self.ai.embedding_model = Some(model);
        }
        if let Some(raw) = lookup(ENV_EMBEDDING_DIMENSIONS) {
            let dims = raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!(
                    "{} must be an integer, got '{}'",
                    ENV_EMBEDDING_DIMENSIONS, raw
                ))
            })?;
            self.ai.dimensions = Some(dims);
        }
        Ok(())
    }

    /// Embedding SQL settings derived from `[ai]`; fails when provider or
    /// model is missing
    pub fn embedding_sql(&self) -> Result<EmbeddingSql> {
        EmbeddingSql::from_config(&self.ai)
    }

    /// Resilience options derived from `[resilience]`
    pub fn resilience_options(&self) -> ResilienceOptions {
        ResilienceOptions::from(&self.resilience)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.embedding_sql()?;

        if self.catalog.page_size == 0 {
            return Err(Error::Config(
                "catalog.page_size must be positive".to_string(),
            ));
        }

        if self.search.default_top_k > self.search.max_top_k {
            return Err(Error::Config(
                "search.default_top_k must be <= search.max_top_k".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }

        self.resilience_options().validate()?;

        Ok(())
    }
}
