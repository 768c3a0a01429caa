use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds a computed snapshot is served without revalidation
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Schedule the first aggregation cycle as soon as the service starts
    #[serde(default = "default_warm_on_start")]
    pub warm_on_start: bool,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_warm_on_start() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            warm_on_start: default_warm_on_start(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Upper bound for a single metric source read, in milliseconds
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    /// Number of most recent attendance rows the attendance rate is computed over
    #[serde(default = "default_attendance_sample_size")]
    pub attendance_sample_size: u32,
}

fn default_source_timeout_ms() -> u64 {
    5000
}

fn default_attendance_sample_size() -> u32 {
    500
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout_ms(),
            attendance_sample_size: default_attendance_sample_size(),
        }
    }
}

impl AggregatorConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files (disabled when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_with_env(config_dir.as_ref(), None)
    }

    /// `vars` replaces the process environment when set
    fn load_with_env(
        config_dir: &Path,
        vars: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let env_name = match &vars {
            Some(vars) => vars.get("ACADEMY_ENV").cloned(),
            None => std::env::var("ACADEMY_ENV").ok(),
        }
        .unwrap_or_else(|| "development".to_string());

        let builder = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 5)?
            .set_default("cache.ttl_secs", 60)?
            .set_default("cache.warm_on_start", true)?
            .set_default("aggregator.source_timeout_ms", 5000)?
            .set_default("aggregator.attendance_sample_size", 500)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("api.port", 8080)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(env_name)).required(false),
            )
            // Override with environment variables (ACADEMY_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("ACADEMY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local runs against a developer database
    pub fn default_config(database_url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: default_max_connections(),
            },
            cache: CacheConfig::default(),
            aggregator: AggregatorConfig::default(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.trim().is_empty() {
            errors.push("database.url must be set".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        if self.cache.ttl_secs == 0 {
            errors.push("cache.ttl_secs must be positive".to_string());
        }

        if self.aggregator.source_timeout_ms == 0 {
            errors.push("aggregator.source_timeout_ms must be positive".to_string());
        }

        if self.aggregator.attendance_sample_size == 0 {
            errors.push("aggregator.attendance_sample_size must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
