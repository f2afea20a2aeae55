//! Configuration for Zapcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables overriding file settings,
/// e.g. `ZAPCAST__GATEWAY__API_KEY`
pub const ENV_PREFIX: &str = "ZAPCAST";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Messaging gateway defaults
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Campaign dispatch defaults
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Seconds a campaign may sit in `running` before startup recovery
    /// puts it back to `pending`
    #[serde(default = "default_stalled_after_secs")]
    pub stalled_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            stalled_after_secs: default_stalled_after_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_stalled_after_secs() -> u64 {
    6 * 60 * 60
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/zapcast".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Largest accepted request body (contact uploads), in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            body_limit_bytes: default_body_limit(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    5 * 1024 * 1024
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Messaging gateway configuration.
///
/// `url` and `api_key` are fallbacks; an instance that carries its own
/// values overrides them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Default gateway base URL
    pub url: Option<String>,

    /// Default gateway API key
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,

    /// Domain appended to recipient digits to form the gateway address
    #[serde(default = "default_recipient_suffix")]
    pub recipient_suffix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_gateway_timeout(),
            recipient_suffix: default_recipient_suffix(),
        }
    }
}

fn default_gateway_timeout() -> u64 {
    60
}

fn default_recipient_suffix() -> String {
    "@s.whatsapp.net".to_string()
}

/// Campaign dispatch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Country code prepended to national-format numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Minimum pause between two messages, in seconds
    #[serde(default = "default_delay_min")]
    pub default_delay_min_secs: u32,

    /// Maximum pause between two messages, in seconds
    #[serde(default = "default_delay_max")]
    pub default_delay_max_secs: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            default_delay_min_secs: default_delay_min(),
            default_delay_max_secs: default_delay_max(),
        }
    }
}

fn default_country_code() -> String {
    crate::phone::DEFAULT_COUNTRY_CODE.to_string()
}

fn default_delay_min() -> u32 {
    5
}

fn default_delay_max() -> u32 {
    15
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the first file found in the default
    /// locations, overlaid with `ZAPCAST__*` environment variables.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./zapcast.toml"),
            PathBuf::from("./config/zapcast.toml"),
            PathBuf::from("/etc/zapcast/zapcast.toml"),
        ];

        let file = paths.into_iter().find(|p| p.exists());
        Self::load_layered(file.as_deref())
    }

    /// Load an optional file plus environment overrides
    pub fn load_layered(file: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            tracing::debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.gateway.timeout_secs, 60);
        assert_eq!(config.gateway.recipient_suffix, "@s.whatsapp.net");
        assert_eq!(config.dispatch.default_country_code, "55");
        assert_eq!(config.dispatch.default_delay_min_secs, 5);
        assert_eq!(config.dispatch.default_delay_max_secs, 15);
        assert!(config.gateway.url.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://db/zapcast"
max_connections = 4

[logging]
format = "text"

[gateway]
url = "https://evolution.example.com"
api_key = "secret"
timeout_secs = 15

[dispatch]
default_delay_min_secs = 2
default_delay_max_secs = 4
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.database.url, "postgres://db/zapcast");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.min_connections, 2);
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.gateway.url.as_deref(),
            Some("https://evolution.example.com")
        );
        assert_eq!(config.gateway.timeout_secs, 15);
        assert_eq!(config.gateway.recipient_suffix, "@s.whatsapp.net");
        assert_eq!(config.dispatch.default_delay_min_secs, 2);
        assert_eq!(config.dispatch.default_country_code, "55");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[api]\nport = \"eighty\"").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_layered_without_file_uses_defaults() {
        let config = Config::load_layered(None).unwrap();
        assert_eq!(config.api.body_limit_bytes, 5 * 1024 * 1024);
    }
}
