//! Application configuration loaded from environment variables.

use std::time::Duration;

use importer::ImportSettings;
use stage::DEFAULT_OBJECT_LIFETIME_SECS;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `text` or `json` (default: `text`)
/// - `PUBLIC_BASE_URL` base of issued upload URLs (default: `"http://localhost:3000"`)
/// - `STAGE_BUCKET` upload bucket name (default: `"invoices"`)
/// - `UPLOAD_EXPIRES_SECS` upload credential lifetime (default: `300`)
/// - `TRANSACTION_TTL_SECS` transaction record lifetime (default: `120`)
/// - `SWEEP_INTERVAL_SECS` expiry sweep period (default: `5`)
/// - `STAGE_OBJECT_LIFETIME_SECS` how long staged objects are kept (default: `86400`)
/// - `DATABASE_URL` PostgreSQL connection string; in-memory stores when unset
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub public_base_url: String,
    pub stage_bucket: String,
    pub upload_expires_secs: u32,
    pub transaction_ttl_secs: u32,
    pub sweep_interval_secs: u64,
    pub stage_object_lifetime_secs: i64,
    pub database_url: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            public_base_url: std::env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            stage_bucket: std::env::var("STAGE_BUCKET").unwrap_or(defaults.stage_bucket),
            upload_expires_secs: env_or("UPLOAD_EXPIRES_SECS", defaults.upload_expires_secs),
            transaction_ttl_secs: env_or("TRANSACTION_TTL_SECS", defaults.transaction_ttl_secs),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            stage_object_lifetime_secs: env_or(
                "STAGE_OBJECT_LIFETIME_SECS",
                defaults.stage_object_lifetime_secs,
            ),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public address of the WebSocket endpoint.
    pub fn ws_endpoint(&self) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            upload_expires_secs: self.upload_expires_secs,
            transaction_ttl_secs: self.transaction_ttl_secs,
            endpoint: self.ws_endpoint(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            public_base_url: "http://localhost:3000".to_string(),
            stage_bucket: "invoices".to_string(),
            upload_expires_secs: 300,
            transaction_ttl_secs: 120,
            sweep_interval_secs: 5,
            stage_object_lifetime_secs: DEFAULT_OBJECT_LIFETIME_SECS,
            database_url: None,
        }
    }
}
