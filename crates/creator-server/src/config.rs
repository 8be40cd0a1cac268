//! Configuration management

use serde::{Deserialize, Serialize};

use crate::ingest_runs::DispatcherConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/study_creator";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Ingest Configuration Constants
// ============================================================================

/// Number of tasks a worker executes concurrently.
pub const DEFAULT_INGEST_WORKER_CONCURRENCY: usize = 2;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub ingest: IngestConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Ingest orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Run the queue worker in this process
    pub worker_enabled: bool,
    pub worker_concurrency: usize,
    /// Cancel running duplicates when a run starts
    pub cancel_duplicates: bool,
    /// Allow the genomic workflow output pipeline to ingest files
    pub genomic_workflow_outputs: bool,
}

impl IngestConfig {
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            cancel_duplicates: self.cancel_duplicates,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_enabled: true,
            worker_concurrency: DEFAULT_INGEST_WORKER_CONCURRENCY,
            cancel_duplicates: true,
            genomic_workflow_outputs: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = IngestConfig::default();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("CREATOR_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("CREATOR_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("CREATOR_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS").unwrap_or(true),
            },
            ingest: IngestConfig {
                worker_enabled: env_parse("INGEST_WORKER_ENABLED")
                    .unwrap_or(defaults.worker_enabled),
                worker_concurrency: env_parse("INGEST_WORKER_CONCURRENCY")
                    .unwrap_or(defaults.worker_concurrency),
                cancel_duplicates: env_parse("INGEST_CANCEL_DUPLICATES")
                    .unwrap_or(defaults.cancel_duplicates),
                genomic_workflow_outputs: env_parse("FEAT_INGEST_GENOMIC_WORKFLOW_OUTPUTS")
                    .unwrap_or(defaults.genomic_workflow_outputs),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.ingest.worker_enabled && self.ingest.worker_concurrency == 0 {
            anyhow::bail!("Ingest worker concurrency must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        if !self.ingest.cancel_duplicates {
            tracing::warn!("Duplicate ingest run cancellation is disabled");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            ingest: IngestConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const INGEST_VARS: [&str; 4] = [
        "INGEST_WORKER_ENABLED",
        "INGEST_WORKER_CONCURRENCY",
        "INGEST_CANCEL_DUPLICATES",
        "FEAT_INGEST_GENOMIC_WORKFLOW_OUTPUTS",
    ];

    fn clear_ingest_vars() {
        for var in INGEST_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.ingest.cancel_duplicates);
        assert!(!config.ingest.genomic_workflow_outputs);
    }

    #[test]
    fn test_validate_rejects_bad_pool() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.ingest.worker_concurrency = 0;
        assert!(config.validate().is_err());

        config.ingest.worker_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_reads_ingest_flags() {
        clear_ingest_vars();
        std::env::set_var("FEAT_INGEST_GENOMIC_WORKFLOW_OUTPUTS", "true");
        std::env::set_var("INGEST_CANCEL_DUPLICATES", "false");
        std::env::set_var("INGEST_WORKER_CONCURRENCY", "4");

        let config = Config::load().unwrap();
        clear_ingest_vars();

        assert!(config.ingest.genomic_workflow_outputs);
        assert!(!config.ingest.cancel_duplicates);
        assert_eq!(config.ingest.worker_concurrency, 4);
        assert!(!config.ingest.dispatcher().cancel_duplicates);
    }

    #[test]
    #[serial]
    fn test_load_ignores_unparseable_flags() {
        clear_ingest_vars();
        std::env::set_var("INGEST_WORKER_ENABLED", "maybe");

        let config = Config::load().unwrap();
        clear_ingest_vars();

        assert!(config.ingest.worker_enabled);
    }
}
