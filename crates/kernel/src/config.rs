//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::query::{DEFAULT_LIMIT, MAX_LIMIT, PageLimits};

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL. When unset, rate limits are counted in process.
    pub redis_url: Option<String>,

    /// Path to uploads directory (default: ./uploads).
    pub uploads_dir: PathBuf,

    /// Base URL for serving uploaded files (default: /files).
    pub files_url: String,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Shared secret for bearer tokens.
    pub jwt_secret: String,

    /// Page size bounds for list endpoints (defaults: 10 and 100).
    pub page_limits: PageLimits,

    /// Statement timeout for list queries (default: 10s).
    pub query_statement_timeout: Duration,

    /// Whole-request timeout (default: 30s).
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());

        let uploads_dir = env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let files_url = env::var("FILES_URL").unwrap_or_else(|_| "/files".to_string());
        anyhow::ensure!(
            files_url.starts_with('/') && files_url.len() > 1,
            "FILES_URL must be an absolute path such as /files"
        );

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let jwt_secret =
            env::var("JWT_SECRET").context("JWT_SECRET environment variable is required")?;

        let default_limit: u64 = env::var("QUERY_DEFAULT_LIMIT")
            .unwrap_or_else(|_| DEFAULT_LIMIT.to_string())
            .parse()
            .context("QUERY_DEFAULT_LIMIT must be a positive integer")?;

        let max_limit: u64 = env::var("QUERY_MAX_LIMIT")
            .unwrap_or_else(|_| MAX_LIMIT.to_string())
            .parse()
            .context("QUERY_MAX_LIMIT must be a positive integer")?;

        anyhow::ensure!(
            default_limit >= 1 && default_limit <= max_limit,
            "QUERY_DEFAULT_LIMIT must be between 1 and QUERY_MAX_LIMIT"
        );

        let query_statement_timeout = env::var("QUERY_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("QUERY_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("REQUEST_TIMEOUT_SECS must be a valid u64")?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            uploads_dir,
            files_url,
            cors_allowed_origins,
            jwt_secret,
            page_limits: PageLimits {
                default_limit,
                max_limit,
            },
            query_statement_timeout,
            request_timeout,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_max_connections", &self.database_max_connections)
            .field("redis", &self.redis_url.is_some())
            .field("uploads_dir", &self.uploads_dir)
            .field("files_url", &self.files_url)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("page_limits", &self.page_limits)
            .field("query_statement_timeout", &self.query_statement_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
