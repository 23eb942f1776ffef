//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use tracing::info;

use crate::auth::TokenService;
use crate::config::Config;
use crate::content::{Catalog, ResourceService};
use crate::db;
use crate::file::{AttachmentService, LocalFileStorage};
use crate::middleware::{RateLimitConfig, RateLimiter};
use crate::query::DataQueryEngine;
use crate::store::{PgStore, ResourceStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Catalog,
    resources: ResourceService,
    tokens: TokenService,
    rate_limiter: RateLimiter,
    files_url: String,
}

impl AppState {
    /// Connect to PostgreSQL (and Redis when configured) and build services.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        let store: Arc<dyn ResourceStore> =
            Arc::new(PgStore::new(pool, config.query_statement_timeout));

        let rate_limiter = match &config.redis_url {
            Some(url) => {
                let client = RedisClient::open(url.as_str()).context("invalid REDIS_URL")?;
                info!("rate limits shared through Redis");
                RateLimiter::redis(client, RateLimitConfig::default())
            }
            None => {
                info!("REDIS_URL not set, rate limits are per process");
                RateLimiter::local(RateLimitConfig::default())
            }
        };

        tokio::fs::create_dir_all(&config.uploads_dir)
            .await
            .with_context(|| format!("failed to create {}", config.uploads_dir.display()))?;
        let attachments = AttachmentService::new(Arc::new(LocalFileStorage::new(
            &config.uploads_dir,
            &config.files_url,
        )));

        let tokens = TokenService::new(config.jwt_secret.as_bytes())?;
        let catalog = Catalog::standard().context("invalid resource catalog")?;

        Ok(Self::new(
            catalog,
            ResourceService::new(store, DataQueryEngine::new(config.page_limits), attachments),
            tokens,
            rate_limiter,
            config.files_url.clone(),
        ))
    }

    /// Assemble state from parts; used directly by tests.
    pub fn new(
        catalog: Catalog,
        resources: ResourceService,
        tokens: TokenService,
        rate_limiter: RateLimiter,
        files_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                catalog,
                resources,
                tokens,
                rate_limiter,
                files_url: files_url.into(),
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn resources(&self) -> &ResourceService {
        &self.inner.resources
    }

    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    /// URL prefix uploaded files are served under.
    pub fn files_url(&self) -> &str {
        &self.inner.files_url
    }

    /// Check if the record store is reachable.
    pub async fn store_healthy(&self) -> bool {
        self.inner.resources.store().ping().await.is_ok()
    }

    /// Check if the rate limit backend is reachable.
    pub async fn rate_limiter_healthy(&self) -> bool {
        self.inner.rate_limiter.healthy().await
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("resources", &self.inner.catalog.len())
            .field("store", &self.inner.resources.store().backend())
            .field("rate_limiter", &self.inner.rate_limiter.backend_name())
            .finish()
    }
}
