//! Rate limiting middleware.
//!
//! Counts requests per client and category in fixed windows. With Redis the
//! counters are shared between instances (atomic INCR + EXPIRE); without it
//! each process keeps its own counters.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use redis::Client as RedisClient;
use tracing::{debug, warn};

use crate::state::AppState;

/// Local counters are pruned of expired windows past this many keys.
const LOCAL_PRUNE_THRESHOLD: usize = 10_000;

/// Endpoint categories with separate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCategory {
    Reads,
    Messages,
    Writes,
}

impl RateCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reads => "reads",
            Self::Messages => "messages",
            Self::Writes => "writes",
        }
    }
}

/// Rate limit configuration: (max requests, window duration) per category.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub reads: (u32, Duration),
    /// Public contact form submissions
    pub messages: (u32, Duration),
    /// Creates, updates and deletes
    pub writes: (u32, Duration),
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            reads: (100, Duration::from_secs(60)),   // 100 per minute
            messages: (5, Duration::from_secs(60)),  // 5 per minute
            writes: (20, Duration::from_secs(180)),  // 20 per 3 minutes
        }
    }
}

impl RateLimitConfig {
    fn limit(&self, category: RateCategory) -> (u32, Duration) {
        match category {
            RateCategory::Reads => self.reads,
            RateCategory::Messages => self.messages,
            RateCategory::Writes => self.writes,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

enum Backend {
    Redis(RedisClient),
    Local(DashMap<String, Window>),
}

/// Per-client request limiter.
pub struct RateLimiter {
    backend: Backend,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Limiter sharing counters through Redis.
    pub fn redis(redis: RedisClient, config: RateLimitConfig) -> Self {
        Self {
            backend: Backend::Redis(redis),
            config,
        }
    }

    /// Limiter counting in this process only.
    pub fn local(config: RateLimitConfig) -> Self {
        Self {
            backend: Backend::Local(DashMap::new()),
            config,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Local(_) => "local",
        }
    }

    /// Check if a request should be rate limited.
    ///
    /// Returns Ok(()) if allowed, Err with retry-after seconds if limited.
    pub async fn check(&self, category: RateCategory, identifier: &str) -> Result<(), u64> {
        let (limit, window) = self.config.limit(category);
        let key = format!("rate:{}:{identifier}", category.as_str());

        let (count, retry_after) = match &self.backend {
            Backend::Redis(client) => match increment(client, &key, window.as_secs()).await {
                Ok(count) => (count, window.as_secs()),
                Err(e) => {
                    // If Redis fails, allow the request (fail open)
                    warn!(error = %e, "rate limit check failed, allowing request");
                    return Ok(());
                }
            },
            Backend::Local(windows) => local_increment(windows, key, window),
        };

        if count > i64::from(limit) {
            debug!(
                category = category.as_str(),
                identifier = identifier,
                count = count,
                limit = limit,
                "rate limit exceeded"
            );
            Err(retry_after.max(1))
        } else {
            Ok(())
        }
    }

    /// Whether the counter backend answers.
    pub async fn healthy(&self) -> bool {
        match &self.backend {
            Backend::Redis(client) => {
                let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
                    return false;
                };
                redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .is_ok()
            }
            Backend::Local(_) => true,
        }
    }
}

/// Increment the counter and return the new value.
///
/// Uses a Lua script to atomically INCR + EXPIRE, preventing a race
/// where a crash between the two commands creates an immortal counter.
async fn increment(
    client: &RedisClient,
    key: &str,
    ttl_secs: u64,
) -> Result<i64, redis::RedisError> {
    let mut conn = client.get_multiplexed_async_connection().await?;

    let script = redis::Script::new(
        r"local count = redis.call('INCR', KEYS[1])
          if count == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
          end
          return count",
    );

    script
        .key(key)
        .arg(ttl_secs as i64)
        .invoke_async(&mut conn)
        .await
}

/// Count one request in the local window for `key`. Returns the count and
/// the seconds until the window resets.
fn local_increment(windows: &DashMap<String, Window>, key: String, window: Duration) -> (i64, u64) {
    let now = Instant::now();
    if windows.len() > LOCAL_PRUNE_THRESHOLD {
        windows.retain(|_, w| w.resets_at > now);
    }

    let mut entry = windows.entry(key).or_insert(Window {
        count: 0,
        resets_at: now + window,
    });
    if entry.resets_at <= now {
        *entry = Window {
            count: 0,
            resets_at: now + window,
        };
    }
    entry.count = entry.count.saturating_add(1);

    let remaining = entry.resets_at.saturating_duration_since(now);
    (i64::from(entry.count), remaining.as_secs().max(1))
}

/// Categorize a request for rate limiting. `None` means unlimited.
pub fn categorize(method: &Method, path: &str) -> Option<RateCategory> {
    if !path.starts_with("/api/") {
        return None;
    }
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        Some(RateCategory::Reads)
    } else if method == Method::POST && path.trim_end_matches('/') == "/api/send-messages" {
        Some(RateCategory::Messages)
    } else {
        Some(RateCategory::Writes)
    }
}

/// Get the client identifier (IP address) for rate limiting.
pub fn get_client_id(addr: Option<SocketAddr>, headers: &axum::http::HeaderMap) -> String {
    // Check X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next()
        && !ip.trim().is_empty()
    {
        return ip.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limit exceeded response.
pub fn rate_limit_response(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("retry-after", retry_after.to_string()),
            ("content-type", "application/json".to_string()),
        ],
        format!(r#"{{"error":"Rate limit exceeded","retry_after":{retry_after}}}"#),
    )
        .into_response()
}

/// Middleware applying [`RateLimiter::check`] to every API request.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(category) = categorize(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };

    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = get_client_id(addr, request.headers());

    match state.rate_limiter().check(category, &client).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => rate_limit_response(retry_after),
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_categorize() {
        assert_eq!(categorize(&Method::GET, "/api/articles"), Some(RateCategory::Reads));
        assert_eq!(
            categorize(&Method::POST, "/api/send-messages"),
            Some(RateCategory::Messages)
        );
        assert_eq!(
            categorize(&Method::DELETE, "/api/send-messages/4"),
            Some(RateCategory::Writes)
        );
        assert_eq!(categorize(&Method::PATCH, "/api/skills/1"), Some(RateCategory::Writes));
        assert_eq!(categorize(&Method::GET, "/health"), None);
        assert_eq!(categorize(&Method::GET, "/files/2026/01/a.png"), None);
    }

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.writes, (20, Duration::from_secs(180)));
        assert_eq!(config.messages.0, 5);
        assert_eq!(config.reads.0, 100);
    }

    #[test]
    fn test_client_id_precedence() {
        let addr: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(get_client_id(Some(addr), &headers), "10.0.0.9");
        assert_eq!(get_client_id(None, &headers), "unknown");

        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(get_client_id(Some(addr), &headers), "198.51.100.2");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(get_client_id(Some(addr), &headers), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_local_limit_per_client_and_category() {
        let limiter = RateLimiter::local(RateLimitConfig {
            messages: (2, Duration::from_secs(60)),
            ..RateLimitConfig::default()
        });

        assert!(limiter.check(RateCategory::Messages, "a").await.is_ok());
        assert!(limiter.check(RateCategory::Messages, "a").await.is_ok());
        let retry = limiter.check(RateCategory::Messages, "a").await.unwrap_err();
        assert!((1..=60).contains(&retry));

        assert!(limiter.check(RateCategory::Messages, "b").await.is_ok());
        assert!(limiter.check(RateCategory::Reads, "a").await.is_ok());
        assert!(limiter.healthy().await);
    }

    #[tokio::test]
    async fn test_local_window_resets() {
        let limiter = RateLimiter::local(RateLimitConfig {
            writes: (1, Duration::from_millis(20)),
            ..RateLimitConfig::default()
        });
        assert!(limiter.check(RateCategory::Writes, "a").await.is_ok());
        assert!(limiter.check(RateCategory::Writes, "a").await.is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check(RateCategory::Writes, "a").await.is_ok());
    }

    #[test]
    fn test_rate_limit_response() {
        let response = rate_limit_response(30);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "30");
    }
}
