#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] wires the REAL kernel router, middleware and services over an
//! in-memory record store, a temporary upload directory and the per-process
//! rate limiter, so HTTP tests need neither PostgreSQL nor Redis.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use showcase_kernel::auth::TokenService;
use showcase_kernel::content::Catalog;
use showcase_kernel::file::{AttachmentService, LocalFileStorage};
use showcase_kernel::middleware::{RateLimitConfig, RateLimiter};
use showcase_kernel::query::{DataQueryEngine, EntityDescriptor};
use showcase_kernel::routes;
use showcase_kernel::state::AppState;
use showcase_kernel::store::MemoryStore;
use showcase_test_utils::{MultipartBody, test_ip_for};

pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const FILES_URL: &str = "/uploads";

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub uploads: TempDir,
    tokens: TokenService,
    client: String,
}

impl TestApp {
    /// Build an app with default rate limits.
    pub fn new(label: &str) -> Self {
        Self::with_rate_limits(label, RateLimitConfig::default())
    }

    /// Build an app with custom rate limits. `label` picks the client
    /// address every request is sent from.
    pub fn with_rate_limits(label: &str, limits: RateLimitConfig) -> Self {
        let uploads = tempfile::tempdir().expect("Failed to create upload dir");
        let store = Arc::new(MemoryStore::new());
        let attachments = AttachmentService::new(Arc::new(LocalFileStorage::new(
            uploads.path(),
            FILES_URL,
        )));
        let resources = showcase_kernel::content::ResourceService::new(
            store.clone(),
            DataQueryEngine::default(),
            attachments,
        );
        let tokens = TokenService::new(JWT_SECRET).expect("Failed to build token service");
        let state = AppState::new(
            Catalog::standard().expect("Catalog must be valid"),
            resources,
            TokenService::new(JWT_SECRET).expect("Failed to build token service"),
            RateLimiter::local(limits),
            FILES_URL,
        );
        let router = routes::app(state.clone(), Some(uploads.path()));

        Self {
            router,
            state,
            store,
            uploads,
            tokens,
            client: test_ip_for(label),
        }
    }

    /// Seed rows directly into the store, returning their keys.
    pub fn seed(&self, entity: &'static EntityDescriptor, rows: Vec<Value>) -> Vec<i64> {
        self.store.seed(entity, rows).expect("Failed to seed rows")
    }

    /// A valid bearer token for `user_id`.
    pub fn token(&self, user_id: i64) -> String {
        self.tokens
            .issue(user_id, Duration::from_secs(3600))
            .expect("Failed to issue token")
    }

    /// Send a request to the test application.
    pub async fn request(&self, mut request: Request<Body>) -> Response {
        if !request.headers().contains_key("x-forwarded-for") {
            request.headers_mut().insert(
                "x-forwarded-for",
                self.client.parse().expect("Invalid client address"),
            );
        }
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Anonymous GET.
    pub async fn get(&self, uri: &str) -> Response {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// GET with a bearer token.
    pub async fn get_as(&self, uri: &str, token: &str) -> Response {
        self.request(
            Request::get(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Send a JSON body, optionally authenticated.
    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Send a multipart body with a bearer token.
    pub async fn send_multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        form: MultipartBody,
    ) -> Response {
        let content_type = form.content_type();
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(form.finish()))
            .unwrap();
        self.request(request).await
    }

    /// DELETE with a bearer token.
    pub async fn delete_as(&self, uri: &str, token: &str) -> Response {
        self.request(
            Request::delete(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Number of files under the upload directory.
    pub fn stored_files(&self) -> usize {
        fn walk(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() { walk(&path) } else { 1 }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(self.uploads.path())
    }
}

/// Read a response body as JSON.
pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        panic!(
            "Response body is not JSON: {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}

/// Assert the status and return the JSON body.
pub async fn expect_json(response: Response, status: StatusCode) -> Value {
    let actual = response.status();
    let body = json_body(response).await;
    assert_eq!(actual, status, "unexpected status, body: {body}");
    body
}
