//! HTTP middleware components.
//!
//! Provides bearer authentication and rate limiting layers.

pub mod bearer_auth;
pub mod rate_limit;

pub use bearer_auth::{CurrentUser, authenticate_bearer_token};
pub use rate_limit::{
    RateCategory, RateLimitConfig, RateLimiter, categorize, enforce_rate_limit, get_client_id,
    rate_limit_response,
};
