//! Showcase content backend.
//!
//! HTTP server and operator commands.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use showcase_kernel::cli::{self, Cli, Command};
use showcase_kernel::config::Config;
use showcase_kernel::routes;
use showcase_kernel::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing();
            serve().await
        }
        Command::CheckSchema => {
            init_tracing();
            let config = Config::from_env().context("failed to load configuration")?;
            cli::cmd_check_schema(&config).await
        }
        Command::IssueToken { user_id, ttl_hours } => {
            // Only the signing secret is needed here.
            let secret = std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
            cli::cmd_issue_token(&secret, user_id, ttl_hours)
        }
    }
}

async fn serve() -> Result<()> {
    info!("Starting showcase backend");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(port = config.port, "Configuration loaded");

    let state = AppState::connect(&config)
        .await
        .context("failed to initialize application state")?;

    info!(
        resources = state.catalog().len(),
        rate_limiter = state.rate_limiter().backend_name(),
        "Services initialized"
    );

    // Timeout and CORS wrap everything, including the trace layer
    let app = routes::app(state, Some(&config.uploads_dir))
        .layer(build_cors_layer(&config))
        .layer(TimeoutLayer::new(config.request_timeout));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
