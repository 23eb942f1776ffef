//! Operator commands.
//!
//! These run with a minimal context (configuration and, where needed, the
//! database pool) without starting the HTTP server.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::auth::TokenService;
use crate::config::Config;
use crate::content::{Catalog, schema};
use crate::db;

#[derive(Debug, Parser)]
#[command(name = "showcase", version, about = "Showcase content backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Compare the resource catalog with the live database schema.
    CheckSchema,
    /// Print a bearer token for an editor account.
    IssueToken {
        /// Numeric id of the editor.
        #[arg(long)]
        user_id: i64,
        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24)]
        ttl_hours: u64,
    },
}

/// Check every catalog table against `information_schema`. Fails when any
/// table or column is missing or mistyped.
pub async fn cmd_check_schema(config: &Config) -> Result<()> {
    let catalog = Catalog::standard().context("invalid resource catalog")?;
    let pool = db::create_pool(config).await?;
    let entities = catalog.entities();

    let mismatches = schema::check_schema(&pool, &entities)
        .await
        .context("failed to read information_schema")?;

    if mismatches.is_empty() {
        println!("{} tables match the catalog.", entities.len());
        return Ok(());
    }

    for mismatch in &mismatches {
        println!("  {mismatch}");
    }
    bail!("{} schema mismatches found", mismatches.len());
}

/// Issue a token signed with the configured secret.
pub fn cmd_issue_token(jwt_secret: &str, user_id: i64, ttl_hours: u64) -> Result<()> {
    if ttl_hours == 0 {
        bail!("--ttl-hours must be at least 1");
    }
    let tokens = TokenService::new(jwt_secret.as_bytes())?;
    let ttl = Duration::from_secs(ttl_hours.saturating_mul(3600));
    let token = tokens.issue(user_id, ttl)?;
    println!("{token}");
    Ok(())
}
