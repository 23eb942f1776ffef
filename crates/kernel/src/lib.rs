//! Showcase content backend.
//!
//! This library exposes the kernel for the `showcase` binary and for
//! integration testing: the data-query engine, record stores, the resource
//! catalog and its CRUD service, and the HTTP router.

pub mod auth;
pub mod cli;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod file;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod state;
pub mod store;
