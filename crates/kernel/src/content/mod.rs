//! Content resources.
//!
//! This module provides:
//! - Entity descriptors for every content table
//! - Catalog: slug to entity binding with query hints and access policy
//! - ResourceInput: write payload validation
//! - ResourceService: CRUD over a store with attachment handling
//! - Schema check against the live database

pub mod catalog;
pub mod entities;
mod input;
pub mod schema;
mod service;

pub use catalog::{Access, Catalog, RESOURCES, Resource, ResourceDefinition};
pub use input::{FieldError, ResourceInput, WriteMode};
pub use service::{Deleted, ResourceError, ResourceService};
