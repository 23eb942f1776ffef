//! Generic data-query engine.
//!
//! Every list endpoint funnels through [`DataQueryEngine::execute`]: a
//! client [`QueryRequest`] (page, limit, search term, filters) and a
//! code-authored [`QuerySpec`] (searchable fields, relations, projections)
//! become one bounded query against a [`QueryableSource`], answered with a
//! [`PaginatedResult`] envelope.
//!
//! The engine is stateless. SQL is generated by [`DataQueryBuilder`] with
//! SeaQuery; the in-memory store evaluates the same [`Predicate`] tree
//! directly.

mod engine;
mod entity;
mod error;
mod predicate;
mod query_builder;
mod request;
mod source;
mod spec;
mod types;

pub use engine::DataQueryEngine;
pub use entity::{Column, ColumnType, EntityDescriptor, OrderBy, Relation, SortDirection};
pub use error::{QueryError, SpecError};
pub use predicate::{Predicate, Scalar};
pub use query_builder::{DataQueryBuilder, escape_like_wildcards};
pub use request::{LIMIT_PARAM, PAGE_PARAM, SEARCH_PARAM};
pub use source::{FindRequest, QueryableSource};
pub use spec::{QuerySpec, QuerySpecBuilder, RelationView};
pub use types::{
    DEFAULT_LIMIT, FilterValue, MAX_LIMIT, PageLimits, PaginatedResult, Pagination, QueryRequest,
};
