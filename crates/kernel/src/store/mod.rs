//! Record stores.
//!
//! A [`ResourceStore`] is a [`QueryableSource`] of JSON rows that also
//! supports single-row reads and writes. [`PgStore`] backs production;
//! [`MemoryStore`] backs tests and local development.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::{EntityDescriptor, QueryableSource, RelationView};

/// A stored row as a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// Column maintained on every write when the entity has it.
pub const UPDATED_AT: &str = "updated_at";

/// Column set once on insert when the entity has it.
pub const CREATED_AT: &str = "created_at";

/// Failure talking to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query timed out")]
    Timeout,

    #[error("unique constraint violated")]
    Conflict { constraint: Option<String> },

    #[error("referenced record does not exist")]
    InvalidReference { constraint: Option<String> },

    #[error("failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to build statement: {0}")]
    Statement(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().map(str::to_string);
            match db.code().as_deref() {
                Some("23505") => return Self::Conflict { constraint },
                Some("23503") => return Self::InvalidReference { constraint },
                Some("57014") => return Self::Timeout,
                _ => {}
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// A typed value written to one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    TextList(Vec<String>),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Boolean(b) => Value::Bool(*b),
            Self::TextList(items) => Value::from(items.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether a stored JSON value equals this one. `Null` matches nothing.
    pub fn matches_json(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Null, _) | (_, None) => false,
            (_, Some(v)) => self.to_json() == *v,
        }
    }
}

/// Column assignments for an insert or update, in column order.
pub type Assignments = [(&'static str, FieldValue)];

/// Single-row reads and writes on top of paged queries.
#[async_trait]
pub trait ResourceStore: QueryableSource<Row = Value> {
    /// Short name of the backend, for health output and logs.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    /// One row by primary key with `relations` attached.
    async fn find_by_key(
        &self,
        entity: &'static EntityDescriptor,
        relations: &[RelationView],
        key: i64,
    ) -> Result<Option<Value>, StoreError>;

    /// Whether any row other than `exclude_key` has `field = value`.
    async fn exists_with(
        &self,
        entity: &'static EntityDescriptor,
        field: &'static str,
        value: &FieldValue,
        exclude_key: Option<i64>,
    ) -> Result<bool, StoreError>;

    /// Insert one row and return it as stored.
    async fn insert(
        &self,
        entity: &'static EntityDescriptor,
        values: &Assignments,
    ) -> Result<Value, StoreError>;

    /// Update one row; `None` when no row has `key`.
    async fn update(
        &self,
        entity: &'static EntityDescriptor,
        key: i64,
        values: &Assignments,
    ) -> Result<Option<Value>, StoreError>;

    /// Delete one row; `false` when no row has `key`.
    async fn delete(&self, entity: &'static EntityDescriptor, key: i64)
    -> Result<bool, StoreError>;
}
