use thiserror::Error;

use crate::store::StoreError;

/// A code-authored descriptor or query spec names something that does not
/// exist. Raised while the catalog is built, so the process refuses to start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("entity '{entity}' has no column '{field}'")]
    UnknownField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("primary key '{entity}.{field}' must be an integer column")]
    InvalidPrimaryKey {
        entity: &'static str,
        field: &'static str,
    },

    #[error("column '{entity}.{field}' cannot be searched: it is not text")]
    NotSearchable {
        entity: &'static str,
        field: &'static str,
    },

    #[error("column '{entity}.{field}' cannot be a filter: it is not a scalar")]
    NotFilterable {
        entity: &'static str,
        field: &'static str,
    },

    #[error("entity '{entity}' has no relation '{relation}'")]
    UnknownRelation {
        entity: &'static str,
        relation: &'static str,
    },

    #[error("relation '{relation}' is listed more than once on '{entity}'")]
    DuplicateRelation {
        entity: &'static str,
        relation: &'static str,
    },

    #[error("relation '{relation}' on '{entity}' has the same name as a column")]
    RelationShadowsColumn {
        entity: &'static str,
        relation: &'static str,
    },

    #[error("relation '{relation}' (target '{target}') has no field '{field}'")]
    UnknownRelationField {
        relation: &'static str,
        target: &'static str,
        field: &'static str,
    },

    #[error("projection given for relation '{relation}' which is not loaded")]
    ProjectionWithoutRelation { relation: &'static str },

    #[error("projection for relation '{relation}' selects no fields")]
    EmptyProjection { relation: &'static str },

    #[error("resource slug '{slug}' is defined more than once")]
    DuplicateResource { slug: &'static str },
}

/// Failure while answering a list request.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown filter '{field}'")]
    UnknownFilter {
        field: String,
        allowed: Vec<&'static str>,
    },

    #[error("invalid value '{value}' for filter '{field}': expected {expected}")]
    InvalidFilterValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
