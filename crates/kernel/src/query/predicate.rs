//! The combined search + filter condition.
//!
//! A [`Predicate`] is a small closed operator tree built once per request.
//! The PostgreSQL source renders it with SeaQuery; the in-memory source
//! evaluates it directly with [`Predicate::matches`].

use serde_json::{Map, Value};
use tracing::debug;

use super::entity::{Column, ColumnType};
use super::error::QueryError;
use super::spec::QuerySpec;
use super::types::{FilterValue, QueryRequest};

/// A filter value coerced to its column's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Scalar {
    /// Coerce a raw request value to the column's type.
    pub fn coerce(column: &Column, raw: &str) -> Result<Self, QueryError> {
        let invalid = |expected| QueryError::InvalidFilterValue {
            field: column.name.to_string(),
            value: raw.to_string(),
            expected,
        };
        let trimmed = raw.trim();
        match column.ty {
            ColumnType::Text | ColumnType::Email | ColumnType::Attachment => {
                Ok(Self::Text(raw.to_string()))
            }
            ColumnType::BigInt => trimmed
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| invalid("an integer")),
            ColumnType::Integer => trimmed
                .parse::<i32>()
                .map(|v| Self::Integer(i64::from(v)))
                .map_err(|_| invalid("a 32-bit integer")),
            ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Self::Boolean(true)),
                "false" | "0" => Ok(Self::Boolean(false)),
                _ => Err(invalid("true or false")),
            },
            ColumnType::TextArray | ColumnType::Timestamp | ColumnType::AttachmentList => {
                Err(invalid("a filterable column"))
            }
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text(expected), Value::String(actual)) => expected == actual,
            (Self::Integer(expected), Value::Number(n)) => n.as_i64() == Some(*expected),
            (Self::Integer(expected), Value::String(s)) => s.parse::<i64>() == Ok(*expected),
            (Self::Boolean(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    MatchAll,
    /// Exact match on one column.
    Equals { field: &'static str, value: Scalar },
    /// Case-insensitive substring match.
    Contains { field: &'static str, needle: String },
    /// Column value is one of the listed values.
    AnyOf {
        field: &'static str,
        values: Vec<Scalar>,
    },
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction that drops `MatchAll` terms and collapses trivial cases.
    pub fn and(parts: Vec<Predicate>) -> Self {
        let mut parts: Vec<Predicate> = parts
            .into_iter()
            .filter(|p| !p.is_match_all())
            .collect();
        match parts.len() {
            0 => Self::MatchAll,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// Build the predicate for a request: the search OR-group (when there is
    /// a term and searchable fields), AND every filter.
    pub fn build(spec: &QuerySpec, request: &QueryRequest) -> Result<Self, QueryError> {
        let entity = spec.entity();
        let mut clauses = Vec::with_capacity(request.filters.len() + 1);

        if let Some(term) = request.search_term() {
            if spec.searchable_fields().is_empty() {
                debug!(entity = entity.name, "search term ignored: no searchable fields");
            } else {
                let group = spec
                    .searchable_fields()
                    .iter()
                    .map(|&field| Self::Contains {
                        field,
                        needle: term.to_string(),
                    })
                    .collect();
                clauses.push(Self::Or(group));
            }
        }

        for (key, value) in &request.filters {
            let column = entity
                .column(key)
                .filter(|c| c.filterable)
                .ok_or_else(|| QueryError::UnknownFilter {
                    field: key.clone(),
                    allowed: entity.filterable_fields(),
                })?;

            match value {
                FilterValue::Single(raw) => clauses.push(Self::Equals {
                    field: column.name,
                    value: Scalar::coerce(column, raw)?,
                }),
                FilterValue::AnyOf(raws) if raws.is_empty() => {}
                FilterValue::AnyOf(raws) => {
                    let values = raws
                        .iter()
                        .map(|raw| Scalar::coerce(column, raw))
                        .collect::<Result<Vec<_>, _>>()?;
                    clauses.push(Self::AnyOf {
                        field: column.name,
                        values,
                    });
                }
            }
        }

        Ok(Self::and(clauses))
    }

    /// Evaluate against one stored row.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        match self {
            Self::MatchAll => true,
            Self::Equals { field, value } => row.get(*field).is_some_and(|v| value.matches(v)),
            Self::Contains { field, needle } => row
                .get(*field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Self::AnyOf { field, values } => row
                .get(*field)
                .is_some_and(|v| values.iter().any(|s| s.matches(v))),
            Self::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Self::And(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }
}
