//! Live schema check.
//!
//! Compares the entity catalog with `information_schema.columns` so a
//! deployment can confirm its tables match what the server will query.
//! Read-only; nothing is created or altered.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::query::{ColumnType, EntityDescriptor};
use crate::store::StoreError;

/// One column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaProblem {
    MissingTable,
    MissingColumn,
    TypeMismatch {
        expected: ColumnType,
        found: String,
    },
}

/// A difference between a descriptor and the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub table: &'static str,
    pub column: Option<&'static str>,
    pub problem: SchemaProblem,
}

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.problem, self.column) {
            (SchemaProblem::MissingTable, _) => write!(f, "table {} does not exist", self.table),
            (SchemaProblem::MissingColumn, Some(column)) => {
                write!(f, "column {}.{} does not exist", self.table, column)
            }
            (SchemaProblem::TypeMismatch { expected, found }, Some(column)) => write!(
                f,
                "column {}.{} is {found}, expected {expected:?}",
                self.table, column
            ),
            (_, None) => write!(f, "table {} does not match", self.table),
        }
    }
}

/// Load the columns of `entities` from the current schema.
pub async fn load_columns(
    pool: &PgPool,
    entities: &[&'static EntityDescriptor],
) -> Result<Vec<ColumnInfo>, StoreError> {
    let tables: Vec<String> = entities.iter().map(|e| e.table.to_string()).collect();
    let rows = sqlx::query_as::<_, ColumnInfo>(
        r#"
        SELECT table_name::text AS table_name,
               column_name::text AS column_name,
               data_type::text AS data_type
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = ANY($1)
        "#,
    )
    .bind(&tables)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Compare descriptors with reported columns. Extra database columns are
/// ignored.
pub fn compare(
    entities: &[&'static EntityDescriptor],
    columns: &[ColumnInfo],
) -> Vec<SchemaMismatch> {
    let mut by_table: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
    for info in columns {
        by_table
            .entry(info.table_name.as_str())
            .or_default()
            .insert(info.column_name.as_str(), info.data_type.as_str());
    }

    let mut mismatches = Vec::new();
    for entity in entities {
        let Some(live) = by_table.get(entity.table) else {
            mismatches.push(SchemaMismatch {
                table: entity.table,
                column: None,
                problem: SchemaProblem::MissingTable,
            });
            continue;
        };
        for column in entity.columns {
            let problem = match live.get(column.name) {
                None => SchemaProblem::MissingColumn,
                Some(found) if !column.ty.accepts_sql_type(found) => SchemaProblem::TypeMismatch {
                    expected: column.ty,
                    found: (*found).to_string(),
                },
                Some(_) => continue,
            };
            mismatches.push(SchemaMismatch {
                table: entity.table,
                column: Some(column.name),
                problem,
            });
        }
    }
    mismatches
}

/// Load and compare in one step.
pub async fn check_schema(
    pool: &PgPool,
    entities: &[&'static EntityDescriptor],
) -> Result<Vec<SchemaMismatch>, StoreError> {
    let columns = load_columns(pool, entities).await?;
    Ok(compare(entities, &columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::entities::{ARTICLE_CATEGORIES, SKILLS};

    fn info(table: &str, column: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            table_name: table.into(),
            column_name: column.into(),
            data_type: data_type.into(),
        }
    }

    fn categories_table() -> Vec<ColumnInfo> {
        vec![
            info("article_categories", "id", "bigint"),
            info("article_categories", "name", "character varying"),
            info("article_categories", "created_at", "timestamp with time zone"),
            info("article_categories", "updated_at", "timestamp with time zone"),
            info("article_categories", "legacy", "text"),
        ]
    }

    #[test]
    fn matching_table_has_no_mismatches() {
        assert!(compare(&[&ARTICLE_CATEGORIES], &categories_table()).is_empty());
    }

    #[test]
    fn missing_table_reported_once() {
        let mismatches = compare(&[&ARTICLE_CATEGORIES, &SKILLS], &categories_table());
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].table, "skills");
        assert_eq!(mismatches[0].problem, SchemaProblem::MissingTable);
        assert_eq!(mismatches[0].to_string(), "table skills does not exist");
    }

    #[test]
    fn missing_and_mistyped_columns() {
        let mut live = categories_table();
        live.retain(|c| c.column_name != "updated_at");
        live[0].data_type = "integer".into();

        let mismatches = compare(&[&ARTICLE_CATEGORIES], &live);
        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[0].column, Some("id"));
        assert!(matches!(
            mismatches[0].problem,
            SchemaProblem::TypeMismatch { expected: ColumnType::BigInt, .. }
        ));
        assert_eq!(mismatches[1].column, Some("updated_at"));
        assert_eq!(mismatches[1].problem, SchemaProblem::MissingColumn);
    }
}
