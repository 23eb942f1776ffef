//! PostgreSQL store.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Alias, Expr, PostgresQueryBuilder, Query, SimpleExpr};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{Assignments, FieldValue, ResourceStore, StoreError, UPDATED_AT};
use crate::query::{
    DataQueryBuilder, EntityDescriptor, FindRequest, Predicate, QueryableSource, RelationView,
};

/// Store backed by a sqlx PostgreSQL pool. All SQL is generated with SeaQuery.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a read-only transaction on a single snapshot with the
    /// statement timeout applied.
    async fn begin_read(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let timeout = format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&timeout).execute(&mut *tx).await?;
        Ok(tx)
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

#[async_trait]
impl QueryableSource for PgStore {
    type Row = Value;

    async fn count(
        &self,
        entity: &'static EntityDescriptor,
        predicate: &Predicate,
    ) -> Result<u64, StoreError> {
        let sql = DataQueryBuilder::new(entity, &[]).build_count(predicate);
        let total: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    async fn find(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<Vec<Value>, StoreError> {
        let sql = DataQueryBuilder::new(entity, request.relations)
            .with_order(request.order)
            .build_page(request.predicate, request.offset, request.limit);
        Ok(sqlx::query_scalar(&sql).fetch_all(&self.pool).await?)
    }

    async fn fetch_page(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<(u64, Vec<Value>), StoreError> {
        let builder = DataQueryBuilder::new(entity, request.relations).with_order(request.order);
        let count_sql = builder.build_count(request.predicate);
        let page_sql = builder.build_page(request.predicate, request.offset, request.limit);
        debug!(entity = entity.name, sql = %page_sql, "page query");

        let mut tx = self.begin_read().await?;
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;
        let rows: Vec<Value> = sqlx::query_scalar(&page_sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        Ok((total.max(0) as u64, rows))
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_key(
        &self,
        entity: &'static EntityDescriptor,
        relations: &[RelationView],
        key: i64,
    ) -> Result<Option<Value>, StoreError> {
        let sql = DataQueryBuilder::new(entity, relations).build_by_key(key);
        Ok(sqlx::query_scalar(&sql).fetch_optional(&self.pool).await?)
    }

    async fn exists_with(
        &self,
        entity: &'static EntityDescriptor,
        field: &'static str,
        value: &FieldValue,
        exclude_key: Option<i64>,
    ) -> Result<bool, StoreError> {
        let sql = exists_sql(entity, field, value, exclude_key);
        let found = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(found.is_some())
    }

    async fn insert(
        &self,
        entity: &'static EntityDescriptor,
        values: &Assignments,
    ) -> Result<Value, StoreError> {
        let sql = insert_sql(entity, values)?;
        let row: Value = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        debug!(entity = entity.name, "row inserted");
        Ok(row)
    }

    async fn update(
        &self,
        entity: &'static EntityDescriptor,
        key: i64,
        values: &Assignments,
    ) -> Result<Option<Value>, StoreError> {
        let touch = entity.has_column(UPDATED_AT);
        if values.is_empty() && !touch {
            return self.find_by_key(entity, &[], key).await;
        }

        let sql = update_sql(entity, key, values, touch);
        Ok(sqlx::query_scalar(&sql).fetch_optional(&self.pool).await?)
    }

    async fn delete(
        &self,
        entity: &'static EntityDescriptor,
        key: i64,
    ) -> Result<bool, StoreError> {
        let sql = Query::delete()
            .from_table(Alias::new(entity.table))
            .and_where(Expr::col(Alias::new(entity.primary_key)).eq(key))
            .to_string(PostgresQueryBuilder);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

// SeaQuery statements hold `Rc` identifiers, so they are rendered to SQL
// before any await point.

fn exists_sql(
    entity: &EntityDescriptor,
    field: &'static str,
    value: &FieldValue,
    exclude_key: Option<i64>,
) -> String {
    let mut query = Query::select();
    query
        .expr(Expr::val(1))
        .from(Alias::new(entity.table))
        .and_where(Expr::col(Alias::new(field)).eq(field_expr(value)));
    if let Some(key) = exclude_key {
        query.and_where(Expr::col(Alias::new(entity.primary_key)).ne(key));
    }
    query.limit(1);
    query.to_string(PostgresQueryBuilder)
}

fn insert_sql(entity: &EntityDescriptor, values: &Assignments) -> Result<String, StoreError> {
    let mut stmt = Query::insert();
    stmt.into_table(Alias::new(entity.table));
    if values.is_empty() {
        stmt.or_default_values();
    } else {
        stmt.columns(values.iter().map(|(column, _)| Alias::new(*column)));
        stmt.values(values.iter().map(|(_, value)| field_expr(value)))
            .map_err(|e| StoreError::Statement(e.to_string()))?;
    }
    stmt.returning_all();

    Ok(format!(
        "WITH inserted AS ({}) SELECT row_to_json(inserted) FROM inserted",
        stmt.to_string(PostgresQueryBuilder)
    ))
}

fn update_sql(entity: &EntityDescriptor, key: i64, values: &Assignments, touch: bool) -> String {
    let mut stmt = Query::update();
    stmt.table(Alias::new(entity.table)).values(
        values
            .iter()
            .map(|(column, value)| (Alias::new(*column), field_expr(value))),
    );
    if touch {
        stmt.value(Alias::new(UPDATED_AT), Expr::cust("CURRENT_TIMESTAMP"));
    }
    stmt.and_where(Expr::col(Alias::new(entity.primary_key)).eq(key))
        .returning_all();

    format!(
        "WITH updated AS ({}) SELECT row_to_json(updated) FROM updated",
        stmt.to_string(PostgresQueryBuilder)
    )
}

/// SeaQuery expression for a written value.
fn field_expr(value: &FieldValue) -> SimpleExpr {
    match value {
        FieldValue::Null => Expr::cust("NULL"),
        FieldValue::Text(s) => Expr::val(s.clone()).into(),
        FieldValue::Integer(i) => Expr::val(*i).into(),
        FieldValue::Boolean(b) => Expr::val(*b).into(),
        // An empty ARRAY[] literal has no element type in PostgreSQL.
        FieldValue::TextList(items) if items.is_empty() => Expr::cust("'{}'"),
        FieldValue::TextList(items) => Expr::val(items.clone()).into(),
    }
}
