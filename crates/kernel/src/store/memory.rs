//! In-memory store for tests and local development.
//!
//! Evaluates the same [`Predicate`] trees the PostgreSQL store renders to
//! SQL, with the same ordering rules (NULLs last ascending, primary key
//! tie-break) and the same relation projection. Reads for one page take a
//! single read lock, so the count and the rows come from one state.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Assignments, CREATED_AT, FieldValue, Record, ResourceStore, StoreError, UPDATED_AT};
use crate::query::{
    EntityDescriptor, FindRequest, OrderBy, Predicate, QueryableSource, RelationView,
    SortDirection,
};

static NULL: Value = Value::Null;

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Record>,
    last_key: i64,
}

impl Table {
    fn next_key(&mut self) -> i64 {
        self.last_key += 1;
        self.last_key
    }

    fn put(&mut self, key: i64, row: Record) {
        self.last_key = self.last_key.max(key);
        self.rows.insert(key, row);
    }
}

type Tables = HashMap<&'static str, Table>;

/// Store keeping every table in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows as given. Rows without a primary key get the next free key;
    /// columns the row omits are stored as NULL. Returns the keys used.
    pub fn seed<I>(&self, entity: &'static EntityDescriptor, rows: I) -> Result<Vec<i64>, StoreError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.table).or_default();
        let mut keys = Vec::new();

        for row in rows {
            let Value::Object(fields) = row else {
                return Err(StoreError::Statement(format!(
                    "seed rows for '{}' must be JSON objects",
                    entity.table
                )));
            };
            let key = match fields.get(entity.primary_key).and_then(key_of) {
                Some(key) => key,
                None => table.next_key(),
            };
            let mut record = blank_record(entity);
            record.extend(fields);
            record.insert(entity.primary_key.to_string(), Value::from(key));
            table.put(key, record);
            keys.push(key);
        }

        Ok(keys)
    }

    /// Number of rows stored for `entity`.
    pub fn len(&self, entity: &EntityDescriptor) -> usize {
        self.tables
            .read()
            .get(entity.table)
            .map_or(0, |t| t.rows.len())
    }

    pub fn is_empty(&self, entity: &EntityDescriptor) -> bool {
        self.len(entity) == 0
    }
}

#[async_trait]
impl QueryableSource for MemoryStore {
    type Row = Value;

    async fn count(
        &self,
        entity: &'static EntityDescriptor,
        predicate: &Predicate,
    ) -> Result<u64, StoreError> {
        let tables = self.tables.read();
        Ok(matching(&tables, entity, predicate).len() as u64)
    }

    async fn find(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read();
        let rows = matching(&tables, entity, request.predicate);
        Ok(window(&tables, rows, &request))
    }

    async fn fetch_page(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<(u64, Vec<Value>), StoreError> {
        let tables = self.tables.read();
        let rows = matching(&tables, entity, request.predicate);
        let total = rows.len() as u64;
        Ok((total, window(&tables, rows, &request)))
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_key(
        &self,
        entity: &'static EntityDescriptor,
        relations: &[RelationView],
        key: i64,
    ) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .get(entity.table)
            .and_then(|t| t.rows.get(&key))
            .map(|row| materialize(&tables, row, relations)))
    }

    async fn exists_with(
        &self,
        entity: &'static EntityDescriptor,
        field: &'static str,
        value: &FieldValue,
        exclude_key: Option<i64>,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read();
        Ok(tables.get(entity.table).is_some_and(|t| {
            t.rows
                .iter()
                .any(|(key, row)| Some(*key) != exclude_key && value.matches_json(row.get(field)))
        }))
    }

    async fn insert(
        &self,
        entity: &'static EntityDescriptor,
        values: &Assignments,
    ) -> Result<Value, StoreError> {
        let mut tables = self.tables.write();
        check_references(&tables, entity, values)?;

        let now = timestamp();
        let table = tables.entry(entity.table).or_default();
        let key = table.next_key();

        let mut record = blank_record(entity);
        record.insert(entity.primary_key.to_string(), Value::from(key));
        for (column, value) in values {
            record.insert((*column).to_string(), value.to_json());
        }
        for stamp in [CREATED_AT, UPDATED_AT] {
            if entity.has_column(stamp) {
                record.insert(stamp.to_string(), Value::String(now.clone()));
            }
        }

        table.put(key, record.clone());
        Ok(Value::Object(record))
    }

    async fn update(
        &self,
        entity: &'static EntityDescriptor,
        key: i64,
        values: &Assignments,
    ) -> Result<Option<Value>, StoreError> {
        let mut tables = self.tables.write();
        check_references(&tables, entity, values)?;

        let Some(record) = tables
            .get_mut(entity.table)
            .and_then(|t| t.rows.get_mut(&key))
        else {
            return Ok(None);
        };
        for (column, value) in values {
            record.insert((*column).to_string(), value.to_json());
        }
        if entity.has_column(UPDATED_AT) {
            record.insert(UPDATED_AT.to_string(), Value::String(timestamp()));
        }
        Ok(Some(Value::Object(record.clone())))
    }

    async fn delete(
        &self,
        entity: &'static EntityDescriptor,
        key: i64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        Ok(tables
            .get_mut(entity.table)
            .is_some_and(|t| t.rows.remove(&key).is_some()))
    }
}

fn blank_record(entity: &EntityDescriptor) -> Record {
    entity
        .columns
        .iter()
        .map(|c| (c.name.to_string(), Value::Null))
        .collect()
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn key_of(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Writes naming a related row that does not exist fail the way a foreign
/// key would.
fn check_references(
    tables: &Tables,
    entity: &EntityDescriptor,
    values: &Assignments,
) -> Result<(), StoreError> {
    for relation in entity.relations {
        let referenced = values
            .iter()
            .find(|(column, _)| *column == relation.local_field)
            .and_then(|(_, value)| match value {
                FieldValue::Integer(key) => Some(*key),
                _ => None,
            });
        let Some(key) = referenced else {
            continue;
        };
        let exists = tables
            .get(relation.target.table)
            .is_some_and(|t| t.rows.contains_key(&key));
        if !exists {
            return Err(StoreError::InvalidReference {
                constraint: Some(format!("{}_{}_fkey", entity.table, relation.local_field)),
            });
        }
    }
    Ok(())
}

fn matching<'t>(
    tables: &'t Tables,
    entity: &EntityDescriptor,
    predicate: &Predicate,
) -> Vec<&'t Record> {
    tables
        .get(entity.table)
        .map(|t| t.rows.values().filter(|row| predicate.matches(row)).collect())
        .unwrap_or_default()
}

/// Sort, skip and take, then attach relations.
fn window(tables: &Tables, mut rows: Vec<&Record>, request: &FindRequest<'_>) -> Vec<Value> {
    rows.sort_by(|a, b| compare_rows(a, b, request.order));
    let offset = usize::try_from(request.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(request.limit).unwrap_or(usize::MAX);
    rows.into_iter()
        .skip(offset)
        .take(limit)
        .map(|row| materialize(tables, row, request.relations))
        .collect()
}

fn compare_rows(a: &Record, b: &Record, order: &[OrderBy]) -> Ordering {
    for term in order {
        let left = a.get(term.column).unwrap_or(&NULL);
        let right = b.get(term.column).unwrap_or(&NULL);
        let ordering = match term.direction {
            SortDirection::Asc => compare_values(left, right),
            SortDirection::Desc => compare_values(left, right).reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// NULL sorts after every value, as PostgreSQL does for ascending order.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Copy of `row` with one object per relation, projected to the view's
/// fields, or NULL when the related row is missing.
fn materialize(tables: &Tables, row: &Record, relations: &[RelationView]) -> Value {
    let mut out = row.clone();
    for view in relations {
        let relation = view.relation;
        let related = row
            .get(relation.local_field)
            .and_then(key_of)
            .and_then(|key| tables.get(relation.target.table)?.rows.get(&key))
            .map_or(Value::Null, |target| {
                Value::Object(
                    view.fields
                        .iter()
                        .map(|f| ((*f).to_string(), target.get(*f).cloned().unwrap_or(Value::Null)))
                        .collect(),
                )
            });
        out.insert(relation.name.to_string(), related);
    }
    Value::Object(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::{Column, ColumnType, QuerySpec, Relation};
    use serde_json::json;

    static TEAMS: EntityDescriptor = EntityDescriptor {
        name: "team",
        table: "teams",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnType::BigInt).read_only(),
            Column::new("name", ColumnType::Text),
            Column::new("city", ColumnType::Text),
        ],
        relations: &[],
        order: &[],
    };

    static PLAYERS: EntityDescriptor = EntityDescriptor {
        name: "player",
        table: "players",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnType::BigInt).read_only(),
            Column::new("name", ColumnType::Text),
            Column::new("number", ColumnType::Integer).filterable(),
            Column::new("team_id", ColumnType::BigInt).filterable(),
            Column::new("updated_at", ColumnType::Timestamp).read_only(),
        ],
        relations: &[Relation {
            name: "team",
            target: &TEAMS,
            local_field: "team_id",
            default_fields: &["name", "city"],
        }],
        order: &[OrderBy::asc("number")],
    };

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(&TEAMS, [json!({"id": 1, "name": "Comets", "city": "Leeds"})])
            .unwrap();
        store
            .seed(
                &PLAYERS,
                [
                    json!({"name": "Ada", "number": 9, "team_id": 1}),
                    json!({"name": "Bo", "number": null, "team_id": 1}),
                    json!({"name": "Cy", "number": 4, "team_id": null}),
                ],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn page_is_ordered_with_nulls_last() {
        let store = seeded();
        let order = PLAYERS.ordering();
        let request = FindRequest {
            predicate: &Predicate::MatchAll,
            relations: &[],
            order: &order,
            offset: 0,
            limit: 10,
        };
        let (total, rows) = store.fetch_page(&PLAYERS, request).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(total, 3);
        assert_eq!(names, vec![json!("Cy"), json!("Ada"), json!("Bo")]);
    }

    #[tokio::test]
    async fn relations_are_projected() {
        let store = seeded();
        let spec = QuerySpec::builder(&PLAYERS)
            .relation("team")
            .select_relation("team", ["name"])
            .build()
            .unwrap();
        let ada = store.find_by_key(&PLAYERS, spec.relations(), 1).await.unwrap().unwrap();
        assert_eq!(ada["team"], json!({"id": 1, "name": "Comets"}));

        let cy = store.find_by_key(&PLAYERS, spec.relations(), 3).await.unwrap().unwrap();
        assert_eq!(cy["team"], Value::Null);
    }

    #[tokio::test]
    async fn insert_assigns_next_key_and_fills_columns() {
        let store = seeded();
        let row = store
            .insert(
                &PLAYERS,
                &[("name", FieldValue::Text("Di".into())), ("team_id", FieldValue::Integer(1))],
            )
            .await
            .unwrap();
        assert_eq!(row["id"], json!(4));
        assert_eq!(row["number"], Value::Null);
        assert!(row["updated_at"].is_string());
        assert_eq!(store.len(&PLAYERS), 4);
    }

    #[tokio::test]
    async fn missing_reference_rejected() {
        let store = seeded();
        let err = store
            .insert(&PLAYERS, &[("team_id", FieldValue::Integer(99))])
            .await;
        assert!(matches!(err, Err(StoreError::InvalidReference { .. })));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let store = seeded();
        let updated = store
            .update(&PLAYERS, 2, &[("number", FieldValue::Integer(7))])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["number"], json!(7));
        assert!(store.update(&PLAYERS, 42, &[]).await.unwrap().is_none());

        assert!(store.delete(&PLAYERS, 2).await.unwrap());
        assert!(!store.delete(&PLAYERS, 2).await.unwrap());
        assert_eq!(store.len(&PLAYERS), 2);
    }

    #[tokio::test]
    async fn exists_with_excludes_own_row() {
        let store = seeded();
        let ada = FieldValue::Text("Ada".into());
        assert!(store.exists_with(&PLAYERS, "name", &ada, None).await.unwrap());
        assert!(!store.exists_with(&PLAYERS, "name", &ada, Some(1)).await.unwrap());
    }

    #[test]
    fn seed_rejects_non_objects() {
        let store = MemoryStore::new();
        assert!(store.seed(&TEAMS, [json!([1, 2])]).is_err());
        assert!(store.is_empty(&TEAMS));
    }
}
