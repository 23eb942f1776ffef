//! The data-query engine.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::QueryError;
use super::predicate::Predicate;
use super::source::{FindRequest, QueryableSource};
use super::spec::QuerySpec;
use super::types::{PageLimits, PaginatedResult, Pagination, QueryRequest};
use crate::store::StoreError;

/// Turns a list request into one bounded, paginated query.
///
/// Holds only the page-size bounds; every call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataQueryEngine {
    limits: PageLimits,
}

impl DataQueryEngine {
    pub fn new(limits: PageLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// Normalize pagination, build the predicate, and fetch one page plus
    /// the total match count from `source`.
    pub async fn execute<S>(
        &self,
        spec: &QuerySpec,
        request: &QueryRequest,
        source: &S,
    ) -> Result<PaginatedResult<S::Row>, QueryError>
    where
        S: QueryableSource + ?Sized,
    {
        let entity = spec.entity();
        let pagination = Pagination::normalize(request.page, request.limit, &self.limits);
        if exceeds_max(request.limit, self.limits.max_limit) {
            warn!(
                entity = entity.name,
                requested = request.limit,
                max = self.limits.max_limit,
                "limit exceeds maximum, capping"
            );
        }

        let predicate = Predicate::build(spec, request)?;
        let order = entity.ordering();
        let find = FindRequest {
            predicate: &predicate,
            relations: spec.relations(),
            order: &order,
            offset: pagination.offset(),
            limit: pagination.limit,
        };

        let (total, data) = source.fetch_page(entity, find).await?;

        debug!(
            entity = entity.name,
            total,
            page = pagination.page,
            limit = pagination.limit,
            returned = data.len(),
            "data query executed"
        );

        Ok(PaginatedResult::new(data, total, pagination))
    }

    /// [`execute`](Self::execute) against a JSON source, decoding each row
    /// into `T`.
    pub async fn execute_as<T, S>(
        &self,
        spec: &QuerySpec,
        request: &QueryRequest,
        source: &S,
    ) -> Result<PaginatedResult<T>, QueryError>
    where
        T: DeserializeOwned,
        S: QueryableSource<Row = Value> + ?Sized,
    {
        let page = self.execute(spec, request, source).await?;
        page.try_map(serde_json::from_value)
            .map_err(|e| QueryError::Store(StoreError::Decode(e)))
    }
}

fn exceeds_max(requested: Option<i64>, max_limit: u64) -> bool {
    requested
        .and_then(|l| u64::try_from(l).ok())
        .is_some_and(|l| l > max_limit)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::query::entity::{Column, ColumnType, EntityDescriptor};

    static NUMBERS: EntityDescriptor = EntityDescriptor {
        name: "number",
        table: "numbers",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnType::BigInt),
            Column::new("label", ColumnType::Text),
        ],
        relations: &[],
        order: &[],
    };

    /// Serves `0..total` and records the window it was asked for.
    struct Sequence {
        total: u64,
        window: Mutex<Option<(u64, u64)>>,
    }

    impl Sequence {
        fn new(total: u64) -> Self {
            Self {
                total,
                window: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl QueryableSource for Sequence {
        type Row = u64;

        async fn count(
            &self,
            _entity: &'static EntityDescriptor,
            _predicate: &Predicate,
        ) -> Result<u64, StoreError> {
            Ok(self.total)
        }

        async fn find(
            &self,
            _entity: &'static EntityDescriptor,
            request: FindRequest<'_>,
        ) -> Result<Vec<u64>, StoreError> {
            *self.window.lock() = Some((request.offset, request.limit));
            let end = request.offset.saturating_add(request.limit).min(self.total);
            Ok((request.offset.min(end)..end).collect())
        }
    }

    fn spec() -> QuerySpec {
        QuerySpec::builder(&NUMBERS).search(["label"]).build().unwrap()
    }

    #[tokio::test]
    async fn third_page_of_twenty_five() {
        let source = Sequence::new(25);
        let request = QueryRequest::new().with_page(3).with_limit(10);
        let result = DataQueryEngine::default()
            .execute(&spec(), &request, &source)
            .await
            .unwrap();

        assert_eq!(result.data, vec![20, 21, 22, 23, 24]);
        assert_eq!(result.total, 25);
        assert_eq!(result.total_pages, 3);
        assert_eq!(*source.window.lock(), Some((20, 10)));
    }

    #[tokio::test]
    async fn limit_is_capped_before_reaching_source() {
        let source = Sequence::new(500);
        let request = QueryRequest::new().with_limit(1000);
        let result = DataQueryEngine::default()
            .execute(&spec(), &request, &source)
            .await
            .unwrap();

        assert_eq!(result.limit, 100);
        assert_eq!(result.data.len(), 100);
        assert_eq!(*source.window.lock(), Some((0, 100)));
    }

    #[tokio::test]
    async fn configured_limits_apply() {
        let engine = DataQueryEngine::new(PageLimits {
            default_limit: 3,
            max_limit: 5,
        });
        let source = Sequence::new(10);
        let result = engine
            .execute(&spec(), &QueryRequest::new(), &source)
            .await
            .unwrap();
        assert_eq!(result.limit, 3);
        assert_eq!(result.total_pages, 4);
    }

    #[tokio::test]
    async fn page_past_end_is_empty() {
        let source = Sequence::new(5);
        let request = QueryRequest::new().with_page(9).with_limit(2);
        let result = DataQueryEngine::default()
            .execute(&spec(), &request, &source)
            .await
            .unwrap();

        assert!(result.data.is_empty());
        assert_eq!(result.total, 5);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.page, 9);
    }

    #[tokio::test]
    async fn invalid_filter_never_reaches_source() {
        let source = Sequence::new(5);
        let request = QueryRequest::new().with_filter("label", "x");
        let err = DataQueryEngine::default()
            .execute(&spec(), &request, &source)
            .await;

        assert!(matches!(err, Err(QueryError::UnknownFilter { .. })));
        assert!(source.window.lock().is_none());
    }

    #[test]
    fn cap_check_compares_unsigned() {
        assert!(exceeds_max(Some(101), 100));
        assert!(!exceeds_max(Some(100), 100));
        assert!(!exceeds_max(Some(-5), 100));
        assert!(!exceeds_max(None, 100));
        assert!(!exceeds_max(Some(i64::MAX), u64::MAX));
    }

    #[tokio::test]
    async fn huge_maximum_keeps_requested_limit() {
        let engine = DataQueryEngine::new(PageLimits {
            default_limit: 10,
            max_limit: u64::MAX,
        });
        let source = Sequence::new(20);
        let result = engine
            .execute(&spec(), &QueryRequest::new().with_limit(7), &source)
            .await
            .unwrap();
        assert_eq!(result.limit, 7);
        assert_eq!(result.total_pages, 3);
    }
}
