//! Request and response types for the data-query engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Page size used when the request does not name one.
pub const DEFAULT_LIMIT: u64 = 10;

/// Largest page size a request may ask for.
pub const MAX_LIMIT: u64 = 100;

/// Largest offset a page query will carry; PostgreSQL offsets are `bigint`.
const MAX_OFFSET: u64 = i64::MAX as u64;

/// Page-size bounds applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Effective page and page size after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    /// Coerce raw request values: page below 1 becomes 1, a missing limit
    /// becomes the default, and the limit is clamped to `[1, max_limit]`.
    pub fn normalize(page: Option<i64>, limit: Option<i64>, limits: &PageLimits) -> Self {
        let max_limit = limits.max_limit.max(1);
        let page = page.filter(|p| *p >= 1).map_or(1, |p| p as u64);
        let limit = match limit {
            None => limits.default_limit.clamp(1, max_limit),
            Some(l) if l < 1 => 1,
            Some(l) => (l as u64).min(max_limit),
        };
        Self { page, limit }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit).min(MAX_OFFSET)
    }
}

/// A filter value from the request: a single exact match, or a set of
/// accepted values when the parameter was repeated or given as `field[]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    AnyOf(Vec<String>),
}

impl FilterValue {
    fn push(self, value: String) -> Self {
        match self {
            Self::Single(first) => Self::AnyOf(vec![first, value]),
            Self::AnyOf(mut values) => {
                values.push(value);
                Self::AnyOf(values)
            }
        }
    }

    pub(super) fn append(slot: Option<Self>, value: String, as_list: bool) -> Self {
        match slot {
            Some(existing) => existing.push(value),
            None if as_list => Self::AnyOf(vec![value]),
            None => Self::Single(value),
        }
    }
}

/// A client's list request before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub filters: BTreeMap<String, FilterValue>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters
            .insert(field.into(), FilterValue::Single(value.into()));
        self
    }

    pub fn with_any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.insert(field.into(), FilterValue::AnyOf(values));
        self
    }

    /// The search term if it contains anything besides whitespace.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// The uniform envelope returned by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResult<T> {
    pub fn new(data: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let total_pages = if pagination.limit == 0 {
            0
        } else {
            total.div_ceil(pagination.limit)
        };
        Self {
            data,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PaginatedResult<U>, E> {
        Ok(PaginatedResult {
            data: self.data.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn normalize(page: Option<i64>, limit: Option<i64>) -> Pagination {
        Pagination::normalize(page, limit, &PageLimits::default())
    }

    #[test]
    fn defaults_when_absent() {
        assert_eq!(normalize(None, None), Pagination { page: 1, limit: 10 });
    }

    #[test]
    fn non_positive_page_becomes_first() {
        assert_eq!(normalize(Some(0), None).page, 1);
        assert_eq!(normalize(Some(-4), None).page, 1);
    }

    #[test]
    fn limit_clamped() {
        assert_eq!(normalize(None, Some(0)).limit, 1);
        assert_eq!(normalize(None, Some(-3)).limit, 1);
        assert_eq!(normalize(None, Some(500)).limit, MAX_LIMIT);
        assert_eq!(normalize(None, Some(25)).limit, 25);
    }

    #[test]
    fn default_limit_respects_configured_max() {
        let limits = PageLimits {
            default_limit: 50,
            max_limit: 20,
        };
        assert_eq!(Pagination::normalize(None, None, &limits).limit, 20);
    }

    #[test]
    fn offset_calculation() {
        assert_eq!(normalize(Some(1), Some(10)).offset(), 0);
        assert_eq!(normalize(Some(3), Some(10)).offset(), 20);
        assert_eq!(normalize(Some(i64::MAX), Some(100)).offset(), i64::MAX as u64);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination { page: 1, limit: 10 };
        assert_eq!(PaginatedResult::<u8>::new(vec![], 0, p).total_pages, 0);
        assert_eq!(PaginatedResult::<u8>::new(vec![], 10, p).total_pages, 1);
        assert_eq!(PaginatedResult::<u8>::new(vec![], 25, p).total_pages, 3);
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let result = PaginatedResult::new(vec![1, 2], 12, Pagination { page: 2, limit: 2 });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["totalPages"], 6);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("total_pages").is_none());
        assert!(result.has_next());
        assert!(result.has_prev());
    }

    #[test]
    fn try_map_propagates_errors() {
        let result = PaginatedResult::new(vec!["1", "x"], 2, Pagination { page: 1, limit: 10 });
        assert!(result.try_map(|s| s.parse::<i32>()).is_err());
    }

    #[test]
    fn search_term_ignores_whitespace() {
        assert_eq!(QueryRequest::new().with_search("   ").search_term(), None);
        assert_eq!(QueryRequest::new().with_search(" go ").search_term(), Some("go"));
    }
}
