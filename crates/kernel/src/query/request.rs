//! Parsing list requests from URL query strings.

use std::collections::BTreeMap;

use tracing::debug;

use super::types::{FilterValue, QueryRequest};

pub const PAGE_PARAM: &str = "page";
pub const LIMIT_PARAM: &str = "limit";
pub const SEARCH_PARAM: &str = "search";

impl QueryRequest {
    /// Parse a raw query string such as `page=2&limit=5&search=rust&tag[]=a`.
    pub fn from_query_string(query: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    /// Build a request from decoded key/value pairs.
    ///
    /// `page`, `limit` and `search` are reserved; every other key is a
    /// filter. A key given more than once, or with a `[]` suffix, becomes a
    /// set of accepted values. Empty filter values are treated as absent.
    /// Non-numeric `page`/`limit` values fall back to their defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::default();
        let mut filters: BTreeMap<String, FilterValue> = BTreeMap::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value: String = value.into();
            match key {
                PAGE_PARAM => request.page = parse_number(key, &value),
                LIMIT_PARAM => request.limit = parse_number(key, &value),
                SEARCH_PARAM => request.search = Some(value).filter(|v| !v.is_empty()),
                _ => {
                    if value.is_empty() {
                        continue;
                    }
                    let (name, as_list) = match key.strip_suffix("[]") {
                        Some(name) => (name, true),
                        None => (key, false),
                    };
                    let slot = filters.remove(name);
                    filters.insert(name.to_string(), FilterValue::append(slot, value, as_list));
                }
            }
        }

        request.filters = filters;
        request
    }
}

fn parse_number(key: &str, value: &str) -> Option<i64> {
    match value.trim().parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!(param = key, value = %value, "ignoring non-numeric pagination value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_parameters() {
        let r = QueryRequest::from_query_string("page=3&limit=25&search=hello%20world");
        assert_eq!(r.page, Some(3));
        assert_eq!(r.limit, Some(25));
        assert_eq!(r.search.as_deref(), Some("hello world"));
        assert!(r.filters.is_empty());
    }

    #[test]
    fn malformed_pagination_falls_back() {
        let r = QueryRequest::from_query_string("page=abc&limit=");
        assert_eq!(r.page, None);
        assert_eq!(r.limit, None);
    }

    #[test]
    fn other_keys_are_filters() {
        let r = QueryRequest::from_query_string("name=Rust&article_category_id=4");
        assert_eq!(
            r.filters.get("name"),
            Some(&FilterValue::Single("Rust".into()))
        );
        assert_eq!(
            r.filters.get("article_category_id"),
            Some(&FilterValue::Single("4".into()))
        );
    }

    #[test]
    fn repeated_and_bracketed_keys_become_lists() {
        let r = QueryRequest::from_query_string("id=1&id=2&tag[]=a&email=x");
        assert_eq!(
            r.filters.get("id"),
            Some(&FilterValue::AnyOf(vec!["1".into(), "2".into()]))
        );
        assert_eq!(
            r.filters.get("tag"),
            Some(&FilterValue::AnyOf(vec!["a".into()]))
        );
        assert_eq!(r.filters.get("email"), Some(&FilterValue::Single("x".into())));
    }

    #[test]
    fn empty_values_are_absent() {
        let r = QueryRequest::from_query_string("name=&search=");
        assert!(r.filters.is_empty());
        assert_eq!(r.search, None);
    }

    #[test]
    fn empty_query_string() {
        assert_eq!(QueryRequest::from_query_string(""), QueryRequest::default());
    }
}
