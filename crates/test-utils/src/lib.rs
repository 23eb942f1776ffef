//! Showcase test utilities.
//!
//! Helpers for integration testing: row fixtures for seeding stores,
//! a multipart body builder, and assertion utilities for API responses.

use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

/// Smallest byte sequence `infer` recognizes as `image/png`.
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// Smallest byte sequence `infer` recognizes as `application/pdf`.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Derive a stable fake client address from a label so parallel tests get
/// their own rate-limit bucket.
pub fn test_ip_for(label: &str) -> String {
    let hash = label
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    format!(
        "10.{}.{}.{}",
        (hash >> 16) & 0xff,
        (hash >> 8) & 0xff,
        (hash & 0xff).max(1)
    )
}

/// Row fixtures shaped like the stored tables.
pub mod rows {
    use super::*;

    /// A category row (article, project and skill categories share the shape).
    pub fn category(name: &str) -> JsonValue {
        json!({
            "name": name,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    /// An article row linked to a category.
    pub fn article(title: &str, category_id: i64) -> JsonValue {
        json!({
            "article_title": title,
            "slug": slugify(title),
            "thumbnail": null,
            "article_description": format!("About {title}"),
            "article_tags": "[\"notes\"]",
            "publish_time": "2024-01-02",
            "article_category_id": category_id,
            "added_by": 1,
            "created_at": "2024-01-02T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        })
    }

    /// A project row linked to a category.
    pub fn project(title: &str, category_id: i64) -> JsonValue {
        json!({
            "project_title": title,
            "slug": slugify(title),
            "thumbnail": null,
            "project_description": format!("About {title}"),
            "project_tags": "[\"notes\"]",
            "publish_time": "2024-01-03",
            "project_category_id": category_id,
            "added_by": 1,
            "created_at": "2024-01-03T00:00:00Z",
            "updated_at": "2024-01-03T00:00:00Z"
        })
    }

    /// A contact message row.
    pub fn message(name: &str, email: &str, description: &str) -> JsonValue {
        json!({
            "name": name,
            "email": email,
            "description": description,
            "created_at": "2024-01-04T00:00:00Z",
            "updated_at": "2024-01-04T00:00:00Z"
        })
    }

    /// Lowercase, hyphen-separated slug.
    pub fn slugify(title: &str) -> String {
        title
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Builder for `multipart/form-data` request bodies.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: format!("----showcase-{}", Uuid::now_v7().simple()),
            body: Vec::new(),
        }
    }

    /// Add a plain text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a file part.
    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Finish the body.
    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }

    fn open_part(&mut self) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

/// Assertion helpers for JSON responses.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to NOT have key '{}', got: {}",
            key,
            value
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{}'\nActual: {}",
            needle,
            haystack
        );
    }

    /// Assert the pagination envelope fields of a list response.
    pub fn envelope(value: &Value, total: u64, page: u64, limit: u64, total_pages: u64) {
        for key in ["data", "total", "page", "limit", "totalPages"] {
            has_key(value, key);
        }
        assert_eq!(value["total"], total, "total in {value}");
        assert_eq!(value["page"], page, "page in {value}");
        assert_eq!(value["limit"], limit, "limit in {value}");
        assert_eq!(value["totalPages"], total_pages, "totalPages in {value}");
    }

    /// Assert that an error body names `field` among its field errors.
    pub fn field_error(value: &Value, field: &str) {
        let fields = value["fields"]
            .as_array()
            .unwrap_or_else(|| panic!("Expected field errors, got: {value}"));
        assert!(
            fields.iter().any(|f| f["field"] == field),
            "Expected a field error for '{}', got: {}",
            field,
            value
        );
    }
}
