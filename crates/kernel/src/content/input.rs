//! Create/update payloads.
//!
//! A [`ResourceInput`] is the body of a write request, either a JSON object
//! or the text parts of a multipart form plus its files. [`ResourceInput::validate`]
//! checks it against an entity's columns and produces typed assignments.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::file::Upload;
use crate::query::{Column, ColumnType, EntityDescriptor};
use crate::store::FieldValue;

/// A problem with one field of a write payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Whether a payload creates a row or patches one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Body of a create or update request.
#[derive(Debug, Clone, Default)]
pub struct ResourceInput {
    fields: Map<String, Value>,
    uploads: Vec<Upload>,
}

impl ResourceInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload from a JSON body. The body must be an object.
    pub fn from_json(body: Value) -> Result<Self, FieldError> {
        match body {
            Value::Object(fields) => Ok(Self {
                fields,
                uploads: Vec::new(),
            }),
            _ => Err(FieldError::new("body", "must be a JSON object")),
        }
    }

    /// Payload from multipart text parts and files.
    ///
    /// A repeated key, or one ending in `[]`, collects its values into a list.
    pub fn from_parts<I>(parts: I, uploads: Vec<Upload>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut fields = Map::new();
        for (key, value) in parts {
            let (name, as_list) = match key.strip_suffix("[]") {
                Some(name) => (name.to_string(), true),
                None => (key, false),
            };
            match fields.get_mut(&name) {
                Some(Value::Array(items)) => items.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
                None if as_list => {
                    fields.insert(name, Value::Array(vec![Value::String(value)]));
                }
                None => {
                    fields.insert(name, Value::String(value));
                }
            }
        }
        Self { fields, uploads }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.uploads.push(upload);
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }

    /// Uploaded files for `column`, in arrival order.
    pub fn uploads_for(&self, column: &str) -> Vec<&Upload> {
        self.uploads.iter().filter(|u| u.field == column).collect()
    }

    /// Check the payload against `entity` and coerce every field.
    ///
    /// All problems are collected rather than stopping at the first.
    pub fn validate(
        &self,
        entity: &'static EntityDescriptor,
        mode: WriteMode,
    ) -> Result<Vec<(&'static str, FieldValue)>, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut values = Vec::new();

        for (key, raw) in &self.fields {
            let Some(column) = entity.column(key) else {
                errors.push(FieldError::new(key, "unknown field"));
                continue;
            };
            if !column.writable {
                errors.push(FieldError::new(key, "field is read-only"));
                continue;
            }
            if column.ty.is_attachment() {
                errors.push(FieldError::new(key, "must be uploaded as a file"));
                continue;
            }
            match coerce(column, raw) {
                Ok(value) => values.push((column.name, value)),
                Err(message) => errors.push(FieldError::new(key, message)),
            }
        }

        for upload in &self.uploads {
            match entity.column(&upload.field) {
                Some(column) if column.ty.is_attachment() && column.writable => {
                    if column.ty == ColumnType::Attachment
                        && self.uploads_for(column.name).len() > 1
                    {
                        errors.push(FieldError::new(column.name, "accepts a single file"));
                    }
                }
                _ => errors.push(FieldError::new(&upload.field, "does not accept files")),
            }
        }

        if mode == WriteMode::Create {
            for column in entity.columns {
                if column.required
                    && column.writable
                    && !self.fields.contains_key(column.name)
                    && self.uploads_for(column.name).is_empty()
                {
                    errors.push(FieldError::new(column.name, "is required"));
                }
            }
        }

        if errors.is_empty() {
            values.sort_by_key(|(name, _)| column_index(entity, name));
            Ok(values)
        } else {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            errors.dedup();
            Err(errors)
        }
    }
}

fn column_index(entity: &EntityDescriptor, name: &str) -> usize {
    entity
        .columns
        .iter()
        .position(|c| c.name == name)
        .unwrap_or(usize::MAX)
}

/// Coerce one JSON value to the column's type.
fn coerce(column: &Column, raw: &Value) -> Result<FieldValue, String> {
    if raw.is_null() {
        return if column.required {
            Err("must not be null".into())
        } else {
            Ok(FieldValue::Null)
        };
    }

    let value = match column.ty {
        ColumnType::Text | ColumnType::Attachment => FieldValue::Text(text(raw)?),
        ColumnType::Email => {
            let email = text(raw)?;
            if !is_email(&email) {
                return Err("must be an email address".into());
            }
            FieldValue::Text(email)
        }
        ColumnType::BigInt => FieldValue::Integer(integer(raw)?),
        ColumnType::Integer => {
            let n = integer(raw)?;
            i32::try_from(n).map_err(|_| "must be a 32-bit integer".to_string())?;
            FieldValue::Integer(n)
        }
        ColumnType::Boolean => FieldValue::Boolean(boolean(raw)?),
        ColumnType::TextArray | ColumnType::AttachmentList => FieldValue::TextList(list(raw)?),
        ColumnType::Timestamp => return Err("field is read-only".into()),
    };

    if column.required {
        match &value {
            FieldValue::Text(s) if s.trim().is_empty() => return Err("must not be empty".into()),
            FieldValue::TextList(items) if items.is_empty() => {
                return Err("must not be empty".into());
            }
            _ => {}
        }
    }

    if let (Some(max), FieldValue::Text(s)) = (column.max_length, &value)
        && s.chars().count() > max
    {
        return Err(format!("must be at most {max} characters"));
    }

    Ok(value)
}

fn text(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err("must be a string".into()),
    }
}

fn integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => n.as_i64().ok_or_else(|| "must be an integer".to_string()),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| "must be an integer".to_string()),
        _ => Err("must be an integer".into()),
    }
}

fn boolean(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err("must be a boolean".into()),
        },
        _ => Err("must be a boolean".into()),
    }
}

/// A JSON array of strings, a JSON array literal in a string, or a
/// comma-separated string.
fn list(raw: &Value) -> Result<Vec<String>, String> {
    match raw {
        Value::Array(items) => items.iter().map(text).collect(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                let parsed: Value = serde_json::from_str(trimmed)
                    .map_err(|_| "must be a list of strings".to_string())?;
                return match parsed {
                    Value::Array(_) => list(&parsed),
                    _ => Err("must be a list of strings".into()),
                };
            }
            Ok(trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect())
        }
        _ => Err("must be a list of strings".into()),
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}
