//! Resource service.
//!
//! CRUD for every catalog resource on top of a [`ResourceStore`]: listing
//! goes through the data query engine, writes are validated against the
//! entity's columns and keep uploaded attachments in step with the row.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::catalog::Resource;
use super::input::{FieldError, ResourceInput, WriteMode};
use crate::file::{AttachmentError, AttachmentService};
use crate::query::{ColumnType, DataQueryEngine, PaginatedResult, QueryError, QueryRequest};
use crate::store::{FieldValue, ResourceStore, StoreError};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{entity} with {field} '{value}' already exists")]
    Conflict {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("authentication required")]
    Unauthenticated,

    #[error("failed to delete associated file {reference}")]
    AttachmentCleanup {
        reference: String,
        #[source]
        source: AttachmentError,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

impl From<FieldError> for ResourceError {
    fn from(error: FieldError) -> Self {
        Self::Validation(vec![error])
    }
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub id: i64,
    pub message: String,
}

/// CRUD operations shared by every resource.
#[derive(Clone)]
pub struct ResourceService {
    inner: Arc<ResourceServiceInner>,
}

struct ResourceServiceInner {
    store: Arc<dyn ResourceStore>,
    engine: DataQueryEngine,
    attachments: AttachmentService,
}

impl ResourceService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        engine: DataQueryEngine,
        attachments: AttachmentService,
    ) -> Self {
        Self {
            inner: Arc::new(ResourceServiceInner {
                store,
                engine,
                attachments,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.inner.store
    }

    pub fn engine(&self) -> DataQueryEngine {
        self.inner.engine
    }

    pub fn attachments(&self) -> &AttachmentService {
        &self.inner.attachments
    }

    /// One page of rows matching `request`.
    pub async fn list(
        &self,
        resource: &Resource,
        request: &QueryRequest,
    ) -> Result<PaginatedResult<Value>, ResourceError> {
        let page = self
            .inner
            .engine
            .execute(&resource.spec, request, self.inner.store.as_ref())
            .await?;
        Ok(page)
    }

    /// One row with the resource's relations attached.
    pub async fn get(&self, resource: &Resource, id: i64) -> Result<Value, ResourceError> {
        let entity = resource.entity();
        self.inner
            .store
            .find_by_key(entity, resource.spec.relations(), id)
            .await?
            .ok_or(ResourceError::NotFound {
                entity: entity.name,
                id,
            })
    }

    /// Validate `input`, store its files and insert the row.
    ///
    /// `owner` fills the resource's owner column. Files written before a
    /// failed insert are removed again.
    pub async fn create(
        &self,
        resource: &Resource,
        input: &ResourceInput,
        owner: Option<i64>,
    ) -> Result<Value, ResourceError> {
        let entity = resource.entity();
        let definition = resource.definition;
        let mut values = input
            .validate(entity, WriteMode::Create)
            .map_err(ResourceError::Validation)?;

        self.check_unique(resource, &values, None).await?;

        if let Some(column) = definition.owner_column {
            let owner = owner.ok_or(ResourceError::Unauthenticated)?;
            values.push((column, FieldValue::Integer(owner)));
        }

        let mut stored = Vec::new();
        for column in entity.attachment_columns() {
            let uploads = input.uploads_for(column.name);
            if uploads.is_empty() {
                continue;
            }
            let references = match self.inner.attachments.store_all(&uploads).await {
                Ok(references) => references,
                Err(e) => {
                    self.inner.attachments.discard(&stored).await;
                    return Err(e.into());
                }
            };
            values.push((column.name, attachment_value(column.ty, &references)));
            stored.extend(references);
        }

        let row = match self.inner.store.insert(entity, &values).await {
            Ok(row) => row,
            Err(e) => {
                self.inner.attachments.discard(&stored).await;
                return Err(e.into());
            }
        };

        let Some(id) = row.get(entity.primary_key).and_then(Value::as_i64) else {
            return Ok(row);
        };
        info!(resource = definition.slug, id, files = stored.len(), "record created");

        let loaded = self
            .inner
            .store
            .find_by_key(entity, resource.spec.relations(), id)
            .await?;
        Ok(loaded.unwrap_or(row))
    }

    /// Apply a partial update.
    ///
    /// A file uploaded for an attachment column replaces the stored
    /// reference; list columns are replaced position by position and keep
    /// any trailing references no file was sent for. Superseded files are
    /// removed after the row is written.
    pub async fn update(
        &self,
        resource: &Resource,
        id: i64,
        input: &ResourceInput,
    ) -> Result<Value, ResourceError> {
        let entity = resource.entity();
        let mut values = input
            .validate(entity, WriteMode::Update)
            .map_err(ResourceError::Validation)?;

        let existing = self
            .inner
            .store
            .find_by_key(entity, &[], id)
            .await?
            .ok_or(ResourceError::NotFound {
                entity: entity.name,
                id,
            })?;

        self.check_unique(resource, &values, Some(id)).await?;

        let mut stored = Vec::new();
        let mut superseded = Vec::new();
        for column in entity.attachment_columns() {
            let uploads = input.uploads_for(column.name);
            if uploads.is_empty() {
                continue;
            }
            let fresh = match self.inner.attachments.store_all(&uploads).await {
                Ok(references) => references,
                Err(e) => {
                    self.inner.attachments.discard(&stored).await;
                    return Err(e.into());
                }
            };
            let old = references_in(existing.get(column.name));
            let merged = match column.ty {
                ColumnType::AttachmentList => {
                    let replaced = fresh.len().min(old.len());
                    superseded.extend(old[..replaced].iter().cloned());
                    fresh
                        .iter()
                        .cloned()
                        .chain(old[replaced..].iter().cloned())
                        .collect()
                }
                _ => {
                    superseded.extend(old);
                    fresh.clone()
                }
            };
            values.push((column.name, attachment_value(column.ty, &merged)));
            stored.extend(fresh);
        }

        match self.inner.store.update(entity, id, &values).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.inner.attachments.discard(&stored).await;
                return Err(ResourceError::NotFound {
                    entity: entity.name,
                    id,
                });
            }
            Err(e) => {
                self.inner.attachments.discard(&stored).await;
                return Err(e.into());
            }
        }

        self.inner.attachments.discard(&superseded).await;
        info!(
            resource = resource.slug(),
            id,
            fields = values.len(),
            replaced_files = superseded.len(),
            "record updated"
        );

        self.get(resource, id).await
    }

    /// Delete a row after removing its attachments. A reference that cannot
    /// be resolved aborts the delete before any file is removed and leaves
    /// the row in place.
    pub async fn delete(&self, resource: &Resource, id: i64) -> Result<Deleted, ResourceError> {
        let entity = resource.entity();
        let existing = self
            .inner
            .store
            .find_by_key(entity, &[], id)
            .await?
            .ok_or(ResourceError::NotFound {
                entity: entity.name,
                id,
            })?;

        let references: Vec<String> = entity
            .attachment_columns()
            .flat_map(|column| references_in(existing.get(column.name)))
            .collect();

        // Every reference is checked before the first file is removed.
        for reference in &references {
            if let Err(source) = self.inner.attachments.ensure_removable(reference).await {
                return Err(ResourceError::AttachmentCleanup {
                    reference: reference.clone(),
                    source,
                });
            }
        }
        for reference in references {
            if let Err(source) = self.inner.attachments.delete(&reference).await {
                return Err(ResourceError::AttachmentCleanup { reference, source });
            }
        }

        if !self.inner.store.delete(entity, id).await? {
            return Err(ResourceError::NotFound {
                entity: entity.name,
                id,
            });
        }

        info!(resource = resource.slug(), id, "record deleted");
        Ok(Deleted {
            id,
            message: format!("{} deleted successfully", entity.name),
        })
    }

    async fn check_unique(
        &self,
        resource: &Resource,
        values: &[(&'static str, FieldValue)],
        exclude: Option<i64>,
    ) -> Result<(), ResourceError> {
        let Some(field) = resource.definition.unique_field else {
            return Ok(());
        };
        let Some((_, value)) = values.iter().find(|(name, _)| *name == field) else {
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }

        let entity = resource.entity();
        if self
            .inner
            .store
            .exists_with(entity, field, value, exclude)
            .await?
        {
            debug!(resource = resource.slug(), field, "duplicate value rejected");
            let value = match value.to_json() {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(ResourceError::Conflict {
                entity: entity.name,
                field,
                value,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResourceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("store", &self.inner.store.backend())
            .field("engine", &self.inner.engine)
            .finish()
    }
}

fn attachment_value(ty: ColumnType, references: &[String]) -> FieldValue {
    match ty {
        ColumnType::AttachmentList => FieldValue::TextList(references.to_vec()),
        _ => references
            .first()
            .cloned()
            .map_or(FieldValue::Null, FieldValue::Text),
    }
}

/// File references held in a stored attachment value.
fn references_in(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::content::Catalog;
    use crate::content::entities::{ARTICLE_CATEGORIES, ARTICLES};
    use crate::file::{LocalFileStorage, Upload};
    use crate::store::MemoryStore;
    use serde_json::json;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    struct Fixture {
        service: ResourceService,
        store: Arc<MemoryStore>,
        catalog: Catalog,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let attachments =
            AttachmentService::new(Arc::new(LocalFileStorage::new(dir.path(), "/files")));
        let service = ResourceService::new(store.clone(), DataQueryEngine::default(), attachments);
        Fixture {
            service,
            store,
            catalog: Catalog::standard().unwrap(),
            _dir: dir,
        }
    }

    fn png(field: &str) -> Upload {
        Upload {
            field: field.into(),
            filename: "cover.png".into(),
            content_type: Some("image/png".into()),
            data: PNG.to_vec(),
        }
    }

    fn article(title: &str) -> ResourceInput {
        ResourceInput::from_json(json!({
            "article_title": title,
            "slug": title.to_lowercase(),
            "article_description": "about",
            "publish_time": "2024-05-01",
            "article_category_id": 1,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_sets_owner_and_loads_relation() {
        let f = fixture();
        f.store
            .seed(&ARTICLE_CATEGORIES, [json!({"id": 1, "name": "Systems"})])
            .unwrap();
        let articles = f.catalog.get("articles").unwrap();

        let row = f.service.create(articles, &article("Rust"), Some(7)).await.unwrap();
        assert_eq!(row["added_by"], json!(7));
        assert_eq!(row["articleCategory"], json!({"id": 1, "name": "Systems"}));
    }

    #[tokio::test]
    async fn create_requires_owner_for_owned_resources() {
        let f = fixture();
        let articles = f.catalog.get("articles").unwrap();
        let err = f.service.create(articles, &article("Rust"), None).await.unwrap_err();
        assert!(matches!(err, ResourceError::Unauthenticated));
    }

    #[tokio::test]
    async fn duplicate_unique_field_conflicts() {
        let f = fixture();
        f.store
            .seed(&ARTICLE_CATEGORIES, [json!({"id": 1, "name": "Systems"})])
            .unwrap();
        let articles = f.catalog.get("articles").unwrap();

        f.service.create(articles, &article("Rust"), Some(1)).await.unwrap();
        let err = f.service.create(articles, &article("Rust"), Some(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Conflict { field: "article_title", .. }
        ));
    }

    #[tokio::test]
    async fn update_keeps_own_unique_value() {
        let f = fixture();
        let categories = f.catalog.get("article-categories").unwrap();
        let created = f
            .service
            .create(
                categories,
                &ResourceInput::from_json(json!({"name": "Systems"})).unwrap(),
                None,
            )
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();

        let same = ResourceInput::from_json(json!({"name": "Systems"})).unwrap();
        let row = f.service.update(categories, id, &same).await.unwrap();
        assert_eq!(row["name"], "Systems");
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let f = fixture();
        let categories = f.catalog.get("article-categories").unwrap();
        let input = ResourceInput::from_json(json!({"name": "x"})).unwrap();

        assert!(matches!(
            f.service.get(categories, 99).await,
            Err(ResourceError::NotFound { id: 99, .. })
        ));
        assert!(matches!(
            f.service.update(categories, 99, &input).await,
            Err(ResourceError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.delete(categories, 99).await,
            Err(ResourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn thumbnail_replaced_and_removed() {
        let f = fixture();
        f.store
            .seed(&ARTICLE_CATEGORIES, [json!({"id": 1, "name": "Systems"})])
            .unwrap();
        let articles = f.catalog.get("articles").unwrap();
        let storage = f.service.attachments().storage().clone();

        let row = f
            .service
            .create(articles, &article("Rust").with_upload(png("thumbnail")), Some(1))
            .await
            .unwrap();
        let id = row["id"].as_i64().unwrap();
        let first = row["thumbnail"].as_str().unwrap().to_string();
        let first_uri = storage.uri_for_url(&first).unwrap();
        assert!(storage.exists(&first_uri).await.unwrap());

        let patch = ResourceInput::new().with_upload(png("thumbnail"));
        let row = f.service.update(articles, id, &patch).await.unwrap();
        let second = row["thumbnail"].as_str().unwrap().to_string();
        assert_ne!(first, second);
        assert!(!storage.exists(&first_uri).await.unwrap());
        let second_uri = storage.uri_for_url(&second).unwrap();
        assert!(storage.exists(&second_uri).await.unwrap());

        let untouched = ResourceInput::from_json(json!({"slug": "rust-2"})).unwrap();
        let row = f.service.update(articles, id, &untouched).await.unwrap();
        assert_eq!(row["thumbnail"], json!(second));

        let deleted = f.service.delete(articles, id).await.unwrap();
        assert_eq!(deleted.id, id);
        assert!(!storage.exists(&second_uri).await.unwrap());
        assert!(f.store.is_empty(&ARTICLES));
    }

    #[tokio::test]
    async fn photo_list_replaced_by_position() {
        let f = fixture();
        let details = f.catalog.get("article-details").unwrap();
        f.store
            .seed(
                details.entity(),
                [json!({
                    "id": 5,
                    "title": "t",
                    "points": ["a"],
                    "photo": ["https://cdn.example.com/1.png", "https://cdn.example.com/2.png"],
                    "description": "d",
                    "article_id": null,
                })],
            )
            .unwrap();

        let patch = ResourceInput::new().with_upload(png("photo"));
        let row = f.service.update(details, 5, &patch).await.unwrap();
        let photos = row["photo"].as_array().unwrap();
        assert_eq!(photos.len(), 2);
        assert!(photos[0].as_str().unwrap().starts_with("/files/"));
        assert_eq!(photos[1], json!("https://cdn.example.com/2.png"));
    }

    #[tokio::test]
    async fn invalid_reference_leaves_no_files() {
        let f = fixture();
        let articles = f.catalog.get("articles").unwrap();

        let err = f
            .service
            .create(articles, &article("Rust").with_upload(png("thumbnail")), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Store(StoreError::InvalidReference { .. })
        ));
        assert!(f.store.is_empty(&ARTICLES));
        assert_eq!(count_files(f._dir.path()), 0);
    }

    #[tokio::test]
    async fn unresolvable_reference_keeps_every_file() {
        let f = fixture();
        let details = f.catalog.get("article-details").unwrap();
        let kept = f.service.attachments().store(&png("photo")).await.unwrap();
        f.store
            .seed(
                details.entity(),
                [json!({
                    "id": 3,
                    "title": "t",
                    "points": ["a"],
                    "photo": [kept.clone(), "/files/../../escape.png"],
                    "description": "d",
                    "article_id": null,
                })],
            )
            .unwrap();

        let err = f.service.delete(details, 3).await.unwrap_err();
        assert!(matches!(err, ResourceError::AttachmentCleanup { .. }));

        let storage = f.service.attachments().storage().clone();
        let kept_uri = storage.uri_for_url(&kept).unwrap();
        assert!(storage.exists(&kept_uri).await.unwrap());
        assert!(f.service.get(details, 3).await.is_ok());
    }

    fn count_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .map(|path| if path.is_dir() { count_files(&path) } else { 1 })
            .sum()
    }

    #[tokio::test]
    async fn list_goes_through_engine() {
        let f = fixture();
        f.store
            .seed(
                &ARTICLE_CATEGORIES,
                [json!({"name": "Beta"}), json!({"name": "alpha"}), json!({"name": "Gamma"})],
            )
            .unwrap();
        let categories = f.catalog.get("article-categories").unwrap();

        let page = f
            .service
            .list(categories, &QueryRequest::new().with_search("A").with_limit(2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
    }
}
