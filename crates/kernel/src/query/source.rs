//! The seam between the engine and a store.

use async_trait::async_trait;

use super::entity::{EntityDescriptor, OrderBy};
use super::predicate::Predicate;
use super::spec::RelationView;
use crate::store::StoreError;

/// Everything a source needs to produce one page of rows.
#[derive(Debug, Clone, Copy)]
pub struct FindRequest<'a> {
    pub predicate: &'a Predicate,
    pub relations: &'a [RelationView],
    pub order: &'a [OrderBy],
    pub offset: u64,
    pub limit: u64,
}

/// A store the engine can count and page through.
///
/// Sources never see raw request input: predicates, relation views and
/// ordering have already been validated against the entity descriptor.
#[async_trait]
pub trait QueryableSource: Send + Sync {
    type Row: Send;

    /// Number of primary rows matching `predicate`.
    async fn count(
        &self,
        entity: &'static EntityDescriptor,
        predicate: &Predicate,
    ) -> Result<u64, StoreError>;

    /// One ordered window of matching rows with relations attached.
    async fn find(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<Vec<Self::Row>, StoreError>;

    /// Count and page together.
    ///
    /// The default runs [`count`](Self::count) then [`find`](Self::find);
    /// sources override it to read both from one snapshot.
    async fn fetch_page(
        &self,
        entity: &'static EntityDescriptor,
        request: FindRequest<'_>,
    ) -> Result<(u64, Vec<Self::Row>), StoreError> {
        let total = self.count(entity, request.predicate).await?;
        let rows = self.find(entity, request).await?;
        Ok((total, rows))
    }
}
