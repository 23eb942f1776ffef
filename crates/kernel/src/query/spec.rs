//! Code-authored query hints: which fields a search term is matched
//! against, which relations are eager-loaded and how they are projected.

use super::entity::{EntityDescriptor, Relation};
use super::error::SpecError;

/// A relation to eager-load together with the fields projected from it.
///
/// The target's primary key is always part of the projection.
#[derive(Debug, Clone)]
pub struct RelationView {
    pub relation: &'static Relation,
    pub fields: Vec<&'static str>,
}

// Relation names are unique per entity.
impl PartialEq for RelationView {
    fn eq(&self, other: &Self) -> bool {
        self.relation.name == other.relation.name && self.fields == other.fields
    }
}

impl Eq for RelationView {}

/// Validated query hints for one entity.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    entity: &'static EntityDescriptor,
    searchable: Vec<&'static str>,
    relations: Vec<RelationView>,
}

impl QuerySpec {
    pub fn builder(entity: &'static EntityDescriptor) -> QuerySpecBuilder {
        QuerySpecBuilder {
            entity,
            searchable: Vec::new(),
            relations: Vec::new(),
            projections: Vec::new(),
        }
    }

    pub fn entity(&self) -> &'static EntityDescriptor {
        self.entity
    }

    /// Fields a search term is matched against, in declaration order.
    pub fn searchable_fields(&self) -> &[&'static str] {
        &self.searchable
    }

    pub fn relations(&self) -> &[RelationView] {
        &self.relations
    }
}

/// Collects hints and validates them against the entity in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct QuerySpecBuilder {
    entity: &'static EntityDescriptor,
    searchable: Vec<&'static str>,
    relations: Vec<&'static str>,
    projections: Vec<(&'static str, Vec<&'static str>)>,
}

impl QuerySpecBuilder {
    pub fn search<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        for field in fields {
            if !self.searchable.contains(&field) {
                self.searchable.push(field);
            }
        }
        self
    }

    pub fn relation(mut self, name: &'static str) -> Self {
        self.relations.push(name);
        self
    }

    /// Restrict a loaded relation to a subset of its target's fields.
    pub fn select_relation<I>(mut self, name: &'static str, fields: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        self.projections.push((name, fields.into_iter().collect()));
        self
    }

    pub fn build(self) -> Result<QuerySpec, SpecError> {
        let entity = self.entity;

        for &field in &self.searchable {
            let column = entity.column(field).ok_or(SpecError::UnknownField {
                entity: entity.name,
                field,
            })?;
            if !column.ty.is_textual() {
                return Err(SpecError::NotSearchable {
                    entity: entity.name,
                    field,
                });
            }
        }

        for (name, _) in &self.projections {
            if !self.relations.contains(name) {
                return Err(SpecError::ProjectionWithoutRelation { relation: *name });
            }
        }

        let mut relations: Vec<RelationView> = Vec::with_capacity(self.relations.len());
        for &name in &self.relations {
            let relation = entity.relation(name).ok_or(SpecError::UnknownRelation {
                entity: entity.name,
                relation: name,
            })?;
            if relations.iter().any(|v| v.relation.name == relation.name) {
                return Err(SpecError::DuplicateRelation {
                    entity: entity.name,
                    relation: name,
                });
            }

            let requested = match self.projections.iter().rev().find(|(n, _)| *n == name) {
                Some((_, fields)) if fields.is_empty() => {
                    return Err(SpecError::EmptyProjection { relation: name });
                }
                Some((_, fields)) => fields.as_slice(),
                None => relation.default_fields,
            };

            let target = relation.target;
            let mut fields = vec![target.primary_key];
            for &field in requested {
                if !target.has_column(field) {
                    return Err(SpecError::UnknownRelationField {
                        relation: relation.name,
                        target: target.name,
                        field,
                    });
                }
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }

            relations.push(RelationView { relation, fields });
        }

        Ok(QuerySpec {
            entity,
            searchable: self.searchable,
            relations,
        })
    }
}
