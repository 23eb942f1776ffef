//! Resource catalog.
//!
//! Binds each URL slug to an entity descriptor, its list-query hints and its
//! write policy. The whole catalog is validated by [`Catalog::build`] at
//! startup; a descriptor or hint that names a missing column is a
//! [`SpecError`] and the process does not start.

use std::collections::HashMap;

use crate::query::{ColumnType, EntityDescriptor, QuerySpec, SpecError};

use super::entities::*;

/// Who may call which operations on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Public reads, authenticated writes.
    Editorial,
    /// Anyone may create; reading and managing entries needs a token.
    Inbox,
}

impl Access {
    pub fn public_read(self) -> bool {
        matches!(self, Self::Editorial)
    }

    pub fn public_create(self) -> bool {
        matches!(self, Self::Inbox)
    }
}

/// Static definition of one HTTP resource.
#[derive(Debug)]
pub struct ResourceDefinition {
    pub slug: &'static str,
    pub entity: &'static EntityDescriptor,
    pub search: &'static [&'static str],
    pub relations: &'static [&'static str],
    pub projections: &'static [(&'static str, &'static [&'static str])],
    /// Column whose value must be unique among rows; duplicates are a conflict.
    pub unique_field: Option<&'static str>,
    /// Column set from the authenticated user's id on create.
    pub owner_column: Option<&'static str>,
    pub access: Access,
}

pub static RESOURCES: &[ResourceDefinition] = &[
    ResourceDefinition {
        slug: "articles",
        entity: &ARTICLES,
        search: &["article_title", "article_description", "article_tags"],
        relations: &["articleCategory"],
        projections: &[("articleCategory", &["name"])],
        unique_field: Some("article_title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "article-categories",
        entity: &ARTICLE_CATEGORIES,
        search: &["name"],
        relations: &[],
        projections: &[],
        unique_field: Some("name"),
        owner_column: None,
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "article-details",
        entity: &ARTICLE_DETAILS,
        search: &["title"],
        relations: &["article"],
        projections: &[(
            "article",
            &["article_title", "thumbnail", "article_tags", "publish_time"],
        )],
        unique_field: Some("title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "projects",
        entity: &PROJECTS,
        search: &["project_tags", "project_description", "project_title"],
        relations: &["projectCategory"],
        projections: &[("projectCategory", &["name"])],
        unique_field: Some("project_title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "project-categories",
        entity: &PROJECT_CATEGORIES,
        search: &["name"],
        relations: &[],
        projections: &[],
        unique_field: Some("name"),
        owner_column: None,
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "project-details",
        entity: &PROJECT_DETAILS,
        search: &["title"],
        relations: &["project"],
        projections: &[("project", &["project_title", "thumbnail"])],
        unique_field: Some("title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "research-and-publications",
        entity: &RESEARCH_AND_PUBLICATIONS,
        search: &["title", "publisher", "journal", "doi"],
        relations: &[],
        projections: &[],
        unique_field: Some("doi"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "section-descriptions",
        entity: &SECTION_DESCRIPTIONS,
        search: &["title", "description"],
        relations: &[],
        projections: &[],
        unique_field: Some("title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "send-messages",
        entity: &SEND_MESSAGES,
        search: &["name", "email"],
        relations: &[],
        projections: &[],
        unique_field: None,
        owner_column: None,
        access: Access::Inbox,
    },
    ResourceDefinition {
        slug: "collaborating",
        entity: &COLLABORATE,
        search: &["title"],
        relations: &[],
        projections: &[],
        unique_field: Some("title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "skills",
        entity: &SKILLS,
        search: &["skill_title"],
        relations: &["skillsCategory"],
        projections: &[],
        unique_field: Some("skill_title"),
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "skills-categories",
        entity: &SKILLS_CATEGORIES,
        search: &["name"],
        relations: &[],
        projections: &[],
        unique_field: Some("name"),
        owner_column: None,
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "professors",
        entity: &PROFESSORS,
        search: &["professor_name", "department", "institute"],
        relations: &[],
        projections: &[],
        unique_field: None,
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "about-me",
        entity: &ABOUT_ME,
        search: &["title", "sub_title"],
        relations: &[],
        projections: &[],
        unique_field: None,
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "experience",
        entity: &EXPERIENCES,
        search: &["title", "organization", "location"],
        relations: &[],
        projections: &[],
        unique_field: None,
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
    ResourceDefinition {
        slug: "home-about-section",
        entity: &HOME_ABOUT_SECTION,
        search: &["title", "description"],
        relations: &[],
        projections: &[],
        unique_field: None,
        owner_column: Some("added_by"),
        access: Access::Editorial,
    },
];

/// A resource definition with its validated query spec.
#[derive(Debug)]
pub struct Resource {
    pub definition: &'static ResourceDefinition,
    pub spec: QuerySpec,
}

impl Resource {
    pub fn slug(&self) -> &'static str {
        self.definition.slug
    }

    pub fn entity(&self) -> &'static EntityDescriptor {
        self.definition.entity
    }
}

/// Every resource the server exposes, keyed by slug.
#[derive(Debug)]
pub struct Catalog {
    resources: Vec<Resource>,
    by_slug: HashMap<&'static str, usize>,
}

impl Catalog {
    /// The resources served by the binary.
    pub fn standard() -> Result<Self, SpecError> {
        Self::build(RESOURCES)
    }

    /// Validate every definition and build its query spec.
    pub fn build(definitions: &'static [ResourceDefinition]) -> Result<Self, SpecError> {
        let mut resources = Vec::with_capacity(definitions.len());
        let mut by_slug = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            let entity = definition.entity;
            entity.validate()?;
            for relation in entity.relations {
                relation.target.validate()?;
            }

            if let Some(field) = definition.unique_field {
                match entity.column(field) {
                    Some(column) if column.ty.is_scalar() => {}
                    Some(_) => {
                        return Err(SpecError::NotFilterable {
                            entity: entity.name,
                            field,
                        });
                    }
                    None => {
                        return Err(SpecError::UnknownField {
                            entity: entity.name,
                            field,
                        });
                    }
                }
            }

            if let Some(field) = definition.owner_column {
                match entity.column(field) {
                    Some(column) if column.ty == ColumnType::BigInt => {}
                    _ => {
                        return Err(SpecError::UnknownField {
                            entity: entity.name,
                            field,
                        });
                    }
                }
            }

            let mut builder = QuerySpec::builder(entity).search(definition.search.iter().copied());
            for relation in definition.relations {
                builder = builder.relation(relation);
            }
            for (relation, fields) in definition.projections {
                builder = builder.select_relation(relation, fields.iter().copied());
            }
            let spec = builder.build()?;

            if by_slug.insert(definition.slug, resources.len()).is_some() {
                return Err(SpecError::DuplicateResource {
                    slug: definition.slug,
                });
            }
            resources.push(Resource { definition, spec });
        }

        Ok(Self { resources, by_slug })
    }

    pub fn get(&self, slug: &str) -> Option<&Resource> {
        self.by_slug.get(slug).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every entity a resource reads, including relation targets, once each.
    pub fn entities(&self) -> Vec<&'static EntityDescriptor> {
        let mut seen: Vec<&'static EntityDescriptor> = Vec::new();
        for resource in &self.resources {
            let entity = resource.entity();
            let targets = entity.relations.iter().map(|r| r.target);
            for candidate in std::iter::once(entity).chain(targets) {
                if !seen.iter().any(|e| e.table == candidate.table) {
                    seen.push(candidate);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::OrderBy;

    #[test]
    fn standard_catalog_is_valid() {
        let catalog = Catalog::standard().unwrap();
        assert_eq!(catalog.len(), RESOURCES.len());
        assert_eq!(catalog.len(), 16);
    }

    #[test]
    fn articles_project_category_name() {
        let catalog = Catalog::standard().unwrap();
        let articles = catalog.get("articles").unwrap();
        let view = &articles.spec.relations()[0];
        assert_eq!(view.relation.name, "articleCategory");
        assert_eq!(view.fields, vec!["id", "name"]);
        assert_eq!(
            articles.spec.searchable_fields(),
            ["article_title", "article_description", "article_tags"]
        );
    }

    #[test]
    fn skills_load_default_category_shape() {
        let catalog = Catalog::standard().unwrap();
        let skills = catalog.get("skills").unwrap();
        assert_eq!(skills.spec.relations()[0].fields, vec!["id", "name"]);
    }

    #[test]
    fn project_details_table_name() {
        let catalog = Catalog::standard().unwrap();
        assert_eq!(catalog.get("project-details").unwrap().entity().table, "project_detail");
    }

    #[test]
    fn experience_lists_latest_first() {
        let catalog = Catalog::standard().unwrap();
        let experience = catalog.get("experience").unwrap();
        assert_eq!(
            experience.entity().ordering(),
            vec![OrderBy::desc("start_date"), OrderBy::asc("id")]
        );
        assert!(catalog.get("home-about-section").unwrap().entity().has_column("thumbnail_image"));
    }

    #[test]
    fn unknown_slug() {
        assert!(Catalog::standard().unwrap().get("users").is_none());
    }

    #[test]
    fn inbox_access() {
        let catalog = Catalog::standard().unwrap();
        let access = catalog.get("send-messages").unwrap().definition.access;
        assert!(access.public_create());
        assert!(!access.public_read());
        assert!(Access::Editorial.public_read());
    }

    #[test]
    fn entities_are_distinct() {
        let catalog = Catalog::standard().unwrap();
        let entities = catalog.entities();
        assert_eq!(entities.len(), 16);
        let mut tables: Vec<_> = entities.iter().map(|e| e.table).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), 16);
    }

    #[test]
    fn duplicate_slug_rejected() {
        static TWICE: &[ResourceDefinition] = &[
            ResourceDefinition {
                slug: "about-me",
                entity: &ABOUT_ME,
                search: &[],
                relations: &[],
                projections: &[],
                unique_field: None,
                owner_column: None,
                access: Access::Editorial,
            },
            ResourceDefinition {
                slug: "about-me",
                entity: &ABOUT_ME,
                search: &[],
                relations: &[],
                projections: &[],
                unique_field: None,
                owner_column: None,
                access: Access::Editorial,
            },
        ];
        assert!(matches!(
            Catalog::build(TWICE),
            Err(SpecError::DuplicateResource { slug: "about-me" })
        ));
    }

    #[test]
    fn bad_search_field_fails_build() {
        static BAD: &[ResourceDefinition] = &[ResourceDefinition {
            slug: "skills",
            entity: &SKILLS,
            search: &["skill_amount"],
            relations: &[],
            projections: &[],
            unique_field: None,
            owner_column: None,
            access: Access::Editorial,
        }];
        assert!(matches!(
            Catalog::build(BAD),
            Err(SpecError::NotSearchable { .. })
        ));
    }
}
