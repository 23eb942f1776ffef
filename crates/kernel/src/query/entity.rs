//! Static entity descriptors.
//!
//! Each record type the engine can query is described once, at compile
//! time, by an [`EntityDescriptor`]: its table, primary key, typed columns,
//! to-one relations and canonical order. Descriptors are validated when the
//! catalog is built so that a bad column or relation name stops the process
//! at startup instead of surfacing as a SQL error at request time.

use serde::Serialize;

use super::error::SpecError;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    /// Text that must look like an email address.
    Email,
    BigInt,
    Integer,
    Boolean,
    TextArray,
    Timestamp,
    /// Single file reference stored as text.
    Attachment,
    /// Several file references stored as a text array.
    AttachmentList,
}

impl ColumnType {
    /// Whether values of this type can be matched by substring search.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::Email | Self::Attachment)
    }

    /// Whether a request parameter can be coerced to a value of this type.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Email
                | Self::BigInt
                | Self::Integer
                | Self::Boolean
                | Self::Attachment
        )
    }

    /// Whether the column holds uploaded file references.
    pub fn is_attachment(self) -> bool {
        matches!(self, Self::Attachment | Self::AttachmentList)
    }

    /// Whether a PostgreSQL `information_schema` data type can back this column.
    pub fn accepts_sql_type(self, data_type: &str) -> bool {
        match self {
            Self::Text | Self::Email | Self::Attachment => {
                matches!(data_type, "text" | "character varying" | "character")
            }
            Self::BigInt => data_type == "bigint",
            Self::Integer => matches!(data_type, "integer" | "smallint"),
            Self::Boolean => data_type == "boolean",
            Self::TextArray | Self::AttachmentList => data_type == "ARRAY",
            Self::Timestamp => data_type.starts_with("timestamp"),
        }
    }
}

/// A column of an entity's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    /// Usable as an exact-match filter in list requests.
    pub filterable: bool,
    /// Must be supplied on create.
    pub required: bool,
    /// Accepted in create/update payloads.
    pub writable: bool,
    /// Longest accepted text value, in characters.
    pub max_length: Option<usize>,
}

impl Column {
    /// A writable, optional, non-filterable column.
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            filterable: false,
            required: false,
            writable: true,
            max_length: None,
        }
    }

    pub const fn filterable(self) -> Self {
        Self {
            filterable: true,
            ..self
        }
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub const fn max_length(self, max: usize) -> Self {
        Self {
            max_length: Some(max),
            ..self
        }
    }

    /// Maintained by the store (keys, timestamps, owner).
    pub const fn read_only(self) -> Self {
        Self {
            writable: false,
            ..self
        }
    }
}

/// Sort direction for canonical ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One term of an entity's canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl OrderBy {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

/// A to-one association: `local_field` on the owning row holds the primary
/// key of a row in `target`.
///
/// Because the join is to-one, eager-loading it never multiplies or drops
/// primary rows.
#[derive(Debug)]
pub struct Relation {
    /// Key under which the related object appears in result rows.
    pub name: &'static str,
    pub target: &'static EntityDescriptor,
    pub local_field: &'static str,
    /// Fields loaded when no projection is requested.
    pub default_fields: &'static [&'static str],
}

/// Static description of a queryable entity.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [Column],
    pub relations: &'static [Relation],
    /// Canonical order; the primary key is appended as a tie-break.
    pub order: &'static [OrderBy],
}

impl EntityDescriptor {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        let columns: &'static [Column] = self.columns;
        columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        let relations: &'static [Relation] = self.relations;
        relations.iter().find(|r| r.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of the columns accepted as list filters.
    pub fn filterable_fields(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.filterable)
            .map(|c| c.name)
            .collect()
    }

    /// Columns holding file references.
    pub fn attachment_columns(&self) -> impl Iterator<Item = &'static Column> + use<> {
        let columns: &'static [Column] = self.columns;
        columns.iter().filter(|c| c.ty.is_attachment())
    }

    /// Canonical order followed by the primary key, unless the order
    /// already ends on it.
    pub fn ordering(&self) -> Vec<OrderBy> {
        let mut order = self.order.to_vec();
        if !order.iter().any(|o| o.column == self.primary_key) {
            order.push(OrderBy::asc(self.primary_key));
        }
        order
    }

    /// Check that every name this descriptor mentions resolves.
    pub fn validate(&self) -> Result<(), SpecError> {
        match self.column(self.primary_key) {
            Some(c) if matches!(c.ty, ColumnType::BigInt | ColumnType::Integer) => {}
            Some(_) => {
                return Err(SpecError::InvalidPrimaryKey {
                    entity: self.name,
                    field: self.primary_key,
                });
            }
            None => {
                return Err(SpecError::UnknownField {
                    entity: self.name,
                    field: self.primary_key,
                });
            }
        }

        for column in self.columns {
            if column.filterable && !column.ty.is_scalar() {
                return Err(SpecError::NotFilterable {
                    entity: self.name,
                    field: column.name,
                });
            }
        }

        for order in self.order {
            if !self.has_column(order.column) {
                return Err(SpecError::UnknownField {
                    entity: self.name,
                    field: order.column,
                });
            }
        }

        for (i, relation) in self.relations.iter().enumerate() {
            if self.relations[..i].iter().any(|r| r.name == relation.name) {
                return Err(SpecError::DuplicateRelation {
                    entity: self.name,
                    relation: relation.name,
                });
            }
            if !self.has_column(relation.local_field) {
                return Err(SpecError::UnknownField {
                    entity: self.name,
                    field: relation.local_field,
                });
            }
            if self.has_column(relation.name) {
                return Err(SpecError::RelationShadowsColumn {
                    entity: self.name,
                    relation: relation.name,
                });
            }
            for field in relation.default_fields {
                if !relation.target.has_column(field) {
                    return Err(SpecError::UnknownRelationField {
                        relation: relation.name,
                        target: relation.target.name,
                        field,
                    });
                }
            }
        }

        Ok(())
    }
}
