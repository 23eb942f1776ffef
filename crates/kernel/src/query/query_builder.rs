//! Data query builder using SeaQuery.
//!
//! Generates the PostgreSQL statements behind a list or detail request:
//! - COUNT over the primary table with the predicate, no joins
//! - one page with LEFT JOINed to-one relations, projected as JSON objects
//! - deterministic ORDER BY with the primary key as final tie-break
//!
//! Page and detail statements return one JSON document per row
//! (`row_to_json`) so sources never map columns by hand.

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, JoinType, LikeExpr, Order, PostgresQueryBuilder,
    Query, SelectStatement, SimpleExpr, Value,
};

use super::entity::{EntityDescriptor, OrderBy, SortDirection};
use super::predicate::{Predicate, Scalar};
use super::spec::RelationView;

/// Alias of the derived table wrapped by `row_to_json`.
const ROW_ALIAS: &str = "t";

/// Query builder for one entity and a set of eager-loaded relations.
pub struct DataQueryBuilder<'a> {
    entity: &'static EntityDescriptor,
    relations: &'a [RelationView],
    order: Vec<OrderBy>,
}

impl<'a> DataQueryBuilder<'a> {
    pub fn new(entity: &'static EntityDescriptor, relations: &'a [RelationView]) -> Self {
        Self {
            entity,
            relations,
            order: entity.ordering(),
        }
    }

    /// Override the entity's canonical ordering.
    pub fn with_order(mut self, order: &[OrderBy]) -> Self {
        self.order = order.to_vec();
        self
    }

    /// Build a COUNT query for the rows matching `predicate`.
    pub fn build_count(&self, predicate: &Predicate) -> String {
        let mut query = Query::select();
        query
            .expr(Expr::col(Asterisk).count())
            .from(Alias::new(self.entity.table));
        if !predicate.is_match_all() {
            query.cond_where(condition(self.entity.table, predicate));
        }
        query.to_string(PostgresQueryBuilder)
    }

    /// Build the page query: `limit` rows after skipping `offset`.
    pub fn build_page(&self, predicate: &Predicate, offset: u64, limit: u64) -> String {
        let mut query = self.select();
        if !predicate.is_match_all() {
            query.cond_where(condition(self.entity.table, predicate));
        }
        self.add_order(&mut query, self.entity.table);
        query.limit(limit).offset(offset);
        self.wrap_rows(query)
    }

    /// Build a single-row lookup by primary key.
    pub fn build_by_key(&self, key: i64) -> String {
        let mut query = self.select();
        query
            .and_where(column(self.entity.table, self.entity.primary_key).eq(key))
            .limit(1);
        self.wrap_rows(query)
    }

    /// `SELECT base.*` plus one JSON object column per relation.
    fn select(&self) -> SelectStatement {
        let base = Alias::new(self.entity.table);
        let mut query = Query::select();
        query.column((base.clone(), Asterisk)).from(base.clone());

        for view in self.relations {
            let relation = view.relation;
            let alias = Alias::new(relation.name);
            query.join_as(
                JoinType::LeftJoin,
                Alias::new(relation.target.table),
                alias.clone(),
                Expr::col((base.clone(), Alias::new(relation.local_field)))
                    .equals((alias.clone(), Alias::new(relation.target.primary_key))),
            );
            query.expr_as(relation_object(view), alias);
        }

        query
    }

    fn add_order(&self, query: &mut SelectStatement, table: &str) {
        for term in &self.order {
            let direction = match term.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            query.order_by((Alias::new(table), Alias::new(term.column)), direction);
        }
    }

    /// Wrap a row query so each row comes back as one JSON document, keeping
    /// the inner ordering.
    fn wrap_rows(&self, inner: SelectStatement) -> String {
        let mut outer = Query::select();
        outer
            .expr(Expr::cust(format!("row_to_json({ROW_ALIAS})")))
            .from_subquery(inner, Alias::new(ROW_ALIAS));
        self.add_order(&mut outer, ROW_ALIAS);
        outer.to_string(PostgresQueryBuilder)
    }
}

/// Render a predicate as a SeaQuery condition on `table`'s columns.
pub(crate) fn condition(table: &'static str, predicate: &Predicate) -> Condition {
    match predicate {
        Predicate::MatchAll => Cond::all(),
        Predicate::Equals { field, value } => {
            Cond::all().add(column(table, *field).eq(scalar_value(value)))
        }
        Predicate::Contains { field, needle } => {
            let pattern = format!("%{}%", escape_like_wildcards(&needle.to_lowercase()));
            Cond::all().add(
                Expr::expr(Func::lower(column(table, *field)))
                    .like(LikeExpr::new(pattern).escape('\\')),
            )
        }
        Predicate::AnyOf { field, values } => {
            Cond::all().add(column(table, *field).is_in(values.iter().map(scalar_value)))
        }
        Predicate::Or(parts) => parts
            .iter()
            .fold(Cond::any(), |cond, part| cond.add(condition(table, part))),
        Predicate::And(parts) => parts
            .iter()
            .fold(Cond::all(), |cond, part| cond.add(condition(table, part))),
    }
}

fn column(table: &'static str, field: &'static str) -> Expr {
    Expr::col((Alias::new(table), Alias::new(field)))
}

fn scalar_value(value: &Scalar) -> Value {
    match value {
        Scalar::Text(s) => s.clone().into(),
        Scalar::Integer(i) => (*i).into(),
        Scalar::Boolean(b) => (*b).into(),
    }
}

/// `json_build_object(...)` over the projected fields, or NULL when the
/// join found no row.
fn relation_object(view: &RelationView) -> SimpleExpr {
    let alias = view.relation.name;
    let mut args: Vec<SimpleExpr> = Vec::with_capacity(view.fields.len() * 2);
    for field in &view.fields {
        args.push(Expr::val(*field).into());
        args.push(Expr::col((Alias::new(alias), Alias::new(*field))).into());
    }
    let object = Func::cust(Alias::new("json_build_object")).args(args);

    Expr::case(
        Expr::col((Alias::new(alias), Alias::new(view.relation.target.primary_key))).is_null(),
        Expr::cust("NULL"),
    )
    .finally(object)
    .into()
}

/// Escape SQL LIKE wildcard characters in user input.
///
/// Prevents `%` and `_` in search terms from acting as wildcards.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::query::entity::{Column, ColumnType, Relation};
    use crate::query::spec::QuerySpec;
    use crate::query::types::QueryRequest;

    static GENRES: EntityDescriptor = EntityDescriptor {
        name: "genre",
        table: "genres",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnType::BigInt),
            Column::new("name", ColumnType::Text),
            Column::new("blurb", ColumnType::Text),
        ],
        relations: &[],
        order: &[],
    };

    static ALBUMS: EntityDescriptor = EntityDescriptor {
        name: "album",
        table: "albums",
        primary_key: "id",
        columns: &[
            Column::new("id", ColumnType::BigInt),
            Column::new("title", ColumnType::Text),
            Column::new("artist", ColumnType::Text).filterable(),
            Column::new("year", ColumnType::Integer).filterable(),
            Column::new("genre_id", ColumnType::BigInt).filterable(),
        ],
        relations: &[Relation {
            name: "genre",
            target: &GENRES,
            local_field: "genre_id",
            default_fields: &["name", "blurb"],
        }],
        order: &[OrderBy::desc("year")],
    };

    fn spec() -> QuerySpec {
        QuerySpec::builder(&ALBUMS)
            .search(["title", "artist"])
            .relation("genre")
            .select_relation("genre", ["name"])
            .build()
            .unwrap()
    }

    fn predicate(request: &QueryRequest) -> Predicate {
        Predicate::build(&spec(), request).unwrap()
    }

    #[test]
    fn count_query_has_no_joins() {
        let spec = spec();
        let sql = DataQueryBuilder::new(&ALBUMS, spec.relations())
            .build_count(&predicate(&QueryRequest::new().with_search("x")));

        assert!(sql.starts_with("SELECT COUNT(*) FROM \"albums\""));
        assert!(!sql.contains("JOIN"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.contains("LIKE"));
    }

    #[test]
    fn count_without_predicate_has_no_where() {
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_count(&Predicate::MatchAll);
        assert_eq!(sql, "SELECT COUNT(*) FROM \"albums\"");
    }

    #[test]
    fn page_query_joins_and_projects() {
        let spec = spec();
        let sql = DataQueryBuilder::new(&ALBUMS, spec.relations()).build_page(
            &Predicate::MatchAll,
            20,
            10,
        );

        assert!(sql.contains("row_to_json(t)"));
        assert!(sql.contains("LEFT JOIN \"genres\" AS \"genre\""));
        assert!(sql.contains("\"albums\".\"genre_id\" = \"genre\".\"id\""));
        assert!(sql.contains("json_build_object("));
        assert!(sql.contains("'id', \"genre\".\"id\", 'name', \"genre\".\"name\""));
        assert!(!sql.contains("blurb"));
        assert!(sql.contains("AS \"genre\""));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
    }

    #[test]
    fn page_query_orders_with_tie_break() {
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_page(&Predicate::MatchAll, 0, 5);
        assert!(sql.contains("ORDER BY \"albums\".\"year\" DESC, \"albums\".\"id\" ASC"));
        assert!(sql.ends_with("ORDER BY \"t\".\"year\" DESC, \"t\".\"id\" ASC"));
    }

    #[test]
    fn search_group_is_or_and_filters_are_and() {
        let request = QueryRequest::new()
            .with_search("Blue")
            .with_filter("year", "1959");
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_page(&predicate(&request), 0, 10);

        assert!(sql.contains("LOWER(\"albums\".\"title\") LIKE '%blue%'"));
        assert!(sql.contains(" OR LOWER(\"albums\".\"artist\") LIKE '%blue%'"));
        assert!(sql.contains("AND \"albums\".\"year\" = 1959"));
    }

    #[test]
    fn array_filter_renders_in_list() {
        let request = QueryRequest::new().with_any_of("artist", ["Miles Davis", "Coltrane"]);
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_count(&predicate(&request));
        assert!(sql.contains("\"albums\".\"artist\" IN ('Miles Davis', 'Coltrane')"));
    }

    #[test]
    fn search_term_is_escaped() {
        let request = QueryRequest::new().with_search("50%_off");
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_count(&predicate(&request));
        assert!(sql.contains("50\\\\%\\\\_off") || sql.contains("50\\%\\_off"));
        assert!(sql.contains("ESCAPE"));
    }

    #[test]
    fn quotes_in_values_are_escaped() {
        let request = QueryRequest::new().with_filter("artist", "O'Brien");
        let sql = DataQueryBuilder::new(&ALBUMS, &[]).build_count(&predicate(&request));
        assert!(sql.contains("'O''Brien'") || sql.contains("E'O\\'Brien'"));
    }

    #[test]
    fn by_key_query() {
        let spec = spec();
        let sql = DataQueryBuilder::new(&ALBUMS, spec.relations()).build_by_key(7);
        assert!(sql.contains("\"albums\".\"id\" = 7"));
        assert!(sql.contains("LIMIT 1"));
        assert!(sql.contains("LEFT JOIN"));
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
