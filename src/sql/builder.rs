//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and check queries from a resolved entity.
//!
//! Every SELECT reads from the entity table aliased as `main`, LEFT JOINs one
//! alias per backref and aliases each output expression to its public key, so
//! rows come back already shaped for the API. Write-only fields are never
//! selected.

use crate::config::{ComposedPart, ResolvedComposed, ResolvedEntity, ResolvedField, UniqueMode};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

/// Field values to write, already validated.
pub type FieldValues<'a> = Vec<(&'a ResolvedField, Value)>;

/// Quote identifier for PostgreSQL (safe: only from catalog).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn column_of(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quoted(column))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its placeholder cast to the column type.
    /// Values are bound as text, so every placeholder needs its cast.
    fn push_typed(&mut self, v: Value, pg_type: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), pg_type)
    }

    fn push_id(&mut self, id: i32) -> String {
        self.push_typed(id.into(), "integer")
    }
}

/// SELECT list: own fields (minus write-only), backref display columns, composed properties.
fn select_projection(entity: &ResolvedEntity) -> String {
    let mut parts: Vec<String> = entity
        .fields
        .iter()
        .filter(|f| !f.is_write_only())
        .map(|f| format!("{} AS {}", column_of(MAIN_ALIAS, &f.column), quoted(&f.key)))
        .collect();
    for b in &entity.backrefs {
        parts.push(format!("{} AS {}", column_of(&b.alias, &b.display_column), quoted(&b.key)));
    }
    for c in &entity.composed {
        parts.push(format!("{} AS {}", composed_expr(c), quoted(&c.key)));
    }
    parts.join(", ")
}

/// `CONCAT_WS` over the parts; NULL when every part is NULL or empty.
fn composed_expr(c: &ResolvedComposed) -> String {
    let exprs: Vec<String> = c
        .parts
        .iter()
        .map(|p| match p {
            ComposedPart::Column(col) => format!("{}::text", column_of(MAIN_ALIAS, col)),
            ComposedPart::Joined { alias, column } => format!("{}::text", column_of(alias, column)),
        })
        .collect();
    format!(
        "NULLIF(CONCAT_WS('{}', {}), '')",
        c.separator.replace('\'', "''"),
        exprs.join(", ")
    )
}

/// FROM clause with one LEFT JOIN per backref.
fn select_from(entity: &ResolvedEntity) -> String {
    let mut from = format!("{} {}", quoted(&entity.table_name), MAIN_ALIAS);
    for b in &entity.backrefs {
        from.push_str(&format!(
            " LEFT JOIN {} {} ON {} = {}",
            quoted(&b.table_name),
            b.alias,
            column_of(&b.alias, &b.pk_column),
            column_of(MAIN_ALIAS, &b.fk_column)
        ));
    }
    from
}

/// Search and paging options for a list query. Keys are public output keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    /// Digit-only terms match exactly, anything else is a case-insensitive substring match.
    pub filters: Vec<(String, String)>,
    pub order_by: Option<String>,
    pub descending: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// SQL expression producing the output key `key`, if the entity exposes it.
fn output_expr(entity: &ResolvedEntity, key: &str) -> Option<String> {
    if let Some(f) = entity.field(key).filter(|f| !f.is_write_only()) {
        return Some(column_of(MAIN_ALIAS, &f.column));
    }
    if let Some(b) = entity.backrefs.iter().find(|b| b.key == key) {
        return Some(column_of(&b.alias, &b.display_column));
    }
    entity.composed.iter().find(|c| c.key == key).map(composed_expr)
}

/// True when `key` names something a list query can filter or sort on.
pub fn is_listable_key(entity: &ResolvedEntity, key: &str) -> bool {
    output_expr(entity, key).is_some()
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

/// SELECT rows matching every filter, ordered by the chosen key then primary key.
/// Unknown keys are skipped.
pub fn select_list(entity: &ResolvedEntity, list: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut conds = Vec::new();
    for (key, term) in &list.filters {
        let Some(expr) = output_expr(entity, key) else { continue };
        if !term.is_empty() && term.bytes().all(|b| b.is_ascii_digit()) {
            let ph = q.push_typed(Value::String(term.clone()), "text");
            conds.push(format!("{}::text = {}", expr, ph));
        } else {
            let ph = q.push_typed(Value::String(like_pattern(term)), "text");
            conds.push(format!("{}::text ILIKE {}", expr, ph));
        }
    }
    let pk = column_of(MAIN_ALIAS, &entity.pk_column);
    let dir = if list.descending { " DESC" } else { "" };
    let order = match list.order_by.as_deref().and_then(|k| output_expr(entity, k)) {
        Some(expr) if expr != pk => format!("{}{}, {}{}", expr, dir, pk, dir),
        _ => format!("{}{}", pk, dir),
    };
    let mut sql = format!("SELECT {} FROM {}", select_projection(entity), select_from(entity));
    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&order);
    if let Some(limit) = list.limit {
        let ph = q.push_typed(limit.into(), "bigint");
        sql.push_str(&format!(" LIMIT {}", ph));
    }
    if let Some(offset) = list.offset {
        let ph = q.push_typed(offset.into(), "bigint");
        sql.push_str(&format!(" OFFSET {}", ph));
    }
    q.sql = sql;
    q
}

/// SELECT one row by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: i32) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_id(id);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_projection(entity),
        select_from(entity),
        column_of(MAIN_ALIAS, &entity.pk_column),
        n
    );
    q
}

/// `SELECT EXISTS(...)` for a row of `table` with the given primary key.
pub fn exists_by_id(table: &str, pk_column: &str, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_typed(id.clone(), "integer");
    q.sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = {})",
        quoted(table),
        quoted(pk_column),
        ph
    );
    q
}

/// `SELECT EXISTS(...)` for another row holding `value` in a unique field.
/// `exclude_id` skips the row being patched.
pub fn unique_check(
    entity: &ResolvedEntity,
    field: &ResolvedField,
    value: &Value,
    exclude_id: Option<i32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_typed(value.clone(), field.pg_type());
    let col = quoted(&field.column);
    let mut cond = match field.unique {
        Some(UniqueMode::CaseInsensitive) => format!("lower({}) = lower({})", col, ph),
        _ => format!("{} = {}", col, ph),
    };
    if let Some(id) = exclude_id {
        let n = q.push_id(id);
        cond.push_str(&format!(" AND {} <> {}", quoted(&entity.pk_column), n));
    }
    q.sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {})", quoted(&entity.table_name), cond);
    q
}

/// INSERT the given values; columns not provided take their DB default. Returns the new id.
pub fn insert(entity: &ResolvedEntity, values: &[(&ResolvedField, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    let pk = quoted(&entity.pk_column);
    if values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk);
        return q;
    }
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (field, value) in values {
        cols.push(quoted(&field.column));
        placeholders.push(q.push_typed(value.clone(), field.pg_type()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        pk
    );
    q
}

/// UPDATE by id: SET only the given values. Returns the id, or no row when it does not exist.
pub fn update(entity: &ResolvedEntity, id: i32, values: &[(&ResolvedField, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    let pk = quoted(&entity.pk_column);
    let sets: Vec<String> = values
        .iter()
        .map(|(field, value)| {
            let ph = q.push_typed(value.clone(), field.pg_type());
            format!("{} = {}", quoted(&field.column), ph)
        })
        .collect();
    let n = q.push_id(id);
    if sets.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE {} = {}", pk, table, pk, n);
        return q;
    }
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        table,
        sets.join(", "),
        pk,
        n,
        pk
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &ResolvedEntity, id: i32) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = quoted(&entity.pk_column);
    let n = q.push_id(id);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&entity.table_name),
        pk,
        n,
        pk
    );
    q
}

/// Row count of the entity table.
pub fn count(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", quoted(&entity.table_name));
    q
}

/// Lookup for authentication: the listed fields (including write-only ones)
/// of the row whose `login_field` matches case-insensitively.
pub fn select_credentials(entity: &ResolvedEntity, login_field: &ResolvedField, fields: &[&ResolvedField], login: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_typed(Value::String(login.to_string()), "text");
    let cols: Vec<String> = fields
        .iter()
        .map(|f| format!("{} AS {}", quoted(&f.column), quoted(&f.key)))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE lower({}) = lower({})",
        cols.join(", "),
        quoted(&entity.table_name),
        quoted(&login_field.column),
        ph
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&builtin().unwrap()).unwrap()
    }

    #[test]
    fn list_joins_backrefs_and_composes_display_name() {
        let model = model();
        let halls = model.entity_by_path("halls").unwrap();
        let q = select_list(halls, &ListQuery::default());
        assert!(q.params.is_empty());
        assert!(q.sql.starts_with("SELECT main.\"Id\" AS \"id\", main.\"Number\" AS \"number\""));
        assert!(q.sql.contains("FROM \"halls\" main LEFT JOIN \"targets\" b0 ON b0.\"Id\" = main.\"TargetId\""));
        assert!(q.sql.contains("LEFT JOIN \"buildings\" b2 ON b2.\"Id\" = main.\"BuildingId\""));
        assert!(q.sql.contains("b1.\"Name\" AS \"department\""));
        assert!(q.sql.contains(
            "NULLIF(CONCAT_WS(' ', main.\"Number\"::text, b0.\"Name\"::text, b2.\"Name\"::text), '') AS \"name\""
        ));
        assert!(q.sql.ends_with("ORDER BY main.\"Id\""));
    }

    #[test]
    fn password_is_never_selected() {
        let model = model();
        let users = model.users().unwrap();
        let q = select_by_id(users, 7);
        assert!(!q.sql.contains("Password"));
        assert!(q.sql.contains("main.\"Login\" AS \"login\""));
        assert!(q.sql.ends_with("WHERE main.\"Id\" = $1::integer"));
        assert_eq!(q.params, vec![json!(7)]);
    }

    #[test]
    fn insert_casts_placeholders_to_column_types() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let values = vec![
            (units.field("name").unwrap(), json!("Projector")),
            (units.field("date_start").unwrap(), json!("2021-03-01")),
            (units.field("cost").unwrap(), json!(1200.5)),
        ];
        let q = insert(units, &values);
        assert_eq!(
            q.sql,
            "INSERT INTO \"units\" (\"Name\", \"DateStart\", \"Cost\") VALUES ($1::text, $2::date, $3::double precision) RETURNING \"Id\""
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        let model = model();
        let chiefs = model.entity_by_path("chiefs").unwrap();
        let q = insert(chiefs, &[]);
        assert_eq!(q.sql, "INSERT INTO \"chiefs\" DEFAULT VALUES RETURNING \"Id\"");
    }

    #[test]
    fn update_sets_only_given_fields_and_binds_id_last() {
        let model = model();
        let buildings = model.entity_by_path("buildings").unwrap();
        let values = vec![(buildings.field("wear").unwrap(), json!(40))];
        let q = update(buildings, 3, &values);
        assert_eq!(
            q.sql,
            "UPDATE \"buildings\" SET \"Wear\" = $1::double precision WHERE \"Id\" = $2::integer RETURNING \"Id\""
        );
        assert_eq!(q.params, vec![json!(40), json!(3)]);
    }

    #[test]
    fn case_insensitive_unique_check_excludes_own_row() {
        let model = model();
        let users = model.users().unwrap();
        let login = users.field("login").unwrap();
        let q = unique_check(users, login, &json!("Admin"), Some(4));
        assert_eq!(
            q.sql,
            "SELECT EXISTS(SELECT 1 FROM \"users\" WHERE lower(\"Login\") = lower($1::text) AND \"Id\" <> $2::integer)"
        );
        assert_eq!(q.params, vec![json!("Admin"), json!(4)]);
    }

    #[test]
    fn exists_and_delete_by_id() {
        let model = model();
        let materials = model.entity_by_path("materials").unwrap();
        let q = exists_by_id("materials", "Id", &json!(2));
        assert_eq!(q.sql, "SELECT EXISTS(SELECT 1 FROM \"materials\" WHERE \"Id\" = $1::integer)");
        let q = delete(materials, 2);
        assert_eq!(q.sql, "DELETE FROM \"materials\" WHERE \"Id\" = $1::integer RETURNING \"Id\"");
    }

    #[test]
    fn list_filters_bind_terms_and_match_backrefs() {
        let model = model();
        let halls = model.entity_by_path("halls").unwrap();
        let list = ListQuery {
            filters: vec![
                ("number".into(), "12".into()),
                ("building".into(), "ma_in%".into()),
                ("password".into(), "x".into()),
            ],
            ..Default::default()
        };
        let q = select_list(halls, &list);
        assert!(q.sql.contains(
            "WHERE main.\"Number\"::text = $1::text AND b2.\"Name\"::text ILIKE $2::text ORDER BY main.\"Id\""
        ));
        assert_eq!(q.params, vec![json!("12"), json!("%ma\\_in\\%%")]);
    }

    #[test]
    fn list_orders_by_key_and_pages() {
        let model = model();
        let buildings = model.entity_by_path("buildings").unwrap();
        let list = ListQuery {
            order_by: Some("material".into()),
            descending: true,
            limit: Some(10),
            offset: Some(20),
            ..Default::default()
        };
        let q = select_list(buildings, &list);
        assert!(q.sql.ends_with(
            "ORDER BY b0.\"Name\" DESC, main.\"Id\" DESC LIMIT $1::bigint OFFSET $2::bigint"
        ));
        assert_eq!(q.params, vec![json!(10), json!(20)]);
        assert!(is_listable_key(buildings, "material"));
        assert!(!is_listable_key(buildings, "nope"));
    }

    #[test]
    fn composed_key_is_filterable() {
        let model = model();
        let halls = model.entity_by_path("halls").unwrap();
        let list = ListQuery {
            filters: vec![("name".into(), "Main".into())],
            ..Default::default()
        };
        let q = select_list(halls, &list);
        assert!(q.sql.contains("WHERE NULLIF(CONCAT_WS(' ', main.\"Number\"::text"));
        assert!(q.sql.contains("), '')::text ILIKE $1::text"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted("Name"), "\"Name\"");
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
    }
}
