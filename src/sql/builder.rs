//! Builds parameterized INSERT, SELECT, UPDATE, DELETE for a CRUD resource.
//! Identifiers come from config and table metadata; values are text parameters cast to the column type.

use crate::config::ResourceDef;
use crate::error::AppError;
use crate::session::{BoundStatement, RowShape, StatementKind, TableInfo};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name, aliased `t` so rows can be returned as `to_jsonb(t)`.
fn qualified_table(resource: &ResourceDef) -> String {
    format!("{}.{} AS t", quoted(&resource.schema), quoted(&resource.table))
}

fn statement_id(resource: &ResourceDef, op: &str) -> String {
    format!("crud.{}.{}", resource.path_segment, op)
}

/// Push `v` and return `CAST($n AS <column type>)`.
fn cast_param(q: &mut BoundStatement, info: &TableInfo, column: &str, v: &Value) -> Result<String, AppError> {
    let ty = info
        .cast_type(column)
        .ok_or_else(|| AppError::BadRequest(format!("unknown column: {}", column)))?;
    let n = q.push_param(PgBindValue::text(v));
    Ok(format!("CAST(${} AS {})", n, ty))
}

fn pk_predicate(q: &mut BoundStatement, resource: &ResourceDef, info: &TableInfo, id: &Value) -> Result<String, AppError> {
    let cast = cast_param(q, info, &resource.primary_key, id)?;
    Ok(format!("{} = {}", quoted(&resource.primary_key), cast))
}

/// SELECT with exact-match filters, ordered by primary key.
pub fn select_list(
    resource: &ResourceDef,
    info: &TableInfo,
    filters: &[(String, Value)],
    limit: u32,
    offset: u32,
) -> Result<BoundStatement, AppError> {
    let mut q = BoundStatement::new(statement_id(resource, "list"), StatementKind::Select, String::new())
        .with_shape(RowShape::Document);
    let mut conds = Vec::with_capacity(filters.len());
    for (col, v) in filters {
        let cast = cast_param(&mut q, info, col, v)?;
        conds.push(format!("{} = {}", quoted(col), cast));
    }
    let where_clause = if conds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conds.join(" AND "))
    };
    q.sql = format!(
        "SELECT to_jsonb(t) FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        qualified_table(resource),
        where_clause,
        quoted(&resource.primary_key),
        limit,
        offset
    );
    Ok(q)
}

pub fn select_by_id(resource: &ResourceDef, info: &TableInfo, id: &Value) -> Result<BoundStatement, AppError> {
    let mut q = BoundStatement::new(statement_id(resource, "read"), StatementKind::Select, String::new())
        .with_shape(RowShape::Document);
    let pred = pk_predicate(&mut q, resource, info, id)?;
    q.sql = format!("SELECT to_jsonb(t) FROM {} WHERE {}", qualified_table(resource), pred);
    Ok(q)
}

/// INSERT ... RETURNING the created row. An empty body inserts defaults.
pub fn insert(resource: &ResourceDef, info: &TableInfo, body: &Map<String, Value>) -> Result<BoundStatement, AppError> {
    let mut q = BoundStatement::new(statement_id(resource, "create"), StatementKind::Insert, String::new())
        .with_shape(RowShape::Document);
    if body.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING to_jsonb(t)", qualified_table(resource));
        return Ok(q);
    }
    let mut cols = Vec::with_capacity(body.len());
    let mut vals = Vec::with_capacity(body.len());
    for (col, v) in body {
        vals.push(cast_param(&mut q, info, col, v)?);
        cols.push(quoted(col));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING to_jsonb(t)",
        qualified_table(resource),
        cols.join(", "),
        vals.join(", ")
    );
    Ok(q)
}

/// UPDATE by primary key. The primary key itself is never assigned.
pub fn update(
    resource: &ResourceDef,
    info: &TableInfo,
    id: &Value,
    body: &Map<String, Value>,
) -> Result<BoundStatement, AppError> {
    let mut q = BoundStatement::new(statement_id(resource, "update"), StatementKind::Update, String::new())
        .with_shape(RowShape::Document);
    let mut sets = Vec::with_capacity(body.len());
    for (col, v) in body.iter().filter(|(c, _)| **c != resource.primary_key) {
        let cast = cast_param(&mut q, info, col, v)?;
        sets.push(format!("{} = {}", quoted(col), cast));
    }
    if sets.is_empty() {
        return Err(AppError::BadRequest("no columns to update".into()));
    }
    let pred = pk_predicate(&mut q, resource, info, id)?;
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING to_jsonb(t)",
        qualified_table(resource),
        sets.join(", "),
        pred
    );
    Ok(q)
}

pub fn delete(resource: &ResourceDef, info: &TableInfo, id: &Value) -> Result<BoundStatement, AppError> {
    let mut q = BoundStatement::new(statement_id(resource, "delete"), StatementKind::Delete, String::new())
        .with_shape(RowShape::Document);
    let pred = pk_predicate(&mut q, resource, info, id)?;
    q.sql = format!("DELETE FROM {} WHERE {} RETURNING to_jsonb(t)", qualified_table(resource), pred);
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessRule, Operation, PkType};
    use serde_json::json;

    fn users() -> (ResourceDef, TableInfo) {
        let res = ResourceDef {
            path_segment: "users".into(),
            schema: "app".into(),
            table: "users".into(),
            primary_key: "id".into(),
            pk_type: PkType::BigInt,
            operations: Operation::ALL.to_vec(),
            datasource: None,
            access: AccessRule::Anonymous,
        };
        let info = TableInfo::new("app", "users")
            .with_column("id", "pg_catalog", "int8")
            .with_column("name", "pg_catalog", "text")
            .with_column("active", "pg_catalog", "bool");
        (res, info)
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn list_with_filters() {
        let (res, info) = users();
        let q = select_list(&res, &info, &[("active".into(), json!("true"))], 10, 20).unwrap();
        assert_eq!(
            q.sql,
            "SELECT to_jsonb(t) FROM \"app\".\"users\" AS t WHERE \"active\" = CAST($1 AS \"pg_catalog\".\"bool\") \
             ORDER BY \"id\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(q.params, vec![PgBindValue::String("true".into())]);
        assert_eq!(q.shape, RowShape::Document);
    }

    #[test]
    fn insert_casts_each_value() {
        let (res, info) = users();
        let q = insert(&res, &info, &obj(json!({ "name": "ann", "active": true }))).unwrap();
        assert_eq!(q.kind, StatementKind::Insert);
        assert!(q.sql.starts_with("INSERT INTO \"app\".\"users\" AS t (\"active\", \"name\") VALUES"));
        assert!(q.sql.ends_with("RETURNING to_jsonb(t)"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn insert_empty_body_uses_defaults() {
        let (res, info) = users();
        let q = insert(&res, &info, &Map::new()).unwrap();
        assert!(q.sql.contains("DEFAULT VALUES"));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let (res, info) = users();
        assert!(matches!(
            insert(&res, &info, &obj(json!({ "nope\"; DROP": 1 }))),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn update_skips_primary_key_and_requires_columns() {
        let (res, info) = users();
        let q = update(&res, &info, &json!(7), &obj(json!({ "id": 9, "name": "bo" }))).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"app\".\"users\" AS t SET \"name\" = CAST($1 AS \"pg_catalog\".\"text\") \
             WHERE \"id\" = CAST($2 AS \"pg_catalog\".\"int8\") RETURNING to_jsonb(t)"
        );
        assert_eq!(q.params[1], PgBindValue::String("7".into()));
        assert!(update(&res, &info, &json!(7), &obj(json!({ "id": 9 }))).is_err());
    }

    #[test]
    fn delete_by_id() {
        let (res, info) = users();
        let q = delete(&res, &info, &json!(3)).unwrap();
        assert_eq!(q.kind, StatementKind::Delete);
        assert!(q.sql.starts_with("DELETE FROM \"app\".\"users\" AS t WHERE \"id\" = CAST($1"));
    }
}
