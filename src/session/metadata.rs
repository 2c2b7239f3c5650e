//! Column type metadata for a table, cached per session factory.

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnType {
    pub schema: String,
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    columns: BTreeMap<String, ColumnType>,
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub(crate) const COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, udt_schema::text AS udt_schema, udt_name::text AS udt_name \
     FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position";

impl TableInfo {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        TableInfo {
            schema: schema.into(),
            table: table.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, type_schema: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns.insert(
            name.into(),
            ColumnType {
                schema: type_schema.into(),
                name: type_name.into(),
            },
        );
        self
    }

    /// Build from `information_schema.columns` rows shaped as JSON objects.
    pub fn from_rows(schema: &str, table: &str, rows: &[Value]) -> Self {
        let mut info = TableInfo::new(schema, table);
        for row in rows {
            let get = |k: &str| row.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
            let name = get("column_name");
            if name.is_empty() {
                continue;
            }
            info = info.with_column(name, get("udt_schema"), get("udt_name"));
        }
        info
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Quoted, schema-qualified type usable in `CAST($n AS ...)`.
    pub fn cast_type(&self, column: &str) -> Option<String> {
        self.columns
            .get(column)
            .map(|t| format!("{}.{}", quoted(&t.schema), quoted(&t.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_rows_and_cast() {
        let info = TableInfo::from_rows(
            "public",
            "users",
            &[
                json!({ "column_name": "id", "udt_schema": "pg_catalog", "udt_name": "int8" }),
                json!({ "column_name": "mood", "udt_schema": "public", "udt_name": "mood" }),
                json!({ "udt_name": "ignored" }),
            ],
        );
        assert!(info.has_column("id"));
        assert_eq!(info.column_names().count(), 2);
        assert_eq!(info.cast_type("id").as_deref(), Some("\"pg_catalog\".\"int8\""));
        assert_eq!(info.cast_type("mood").as_deref(), Some("\"public\".\"mood\""));
        assert_eq!(info.cast_type("nope"), None);
    }
}
