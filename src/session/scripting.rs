//! Scripting drivers turn a mapped statement plus named parameters into positional SQL.

use crate::error::SessionError;
use crate::session::mapper::{MappedStatement, StatementKind};
use crate::sql::PgBindValue;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Name of the built-in `#{param}` driver.
pub const HASH_DRIVER: &str = "hash";

/// How result rows are shaped into JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowShape {
    /// One JSON member per column.
    Columns,
    /// The first column already holds the whole row as a JSON document.
    Document,
}

/// Positional SQL ready to run.
#[derive(Clone, Debug)]
pub struct BoundStatement {
    pub id: String,
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<PgBindValue>,
    pub shape: RowShape,
}

impl BoundStatement {
    pub fn new(id: impl Into<String>, kind: StatementKind, sql: impl Into<String>) -> Self {
        BoundStatement {
            id: id.into(),
            kind,
            sql: sql.into(),
            params: Vec::new(),
            shape: RowShape::Columns,
        }
    }

    /// Append a parameter, returning its `$n` index.
    pub fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    pub fn with_shape(mut self, shape: RowShape) -> Self {
        self.shape = shape;
        self
    }
}

pub trait LanguageDriver: Send + Sync {
    fn name(&self) -> &str;

    fn bind(&self, statement: &MappedStatement, params: &Map<String, Value>) -> Result<BoundStatement, SessionError>;
}

/// Rewrites `#{name}` (or `#{a.b}` for nested objects) into `$n` binds. A name used twice reuses its index.
#[derive(Debug, Default)]
pub struct HashParamDriver;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}").expect("static regex")
    })
}

fn lookup<'a>(params: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = params.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

impl LanguageDriver for HashParamDriver {
    fn name(&self) -> &str {
        HASH_DRIVER
    }

    fn bind(&self, statement: &MappedStatement, params: &Map<String, Value>) -> Result<BoundStatement, SessionError> {
        let mut bound = BoundStatement::new(statement.id.clone(), statement.kind, String::new());
        let mut names: Vec<&str> = Vec::new();
        let mut sql = String::with_capacity(statement.sql.len());
        let mut last = 0;
        for caps in placeholder().captures_iter(&statement.sql) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            sql.push_str(&statement.sql[last..whole.start()]);
            let index = match names.iter().position(|n| *n == name.as_str()) {
                Some(i) => i + 1,
                None => {
                    let value = lookup(params, name.as_str())
                        .ok_or_else(|| SessionError::MissingParameter(name.as_str().to_string()))?;
                    names.push(name.as_str());
                    bound.push_param(PgBindValue::from_json(value))
                }
            };
            sql.push('$');
            sql.push_str(&index.to_string());
            last = whole.end();
        }
        sql.push_str(&statement.sql[last..]);
        bound.sql = sql;
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stmt(sql: &str) -> MappedStatement {
        MappedStatement {
            id: "user.find".into(),
            kind: StatementKind::Select,
            sql: sql.into(),
            lang: None,
        }
    }

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn rewrites_placeholders_in_order() {
        let bound = HashParamDriver
            .bind(
                &stmt("SELECT * FROM users WHERE name = #{name} AND age > #{ age } OR alias = #{name}"),
                &params(json!({ "name": "ann", "age": 30 })),
            )
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM users WHERE name = $1 AND age > $2 OR alias = $1");
        assert_eq!(
            bound.params,
            vec![PgBindValue::String("ann".into()), PgBindValue::I64(30)]
        );
    }

    #[test]
    fn nested_lookup() {
        let bound = HashParamDriver
            .bind(&stmt("SELECT #{filter.city}"), &params(json!({ "filter": { "city": "Oslo" } })))
            .unwrap();
        assert_eq!(bound.sql, "SELECT $1");
    }

    #[test]
    fn uuid_shaped_text_stays_text() {
        let ext = "6f1c3a52-8a0e-4b9e-9d3c-2f0a8f7e1b11";
        let bound = HashParamDriver
            .bind(&stmt("SELECT * FROM t WHERE ext = #{ext}"), &params(json!({ "ext": ext })))
            .unwrap();
        assert_eq!(bound.params, vec![PgBindValue::String(ext.into())]);
    }

    #[test]
    fn missing_parameter_fails() {
        let err = HashParamDriver.bind(&stmt("SELECT #{nope}"), &Map::new()).unwrap_err();
        assert!(matches!(err, SessionError::MissingParameter(p) if p == "nope"));
    }
}
