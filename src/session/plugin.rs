//! Extension points attached to a session factory: statement interceptors, type handlers and
//! the per-factory global config (key generator, meta-object handler).

use crate::error::SessionError;
use crate::session::scripting::BoundStatement;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Runs before every statement a session executes.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn intercept(&self, datasource: &str, statement: &mut BoundStatement) -> Result<(), SessionError>;
}

/// Rejects anything but SELECT on a datasource marked read-only.
#[derive(Debug, Default)]
pub struct ReadOnlyInterceptor;

impl Interceptor for ReadOnlyInterceptor {
    fn name(&self) -> &str {
        "read_only"
    }

    fn intercept(&self, datasource: &str, statement: &mut BoundStatement) -> Result<(), SessionError> {
        if statement.kind.is_write() {
            return Err(SessionError::Rejected {
                plugin: self.name().to_string(),
                message: format!("datasource '{}' is read-only ({})", datasource, statement.id),
            });
        }
        Ok(())
    }
}

/// Post-processes one column of a result row.
pub trait TypeHandler: Send + Sync {
    fn handles(&self, column: &str) -> bool;

    fn to_json(&self, column: &str, value: Value) -> Value;
}

pub const MASK: &str = "******";

#[derive(Debug, Default)]
pub struct MaskingTypeHandler {
    columns: HashSet<String>,
}

impl MaskingTypeHandler {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MaskingTypeHandler {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl TypeHandler for MaskingTypeHandler {
    fn handles(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    fn to_json(&self, _column: &str, value: Value) -> Value {
        if value.is_null() {
            value
        } else {
            Value::String(MASK.into())
        }
    }
}

/// Generates a primary key when an insert body has none.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, table: &str) -> Option<Value>;
}

#[derive(Debug, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate(&self, _table: &str) -> Option<Value> {
        Some(Value::String(uuid::Uuid::new_v4().to_string()))
    }
}

/// Fills audit-style fields before insert and update.
pub trait MetaObjectHandler: Send + Sync {
    fn insert_fill(&self, table: &str, row: &mut Map<String, Value>);

    fn update_fill(&self, table: &str, row: &mut Map<String, Value>);
}

/// Sets creation and update timestamps (RFC 3339, UTC) unless the caller supplied them.
#[derive(Debug, Clone)]
pub struct TimestampFill {
    pub created: String,
    pub updated: String,
}

impl Default for TimestampFill {
    fn default() -> Self {
        TimestampFill {
            created: "created_at".into(),
            updated: "updated_at".into(),
        }
    }
}

impl MetaObjectHandler for TimestampFill {
    fn insert_fill(&self, _table: &str, row: &mut Map<String, Value>) {
        let now = Value::String(chrono::Utc::now().to_rfc3339());
        row.entry(self.created.clone()).or_insert_with(|| now.clone());
        row.entry(self.updated.clone()).or_insert(now);
    }

    fn update_fill(&self, _table: &str, row: &mut Map<String, Value>) {
        row.entry(self.updated.clone())
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
    }
}

/// Factory-wide settings. Each session factory owns a fresh instance.
#[derive(Clone, Default)]
pub struct GlobalConfig {
    pub banner: bool,
    pub key_generator: Option<Arc<dyn KeyGenerator>>,
    pub meta_object_handler: Option<Arc<dyn MetaObjectHandler>>,
}

impl GlobalConfig {
    pub fn defaults() -> Self {
        GlobalConfig::default()
    }

    pub fn with_banner(mut self, banner: bool) -> Self {
        self.banner = banner;
        self
    }

    pub fn with_key_generator(mut self, g: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(g);
        self
    }

    pub fn with_meta_object_handler(mut self, h: Arc<dyn MetaObjectHandler>) -> Self {
        self.meta_object_handler = Some(h);
        self
    }
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("banner", &self.banner)
            .field("key_generator", &self.key_generator.is_some())
            .field("meta_object_handler", &self.meta_object_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mapper::StatementKind;
    use serde_json::json;

    #[test]
    fn read_only_rejects_writes() {
        let mut select = BoundStatement::new("a", StatementKind::Select, "SELECT 1");
        let mut delete = BoundStatement::new("b", StatementKind::Delete, "DELETE FROM t");
        assert!(ReadOnlyInterceptor.intercept("reports", &mut select).is_ok());
        assert!(matches!(
            ReadOnlyInterceptor.intercept("reports", &mut delete),
            Err(SessionError::Rejected { .. })
        ));
    }

    #[test]
    fn masking_keeps_nulls() {
        let h = MaskingTypeHandler::new(["password"]);
        assert!(h.handles("password"));
        assert!(!h.handles("name"));
        assert_eq!(h.to_json("password", json!("hunter2")), json!(MASK));
        assert_eq!(h.to_json("password", Value::Null), Value::Null);
    }

    #[test]
    fn timestamp_fill_respects_supplied_values() {
        let fill = TimestampFill::default();
        let mut row = json!({ "created_at": "2020-01-01T00:00:00Z" }).as_object().cloned().unwrap();
        fill.insert_fill("users", &mut row);
        assert_eq!(row["created_at"], json!("2020-01-01T00:00:00Z"));
        assert!(row.contains_key("updated_at"));
    }
}
