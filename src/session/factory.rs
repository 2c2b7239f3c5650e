//! Per-datasource session factory: an isolated statement configuration bound to one connection source.

use crate::datasource::ConnectionSource;
use crate::error::SessionError;
use crate::session::mapper::{load_mapper, resolve_locations, MappedStatement, StatementKind};
use crate::session::metadata::{TableInfo, COLUMNS_SQL};
use crate::session::plugin::{GlobalConfig, Interceptor, TypeHandler};
use crate::session::row::{row_document, row_to_json};
use crate::session::scripting::{BoundStatement, HashParamDriver, LanguageDriver, RowShape, HASH_DRIVER};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgConnection, Postgres};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Everything a factory owns. Never shared between factories.
pub struct SessionConfiguration {
    statements: HashMap<String, MappedStatement>,
    type_handlers: Vec<Arc<dyn TypeHandler>>,
    plugins: Vec<Arc<dyn Interceptor>>,
    drivers: HashMap<String, Arc<dyn LanguageDriver>>,
    default_driver: String,
    global: GlobalConfig,
}

impl SessionConfiguration {
    pub fn statement(&self, id: &str) -> Option<&MappedStatement> {
        self.statements.get(id)
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn type_handler_count(&self) -> usize {
        self.type_handlers.len()
    }

    pub fn default_driver(&self) -> &str {
        &self.default_driver
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }
}

pub struct SessionFactoryBuilder {
    source: Arc<ConnectionSource>,
    mapper_locations: Vec<String>,
    statements: Vec<MappedStatement>,
    type_handlers: Vec<Arc<dyn TypeHandler>>,
    plugins: Vec<Arc<dyn Interceptor>>,
    drivers: HashMap<String, Arc<dyn LanguageDriver>>,
    default_driver: String,
    global: Option<GlobalConfig>,
}

impl SessionFactoryBuilder {
    pub fn new(source: Arc<ConnectionSource>) -> Self {
        let mut drivers: HashMap<String, Arc<dyn LanguageDriver>> = HashMap::new();
        drivers.insert(HASH_DRIVER.to_string(), Arc::new(HashParamDriver));
        SessionFactoryBuilder {
            source,
            mapper_locations: Vec::new(),
            statements: Vec::new(),
            type_handlers: Vec::new(),
            plugins: Vec::new(),
            drivers,
            default_driver: HASH_DRIVER.to_string(),
            global: None,
        }
    }

    pub fn datasource(&self) -> &str {
        self.source.name()
    }

    pub fn mapper_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mapper_locations.extend(locations.into_iter().map(Into::into));
        self
    }

    /// Register a statement directly instead of through a mapper file.
    pub fn statement(mut self, statement: MappedStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn type_handler(mut self, handler: Arc<dyn TypeHandler>) -> Self {
        self.type_handlers.push(handler);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn Interceptor>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn scripting_driver(mut self, driver: Arc<dyn LanguageDriver>) -> Self {
        self.drivers.insert(driver.name().to_string(), driver);
        self
    }

    pub fn default_scripting_driver(mut self, name: impl Into<String>) -> Self {
        self.default_driver = name.into();
        self
    }

    pub fn global_config(mut self, global: GlobalConfig) -> Self {
        self.global = Some(global);
        self
    }

    /// Load mappers and check the configuration. Errors affect only this datasource.
    pub async fn build(self) -> Result<SessionFactory, SessionError> {
        let mut statements: HashMap<String, MappedStatement> = HashMap::new();
        let mut add = |s: MappedStatement| -> Result<(), SessionError> {
            if statements.contains_key(&s.id) {
                return Err(SessionError::DuplicateStatement(s.id));
            }
            statements.insert(s.id.clone(), s);
            Ok(())
        };
        for path in resolve_locations(&self.mapper_locations).await? {
            for s in load_mapper(&path).await? {
                add(s)?;
            }
        }
        for s in self.statements {
            add(s)?;
        }

        if !self.drivers.contains_key(&self.default_driver) {
            return Err(SessionError::UnknownDriver(self.default_driver));
        }
        for s in statements.values() {
            if let Some(lang) = &s.lang {
                if !self.drivers.contains_key(lang) {
                    return Err(SessionError::UnknownDriver(lang.clone()));
                }
            }
        }

        let global = self.global.unwrap_or_else(GlobalConfig::defaults);
        if global.banner {
            tracing::info!(
                datasource = %self.source.name(),
                statements = statements.len(),
                plugins = self.plugins.len(),
                type_handlers = self.type_handlers.len(),
                "session factory ready"
            );
        } else {
            tracing::debug!(datasource = %self.source.name(), statements = statements.len(), "session factory ready");
        }

        Ok(SessionFactory {
            source: self.source,
            configuration: SessionConfiguration {
                statements,
                type_handlers: self.type_handlers,
                plugins: self.plugins,
                drivers: self.drivers,
                default_driver: self.default_driver,
                global,
            },
            tables: RwLock::new(HashMap::new()),
        })
    }
}

pub struct SessionFactory {
    source: Arc<ConnectionSource>,
    configuration: SessionConfiguration,
    tables: RwLock<HashMap<String, Arc<TableInfo>>>,
}

impl SessionFactory {
    pub fn builder(source: Arc<ConnectionSource>) -> SessionFactoryBuilder {
        SessionFactoryBuilder::new(source)
    }

    pub fn datasource(&self) -> &str {
        self.source.name()
    }

    pub fn source(&self) -> &Arc<ConnectionSource> {
        &self.source
    }

    pub fn configuration(&self) -> &SessionConfiguration {
        &self.configuration
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.configuration.global
    }

    pub fn open_session(&self) -> SqlSession<'_> {
        SqlSession { factory: self }
    }

    /// Column types for `schema.table`, loaded once per factory.
    pub async fn table_info(&self, schema: &str, table: &str) -> Result<Arc<TableInfo>, SessionError> {
        let key = format!("{}.{}", schema, table);
        let cached = self.tables.read().ok().and_then(|t| t.get(&key).cloned());
        if let Some(info) = cached {
            return Ok(info);
        }
        let mut bound = BoundStatement::new("metadata.columns", StatementKind::Select, COLUMNS_SQL);
        bound.push_param(PgBindValue::String(schema.to_string()));
        bound.push_param(PgBindValue::String(table.to_string()));
        let rows = self.open_session().query(bound).await?;
        let info = TableInfo::from_rows(schema, table, &rows);
        if info.is_empty() {
            return Err(SessionError::UnknownTable(key));
        }
        let info = Arc::new(info);
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(key, info.clone());
        }
        Ok(info)
    }

    #[cfg(test)]
    pub(crate) fn cache_table_info(&self, info: TableInfo) {
        let key = format!("{}.{}", info.schema, info.table);
        self.tables.write().unwrap().insert(key, Arc::new(info));
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("datasource", &self.source.name())
            .field("statements", &self.configuration.statements.len())
            .field("global", &self.configuration.global)
            .finish()
    }
}

fn build_query(bound: &BoundStatement) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    let mut q = sqlx::query(&bound.sql);
    for p in &bound.params {
        q = q.bind(p.clone());
    }
    q
}

/// Executes statements against the factory's connection source.
pub struct SqlSession<'a> {
    factory: &'a SessionFactory,
}

impl<'a> SqlSession<'a> {
    pub fn datasource(&self) -> &str {
        self.factory.datasource()
    }

    pub fn factory(&self) -> &SessionFactory {
        self.factory
    }

    /// Bind a mapped statement with the driver it names (or the default).
    pub fn bind(&self, id: &str, params: &Map<String, Value>) -> Result<BoundStatement, SessionError> {
        let config = &self.factory.configuration;
        let statement = config
            .statement(id)
            .ok_or_else(|| SessionError::StatementNotFound(id.to_string()))?;
        let lang = statement.lang.as_deref().unwrap_or(&config.default_driver);
        let driver = config
            .drivers
            .get(lang)
            .ok_or_else(|| SessionError::UnknownDriver(lang.to_string()))?;
        driver.bind(statement, params)
    }

    fn prepare(&self, mut bound: BoundStatement) -> Result<BoundStatement, SessionError> {
        for plugin in &self.factory.configuration.plugins {
            plugin.intercept(self.datasource(), &mut bound)?;
        }
        tracing::debug!(
            datasource = %self.datasource(),
            statement = %bound.id,
            sql = %bound.sql,
            params = ?bound.params,
            "query"
        );
        Ok(bound)
    }

    fn to_json(&self, row: &PgRow, shape: RowShape) -> Value {
        let mut map = match shape {
            RowShape::Columns => row_to_json(row),
            RowShape::Document => row_document(row),
        };
        let handlers = &self.factory.configuration.type_handlers;
        if !handlers.is_empty() {
            for (column, value) in map.iter_mut() {
                for h in handlers.iter().filter(|h| h.handles(column)) {
                    *value = h.to_json(column, std::mem::take(value));
                }
            }
        }
        Value::Object(map)
    }

    pub async fn select_list(&self, id: &str, params: &Map<String, Value>) -> Result<Vec<Value>, SessionError> {
        let bound = self.bind(id, params)?;
        self.query(bound).await
    }

    pub async fn select_one(&self, id: &str, params: &Map<String, Value>) -> Result<Option<Value>, SessionError> {
        let bound = self.bind(id, params)?;
        self.query_optional(bound).await
    }

    /// Run an insert/update/delete mapped statement; returns rows affected.
    pub async fn execute(&self, id: &str, params: &Map<String, Value>) -> Result<u64, SessionError> {
        let bound = self.bind(id, params)?;
        self.execute_bound(bound).await
    }

    pub async fn query(&self, bound: BoundStatement) -> Result<Vec<Value>, SessionError> {
        let bound = self.prepare(bound)?;
        let rows = build_query(&bound).fetch_all(self.factory.source.pool()).await?;
        Ok(rows.iter().map(|r| self.to_json(r, bound.shape)).collect())
    }

    pub async fn query_optional(&self, bound: BoundStatement) -> Result<Option<Value>, SessionError> {
        let bound = self.prepare(bound)?;
        let row = build_query(&bound).fetch_optional(self.factory.source.pool()).await?;
        Ok(row.map(|r| self.to_json(&r, bound.shape)))
    }

    pub async fn execute_bound(&self, bound: BoundStatement) -> Result<u64, SessionError> {
        let bound = self.prepare(bound)?;
        let done = build_query(&bound).execute(self.factory.source.pool()).await?;
        Ok(done.rows_affected())
    }

    /// Run on a caller-held connection, e.g. a distributed transaction branch.
    pub async fn query_on(&self, conn: &mut PgConnection, bound: BoundStatement) -> Result<Vec<Value>, SessionError> {
        let bound = self.prepare(bound)?;
        let rows = build_query(&bound).fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(|r| self.to_json(r, bound.shape)).collect())
    }

    pub async fn execute_on(&self, conn: &mut PgConnection, bound: BoundStatement) -> Result<u64, SessionError> {
        let bound = self.prepare(bound)?;
        let done = build_query(&bound).execute(&mut *conn).await?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::router::tests::lazy_source;
    use crate::session::plugin::{ReadOnlyInterceptor, UuidKeyGenerator};
    use serde_json::json;

    fn stmt(id: &str, kind: StatementKind, sql: &str) -> MappedStatement {
        MappedStatement {
            id: id.into(),
            kind,
            sql: sql.into(),
            lang: None,
        }
    }

    #[tokio::test]
    async fn builds_from_mapper_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("user.json"),
            r#"{ "namespace": "user", "statements": [
                { "id": "byId", "kind": "select", "sql": "SELECT * FROM users WHERE id = #{id}" }
            ] }"#,
        )
        .await
        .unwrap();
        let factory = SessionFactory::builder(lazy_source("primary", "db1"))
            .mapper_locations([format!("{}/*.json", dir.path().display())])
            .global_config(GlobalConfig::defaults().with_key_generator(Arc::new(UuidKeyGenerator)))
            .build()
            .await
            .unwrap();
        assert_eq!(factory.datasource(), "primary");
        assert!(factory.configuration().statement("user.byId").is_some());
        assert!(factory.global().key_generator.is_some());

        let bound = factory
            .open_session()
            .bind("user.byId", json!({ "id": 5 }).as_object().unwrap())
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM users WHERE id = $1");
    }

    #[tokio::test]
    async fn malformed_mapper_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{ \"namespace\": ").await.unwrap();
        let err = SessionFactory::builder(lazy_source("primary", "db1"))
            .mapper_locations([path.display().to_string()])
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Mapper { .. }));
    }

    #[tokio::test]
    async fn duplicate_statement_and_unknown_driver() {
        let dup = SessionFactory::builder(lazy_source("primary", "db1"))
            .statement(stmt("a.b", StatementKind::Select, "SELECT 1"))
            .statement(stmt("a.b", StatementKind::Select, "SELECT 2"))
            .build()
            .await;
        assert!(matches!(dup, Err(SessionError::DuplicateStatement(_))));

        let unknown = SessionFactory::builder(lazy_source("primary", "db1"))
            .default_scripting_driver("velocity")
            .build()
            .await;
        assert!(matches!(unknown, Err(SessionError::UnknownDriver(_))));
    }

    #[tokio::test]
    async fn plugins_run_before_execution() {
        let factory = SessionFactory::builder(lazy_source("reports", "db2"))
            .statement(stmt("r.purge", StatementKind::Delete, "DELETE FROM logs"))
            .plugin(Arc::new(ReadOnlyInterceptor))
            .build()
            .await
            .unwrap();
        assert_eq!(factory.configuration().plugin_names(), vec!["read_only"]);
        // rejected before any connection is acquired
        let err = factory.open_session().execute("r.purge", &Map::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected { .. }));
    }

    #[tokio::test]
    async fn unknown_statement() {
        let factory = SessionFactory::builder(lazy_source("primary", "db1")).build().await.unwrap();
        let err = factory.open_session().select_list("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::StatementNotFound(_)));
    }

    #[tokio::test]
    async fn table_info_served_from_cache() {
        let factory = SessionFactory::builder(lazy_source("primary", "db1")).build().await.unwrap();
        factory.cache_table_info(TableInfo::new("public", "users").with_column("id", "pg_catalog", "int8"));
        let info = factory.table_info("public", "users").await.unwrap();
        assert!(info.has_column("id"));
    }
}
