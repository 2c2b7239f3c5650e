//! A named, pooled connection source.

use sqlx::PgPool;

/// Live pool for one logical datasource. Immutable once built; the pool handles its own churn.
#[derive(Clone, Debug)]
pub struct ConnectionSource {
    name: String,
    driver: String,
    pool: PgPool,
    read_only: bool,
    /// Set when the source is enlisted with the transaction coordinator.
    xa_resource_name: Option<String>,
}

impl ConnectionSource {
    pub fn new(name: impl Into<String>, driver: impl Into<String>, pool: PgPool) -> Self {
        ConnectionSource {
            name: name.into(),
            driver: driver.into(),
            pool,
            read_only: false,
            xa_resource_name: None,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_xa_resource_name(mut self, name: impl Into<String>) -> Self {
        self.xa_resource_name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn xa_resource_name(&self) -> Option<&str> {
        self.xa_resource_name.as_deref()
    }

    /// Round-trip `SELECT 1`; used by readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}
