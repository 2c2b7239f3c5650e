//! Routes a logical datasource name to its connection source, falling back to the primary.

use crate::datasource::ConnectionSource;
use crate::error::DataSourceError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collects sources at startup; `build` checks the primary designation.
#[derive(Default, Debug)]
pub struct DataSourceRouterBuilder {
    sources: BTreeMap<String, Arc<ConnectionSource>>,
}

impl DataSourceRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: Arc<ConnectionSource>,
    ) -> Result<&mut Self, DataSourceError> {
        let name = name.into();
        if self.sources.contains_key(&name) {
            return Err(DataSourceError::Duplicate(name));
        }
        tracing::debug!(datasource = %name, "registered datasource");
        self.sources.insert(name, source);
        Ok(self)
    }

    pub fn build(self, primary: impl Into<String>) -> Result<DataSourceRouter, DataSourceError> {
        let primary = primary.into();
        let primary_source = self
            .sources
            .get(&primary)
            .cloned()
            .ok_or_else(|| DataSourceError::MissingPrimary(primary.clone()))?;
        Ok(DataSourceRouter {
            sources: self.sources,
            primary,
            primary_source,
        })
    }
}

/// Read-only after construction. Cheap to share behind `Arc`.
#[derive(Debug)]
pub struct DataSourceRouter {
    sources: BTreeMap<String, Arc<ConnectionSource>>,
    primary: String,
    primary_source: Arc<ConnectionSource>,
}

impl DataSourceRouter {
    pub fn builder() -> DataSourceRouterBuilder {
        DataSourceRouterBuilder::new()
    }

    /// Absent, empty or unknown keys resolve to the primary.
    pub fn resolve(&self, key: Option<&str>) -> Arc<ConnectionSource> {
        match key.filter(|k| !k.is_empty()).and_then(|k| self.sources.get(k)) {
            Some(source) => source.clone(),
            None => {
                if let Some(k) = key.filter(|k| !k.is_empty()) {
                    tracing::debug!(datasource = %k, primary = %self.primary, "unknown routing key, using primary");
                }
                self.primary_source.clone()
            }
        }
    }

    /// Like `resolve`, but an unknown non-empty key is an error.
    pub fn resolve_strict(&self, key: Option<&str>) -> Result<Arc<ConnectionSource>, DataSourceError> {
        match key.filter(|k| !k.is_empty()) {
            None => Ok(self.primary_source.clone()),
            Some(k) => self
                .sources
                .get(k)
                .cloned()
                .ok_or_else(|| DataSourceError::Unknown(k.to_string())),
        }
    }

    /// Name of the source a key would resolve to.
    pub fn resolve_name<'a>(&'a self, key: Option<&'a str>) -> &'a str {
        match key.filter(|k| self.sources.contains_key(*k)) {
            Some(k) => k,
            None => &self.primary,
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &Arc<ConnectionSource>)> {
        self.sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    pub(crate) fn lazy_source(name: &str, db: &str) -> Arc<ConnectionSource> {
        let pool = PgPoolOptions::new()
            .connect_lazy(&format!("postgres://localhost:1/{}", db))
            .unwrap();
        Arc::new(ConnectionSource::new(name, "postgres", pool))
    }

    pub(crate) fn two_source_router() -> DataSourceRouter {
        let mut b = DataSourceRouter::builder();
        b.register("primary", lazy_source("primary", "db1")).unwrap();
        b.register("reports", lazy_source("reports", "db2")).unwrap();
        b.build("primary").unwrap()
    }

    #[tokio::test]
    async fn resolves_registered_names_exactly() {
        let db1 = lazy_source("primary", "db1");
        let db2 = lazy_source("reports", "db2");
        let mut b = DataSourceRouter::builder();
        b.register("primary", db1.clone()).unwrap();
        b.register("reports", db2.clone()).unwrap();
        let router = b.build("primary").unwrap();

        assert!(Arc::ptr_eq(&router.resolve(Some("reports")), &db2));
        assert!(Arc::ptr_eq(&router.resolve(Some("primary")), &db1));
    }

    #[tokio::test]
    async fn unknown_and_absent_keys_fall_back_to_primary() {
        let router = two_source_router();
        assert_eq!(router.resolve(None).name(), "primary");
        assert_eq!(router.resolve(Some("")).name(), "primary");
        assert_eq!(router.resolve(Some("archive")).name(), "primary");
        assert_eq!(router.resolve_name(Some("archive")), "primary");
        assert_eq!(router.resolve_name(Some("reports")), "reports");
    }

    #[tokio::test]
    async fn strict_resolution_rejects_unknown() {
        let router = two_source_router();
        assert!(matches!(
            router.resolve_strict(Some("archive")),
            Err(DataSourceError::Unknown(_))
        ));
        assert_eq!(router.resolve_strict(None).unwrap().name(), "primary");
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut b = DataSourceRouter::builder();
        b.register("primary", lazy_source("primary", "db1")).unwrap();
        let err = b.register("primary", lazy_source("primary", "db3")).unwrap_err();
        assert!(matches!(err, DataSourceError::Duplicate(n) if n == "primary"));
    }

    #[tokio::test]
    async fn build_without_primary_fails() {
        let mut b = DataSourceRouter::builder();
        b.register("reports", lazy_source("reports", "db2")).unwrap();
        assert!(matches!(b.build("primary"), Err(DataSourceError::MissingPrimary(_))));
    }
}
