//! One lazily built, memoized session factory per logical datasource.

use crate::config::SessionSettings;
use crate::datasource::DataSourceRouter;
use crate::error::SessionError;
use crate::session::factory::{SessionFactory, SessionFactoryBuilder};
use crate::session::plugin::{GlobalConfig, MaskingTypeHandler, ReadOnlyInterceptor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Adjusts a factory builder before it is built; receives the logical datasource name.
pub trait SessionCustomizer: Send + Sync {
    fn customize(&self, datasource: &str, builder: SessionFactoryBuilder) -> SessionFactoryBuilder;
}

impl<F> SessionCustomizer for F
where
    F: Fn(&str, SessionFactoryBuilder) -> SessionFactoryBuilder + Send + Sync,
{
    fn customize(&self, datasource: &str, builder: SessionFactoryBuilder) -> SessionFactoryBuilder {
        self(datasource, builder)
    }
}

/// Produces a new global config for every factory built.
pub type GlobalConfigProvider = Arc<dyn Fn(&str) -> GlobalConfig + Send + Sync>;

pub struct SessionFactoryRegistry {
    router: Arc<DataSourceRouter>,
    settings: SessionSettings,
    strict: bool,
    customizers: Vec<Arc<dyn SessionCustomizer>>,
    global_config: GlobalConfigProvider,
    factories: HashMap<String, OnceCell<Arc<SessionFactory>>>,
    builds: AtomicUsize,
}

impl SessionFactoryRegistry {
    pub fn new(router: Arc<DataSourceRouter>, settings: SessionSettings) -> Self {
        let factories = router.names().map(|n| (n.to_string(), OnceCell::new())).collect();
        let banner = settings.banner;
        SessionFactoryRegistry {
            router,
            settings,
            strict: false,
            customizers: Vec::new(),
            global_config: Arc::new(move |_: &str| GlobalConfig::defaults().with_banner(banner)),
            factories,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_customizer(mut self, customizer: Arc<dyn SessionCustomizer>) -> Self {
        self.customizers.push(customizer);
        self
    }

    pub fn with_global_config(mut self, provider: GlobalConfigProvider) -> Self {
        self.global_config = provider;
        self
    }

    pub fn router(&self) -> &Arc<DataSourceRouter> {
        &self.router
    }

    /// Number of factory builds that completed successfully.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Factory for the routed datasource. Absent or unknown keys use the primary unless strict.
    pub async fn factory_for(&self, key: Option<&str>) -> Result<Arc<SessionFactory>, SessionError> {
        let name = if self.strict {
            self.router.resolve_strict(key)?;
            self.router.resolve_name(key)
        } else {
            self.router.resolve_name(key)
        };
        let cell = self
            .factories
            .get(name)
            .ok_or_else(|| crate::error::DataSourceError::Unknown(name.to_string()))?;
        let factory = cell.get_or_try_init(|| self.build_factory(name)).await?;
        Ok(factory.clone())
    }

    /// Build every factory now; the first failure is returned.
    pub async fn initialize_all(&self) -> Result<(), SessionError> {
        for name in self.router.names() {
            self.factory_for(Some(name)).await?;
        }
        Ok(())
    }

    async fn build_factory(&self, name: &str) -> Result<Arc<SessionFactory>, SessionError> {
        let source = self.router.resolve(Some(name));
        let mut builder = SessionFactory::builder(source.clone())
            .mapper_locations(self.settings.mapper_locations.iter().cloned())
            .default_scripting_driver(self.settings.default_scripting_driver.clone());
        if !self.settings.sensitive_columns.is_empty() {
            builder = builder.type_handler(Arc::new(MaskingTypeHandler::new(
                self.settings.sensitive_columns.iter().cloned(),
            )));
        }
        if source.is_read_only() {
            builder = builder.plugin(Arc::new(ReadOnlyInterceptor));
        }
        for c in &self.customizers {
            builder = c.customize(name, builder);
        }
        builder = builder.global_config((self.global_config)(name));

        match builder.build().await {
            Ok(factory) => {
                self.builds.fetch_add(1, Ordering::Relaxed);
                tracing::info!(datasource = %name, "session factory built");
                Ok(Arc::new(factory))
            }
            Err(e) => {
                tracing::error!(datasource = %name, error = %e, "session factory build failed");
                Err(SessionError::Build {
                    datasource: name.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::router::tests::{lazy_source, two_source_router};
    use crate::session::plugin::UuidKeyGenerator;

    fn registry() -> SessionFactoryRegistry {
        SessionFactoryRegistry::new(Arc::new(two_source_router()), SessionSettings::default())
    }

    #[tokio::test]
    async fn memoizes_per_datasource() {
        let reg = registry();
        let a = reg.factory_for(Some("reports")).await.unwrap();
        let b = reg.factory_for(Some("reports")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.builds(), 1);
    }

    #[tokio::test]
    async fn routes_tagged_and_untagged_requests() {
        let reg = registry();
        assert_eq!(reg.factory_for(Some("reports")).await.unwrap().datasource(), "reports");
        assert_eq!(reg.factory_for(None).await.unwrap().datasource(), "primary");
        let unknown = reg.factory_for(Some("archive")).await.unwrap();
        let primary = reg.factory_for(Some("primary")).await.unwrap();
        assert!(Arc::ptr_eq(&unknown, &primary));
    }

    #[tokio::test]
    async fn strict_registry_rejects_unknown_key() {
        let reg = registry().with_strict(true);
        assert!(matches!(
            reg.factory_for(Some("archive")).await,
            Err(SessionError::Routing(_))
        ));
        assert!(reg.factory_for(None).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_builds_once() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                tokio::spawn(async move { reg.factory_for(Some("reports")).await.unwrap() })
            })
            .collect();
        let mut factories = Vec::new();
        for h in handles {
            factories.push(h.await.unwrap());
        }
        assert!(factories.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.builds(), 1);
    }

    #[tokio::test]
    async fn global_config_is_not_shared() {
        let reg = registry().with_global_config(Arc::new(|_: &str| {
            GlobalConfig::defaults().with_key_generator(Arc::new(UuidKeyGenerator))
        }));
        let a = reg.factory_for(Some("primary")).await.unwrap();
        let b = reg.factory_for(Some("reports")).await.unwrap();
        assert!(!std::ptr::eq(a.global(), b.global()));
        let (ka, kb) = (
            a.global().key_generator.as_ref().unwrap(),
            b.global().key_generator.as_ref().unwrap(),
        );
        assert!(!Arc::ptr_eq(ka, kb));
    }

    #[tokio::test]
    async fn build_failure_is_isolated_to_one_datasource() {
        let reg = registry().with_customizer(Arc::new(|ds: &str, b: SessionFactoryBuilder| {
            if ds == "reports" {
                b.mapper_locations(["/nonexistent/reports.json"])
            } else {
                b
            }
        }));
        let err = reg.factory_for(Some("reports")).await.unwrap_err();
        assert!(matches!(err, SessionError::Build { ref datasource, .. } if datasource == "reports"));
        assert!(reg.factory_for(Some("primary")).await.is_ok());
        // failures are not memoized
        assert!(reg.factory_for(Some("reports")).await.is_err());
        assert!(reg.initialize_all().await.is_err());
    }

    #[tokio::test]
    async fn read_only_sources_get_the_interceptor() {
        let mut b = DataSourceRouter::builder();
        b.register("primary", lazy_source("primary", "db1")).unwrap();
        let ro = (*lazy_source("reports", "db2")).clone().with_read_only(true);
        b.register("reports", Arc::new(ro)).unwrap();
        let mut settings = SessionSettings::default();
        settings.sensitive_columns = vec!["password".into()];
        let reg = SessionFactoryRegistry::new(Arc::new(b.build("primary").unwrap()), settings);
        let reports = reg.factory_for(Some("reports")).await.unwrap();
        let primary = reg.factory_for(None).await.unwrap();
        assert_eq!(reports.configuration().plugin_names(), vec!["read_only"]);
        assert!(primary.configuration().plugin_names().is_empty());
        assert_eq!(primary.configuration().type_handler_count(), 1);
    }
}
