//! Startup wiring: validated config in, routed pools, coordinator and session registry out.

use crate::auth::ConfigAuthorizer;
use crate::config::{validate, DynamicDataSourceConfig, ResourceModel};
use crate::datasource::{connect_source, DataSourceRouter};
use crate::error::AppError;
use crate::routing::HeaderRouteSelector;
use crate::service::SessionCrudService;
use crate::session::SessionFactoryRegistry;
use crate::state::AppState;
use crate::tx::{xa_resource_name, TransactionCoordinator, XaResource};
use std::sync::Arc;

/// Everything built from one configuration.
pub struct DynamicDataSource {
    pub router: Arc<DataSourceRouter>,
    pub sessions: Arc<SessionFactoryRegistry>,
    pub coordinator: Option<Arc<TransactionCoordinator>>,
    pub resources: Arc<ResourceModel>,
}

impl DynamicDataSource {
    /// App state with the default CRUD service, config-driven authorization and header routing.
    pub fn into_state(self) -> AppState {
        AppState {
            service: Arc::new(SessionCrudService::new(self.sessions.clone())),
            authorizer: Arc::new(ConfigAuthorizer),
            selector: Arc::new(HeaderRouteSelector),
            router: self.router,
            sessions: self.sessions,
            coordinator: self.coordinator,
            resources: self.resources,
        }
    }
}

pub async fn autoconfigure(config: &DynamicDataSourceConfig) -> Result<DynamicDataSource, AppError> {
    autoconfigure_with(config, |registry| registry).await
}

/// Like [`autoconfigure`], with a hook to add customizers or a global config provider
/// before any session factory is built.
pub async fn autoconfigure_with<F>(config: &DynamicDataSourceConfig, customize: F) -> Result<DynamicDataSource, AppError>
where
    F: FnOnce(SessionFactoryRegistry) -> SessionFactoryRegistry,
{
    validate(config)?;
    let resources = Arc::new(ResourceModel::resolve(&config.resources)?);
    let primary = config.primary_name().to_string();

    let coordinator = if config.multiple_tx_active() {
        let c = Arc::new(TransactionCoordinator::new());
        c.start();
        Some(c)
    } else {
        if config.enable_multiple_tx {
            tracing::warn!("multiple-datasource transactions enabled but only the primary is configured; skipping");
        }
        None
    };

    let mut builder = DataSourceRouter::builder();
    let all = std::iter::once((primary.as_str(), &config.default))
        .chain(config.datasources.iter().map(|(n, ds)| (n.as_str(), ds)));
    for (name, ds) in all {
        let xa_name = coordinator.as_ref().map(|_| xa_resource_name(name));
        let source = Arc::new(connect_source(name, ds, xa_name)?);
        if let Some(c) = &coordinator {
            c.enlist(XaResource::new(source.clone()))?;
        }
        builder.register(name, source)?;
    }
    let router = Arc::new(builder.build(primary)?);
    tracing::info!(
        primary = %router.primary_name(),
        datasources = router.len(),
        xa = coordinator.is_some(),
        "datasources configured"
    );

    let registry = SessionFactoryRegistry::new(router.clone(), config.session.clone()).with_strict(config.strict);
    let sessions = Arc::new(customize(registry));
    if config.session.eager_init {
        sessions.initialize_all().await?;
    }

    Ok(DynamicDataSource {
        router,
        sessions,
        coordinator,
        resources,
    })
}
