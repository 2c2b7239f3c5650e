//! Shared application state for all routes.

use crate::auth::Authorizer;
use crate::config::ResourceModel;
use crate::datasource::DataSourceRouter;
use crate::routing::RouteSelector;
use crate::service::CrudService;
use crate::session::SessionFactoryRegistry;
use crate::tx::TransactionCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<DataSourceRouter>,
    pub sessions: Arc<SessionFactoryRegistry>,
    /// Present only when distributed transactions are active.
    pub coordinator: Option<Arc<TransactionCoordinator>>,
    pub resources: Arc<ResourceModel>,
    pub service: Arc<dyn CrudService>,
    pub authorizer: Arc<dyn Authorizer>,
    pub selector: Arc<dyn RouteSelector>,
}
