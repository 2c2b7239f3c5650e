//! Dynamic datasource: per-request routing across named PostgreSQL pools, one session
//! factory per datasource, optional two-phase commit across them, and generic CRUD routes.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod datasource;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod routing;
pub mod service;
pub mod session;
pub mod sql;
pub mod state;
pub mod tx;

pub use auth::{AllowAll, Authorizer, ConfigAuthorizer};
pub use bootstrap::{autoconfigure, autoconfigure_with, DynamicDataSource};
pub use config::{load_from_env, load_from_path, DynamicDataSourceConfig, ResourceModel, DEFAULT_PRIMARY};
pub use datasource::{ConnectionSource, DataSourceRouter};
pub use error::{AppError, ConfigError, DataSourceError, SessionError, XaError};
pub use response::{Envelope, Meta};
pub use routes::{common_routes, common_routes_with_ready, crud_routes};
pub use routing::{HeaderRouteSelector, ResourceRouteSelector, RouteSelector, RoutingContext};
pub use service::{CrudService, SessionCrudService};
pub use session::{SessionFactory, SessionFactoryRegistry, SqlSession};
pub use state::AppState;
pub use tx::{GlobalTransaction, TransactionCoordinator};
