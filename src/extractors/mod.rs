//! Request extractors for routing and identity.

pub mod datasource;
pub mod principal;

pub use datasource::{DataSourceKey, DATASOURCE_HEADER};
pub use principal::{Principal, ROLES_HEADER};
