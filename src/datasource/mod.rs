//! Datasource routing: named pools with a designated primary.

mod pool;
pub(crate) mod router;
mod source;

pub use pool::{connect_options, connect_source, pool_options};
pub use router::{DataSourceRouter, DataSourceRouterBuilder};
pub use source::ConnectionSource;
