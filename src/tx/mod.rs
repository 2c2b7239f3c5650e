//! Distributed transactions across datasources.

mod coordinator;
mod transaction;

pub use coordinator::{xa_resource_name, TransactionCoordinator, XaResource};
pub use transaction::GlobalTransaction;
