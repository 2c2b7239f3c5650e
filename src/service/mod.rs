//! CrudService: generic CRUD using the safe SQL builder on the routed datasource.

mod crud;
pub use crud::{CrudService, ListQuery, SessionCrudService, DEFAULT_LIMIT, MAX_LIMIT};
