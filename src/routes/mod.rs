//! Route builders. Each returns a `Router` with its state applied, ready to merge.

mod common;
mod crud;

pub use common::{common_routes, common_routes_with_ready};
pub use crud::{crud_routes, BODY_LIMIT};
