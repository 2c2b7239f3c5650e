//! Resource CRUD routes under `/rest`.
//! Paths are parameterized so handlers resolve the resource by segment at request time.

use crate::handlers::crud::{create, delete as delete_handler, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this are rejected with 413.
pub const BODY_LIMIT: usize = 1024 * 1024;

pub fn crud_routes(state: AppState) -> Router {
    Router::new()
        .route("/rest/:path_segment", get(list).post(create))
        .route(
            "/rest/:path_segment/:id",
            get(read).patch(update).put(update).delete(delete_handler),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}
