//! Requested datasource from the `X-DataSource` header.

use crate::error::AppError;
use crate::routing::normalize_key;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const DATASOURCE_HEADER: &str = "X-DataSource";

/// Normalized routing key the caller asked for. `None` when the header is absent or blank;
/// a header that is not visible ASCII is a 400 rather than a silent fall back to the primary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSourceKey(pub Option<String>);

impl DataSourceKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DataSourceKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(DATASOURCE_HEADER) else {
            return Ok(DataSourceKey(None));
        };
        let raw = raw
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{} must be visible ASCII", DATASOURCE_HEADER)))?;
        Ok(DataSourceKey(normalize_key(raw)))
    }
}
