//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("unsupported driver '{driver}' for datasource '{name}'")]
    UnsupportedDriver { name: String, driver: String },
    #[error("duplicate resource path segment: {0}")]
    DuplicatePathSegment(String),
}

/// Router construction and lookup failures.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("datasource '{0}' is already registered")]
    Duplicate(String),
    #[error("primary datasource '{0}' was never registered")]
    MissingPrimary(String),
    #[error("unknown datasource '{0}' (strict routing)")]
    Unknown(String),
    #[error("datasource '{name}': {message}")]
    Connect { name: String, message: String },
}

/// Session factory build and statement execution failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("mapper {location}: {message}")]
    Mapper { location: String, message: String },
    #[error("duplicate mapped statement '{0}'")]
    DuplicateStatement(String),
    #[error("mapped statement not found: {0}")]
    StatementNotFound(String),
    #[error("unknown scripting driver '{0}'")]
    UnknownDriver(String),
    #[error("table not found or has no columns: {0}")]
    UnknownTable(String),
    #[error("missing statement parameter '{0}'")]
    MissingParameter(String),
    #[error("plugin {plugin} rejected statement: {message}")]
    Rejected { plugin: String, message: String },
    #[error("session factory for '{datasource}' failed to build: {source}")]
    Build {
        datasource: String,
        #[source]
        source: Box<SessionError>,
    },
    #[error(transparent)]
    Routing(#[from] DataSourceError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Distributed transaction coordinator failures.
#[derive(Error, Debug)]
pub enum XaError {
    #[error("transaction coordinator is not started")]
    CoordinatorNotStarted,
    #[error("xa resource '{0}' is already enlisted")]
    DuplicateResource(String),
    #[error("no xa resource enlisted for datasource '{0}'")]
    UnknownResource(String),
    #[error("branch on '{0}' is aborted; every branch was rolled back")]
    BranchAborted(String),
    #[error("transaction {0} is marked rollback-only; every branch was rolled back")]
    RollbackOnly(uuid::Uuid),
    #[error("prepare failed on '{resource}': {source}")]
    Prepare {
        resource: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Xa(#[from] XaError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn db_status(e: &sqlx::Error) -> (StatusCode, &'static str) {
    match e {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "not_found"),
        sqlx::Error::PoolTimedOut => (StatusCode::SERVICE_UNAVAILABLE, "pool_timeout"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
    }
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::DataSource(DataSourceError::Unknown(_)) => (StatusCode::BAD_REQUEST, "unknown_datasource"),
            AppError::DataSource(_) => (StatusCode::INTERNAL_SERVER_ERROR, "datasource_error"),
            AppError::Session(e) => match e {
                SessionError::Db(db) => db_status(db),
                SessionError::Routing(DataSourceError::Unknown(_)) => (StatusCode::BAD_REQUEST, "unknown_datasource"),
                SessionError::StatementNotFound(_) | SessionError::UnknownTable(_) => (StatusCode::NOT_FOUND, "not_found"),
                SessionError::MissingParameter(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                SessionError::Rejected { .. } => (StatusCode::FORBIDDEN, "statement_rejected"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
            },
            AppError::Xa(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transaction_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Db(e) => db_status(e),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
