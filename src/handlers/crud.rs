//! Resource CRUD handlers: list, create, read, update, delete.

use crate::config::{Operation, PkType, ResourceDef};
use crate::error::AppError;
use crate::extractors::{DataSourceKey, Principal};
use crate::response;
use crate::routing::RoutingContext;
use crate::service::ListQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn parse_id(id_str: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn list_query(params: HashMap<String, String>) -> Result<ListQuery, AppError> {
    let mut q = ListQuery::default();
    for (k, v) in params {
        match k.as_str() {
            "limit" => q.limit = Some(v.parse().map_err(|_| AppError::BadRequest("invalid limit".into()))?),
            "offset" => q.offset = Some(v.parse().map_err(|_| AppError::BadRequest("invalid offset".into()))?),
            _ => q.filters.push((k, Value::String(v))),
        }
    }
    // HashMap order is arbitrary; keep placeholders stable
    q.filters.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(q)
}

/// Resource, routing context and the name of the datasource the context resolves to.
struct Routed {
    resource: ResourceDef,
    ctx: RoutingContext,
    datasource: String,
}

/// Look up the resource, check the operation and the caller, then pick the datasource.
fn prepare(
    state: &AppState,
    path_segment: &str,
    op: Operation,
    principal: &Principal,
    requested: &DataSourceKey,
) -> Result<Routed, AppError> {
    let resource = state
        .resources
        .by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !resource.allows(op) {
        return Err(AppError::BadRequest(format!("{} not allowed", op.as_str())));
    }
    state.authorizer.authorize(principal, resource, op)?;
    let ctx = state.selector.select(requested.as_deref(), resource);
    let datasource = state.router.resolve_name(ctx.key()).to_string();
    tracing::debug!(
        resource = %resource.path_segment,
        op = op.as_str(),
        datasource = %datasource,
        "routed"
    );
    Ok(Routed {
        resource: resource.clone(),
        ctx,
        datasource,
    })
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    requested: DataSourceKey,
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let Routed { resource, ctx, datasource } = prepare(&state, &path_segment, Operation::List, &principal, &requested)?;
    let query = list_query(params)?;
    let rows = state.service.list(&ctx, &resource, &query).await?;
    Ok(response::many(&datasource, rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    requested: DataSourceKey,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let Routed { resource, ctx, datasource } = prepare(&state, &path_segment, Operation::Create, &principal, &requested)?;
    let body = body_to_map(body)?;
    let row = state.service.create(&ctx, &resource, body).await?;
    Ok(response::created(&datasource, row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    requested: DataSourceKey,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let Routed { resource, ctx, datasource } = prepare(&state, &path_segment, Operation::Read, &principal, &requested)?;
    let id = parse_id(&id_str, &resource.pk_type)?;
    let row = state
        .service
        .read(&ctx, &resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(response::one(&datasource, row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    requested: DataSourceKey,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let Routed { resource, ctx, datasource } = prepare(&state, &path_segment, Operation::Update, &principal, &requested)?;
    let id = parse_id(&id_str, &resource.pk_type)?;
    let body = body_to_map(body)?;
    let row = state
        .service
        .update(&ctx, &resource, &id, body)
        .await?
        .ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(response::one(&datasource, row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    requested: DataSourceKey,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let Routed { resource, ctx, .. } = prepare(&state, &path_segment, Operation::Delete, &principal, &requested)?;
    let id = parse_id(&id_str, &resource.pk_type)?;
    state
        .service
        .delete(&ctx, &resource, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(id_str))?;
    Ok(StatusCode::NO_CONTENT)
}
