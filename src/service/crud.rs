//! Generic CRUD execution through the routed session factory.

use crate::config::ResourceDef;
use crate::error::AppError;
use crate::routing::RoutingContext;
use crate::session::{GlobalConfig, SessionFactory, SessionFactoryRegistry, TableInfo};
use crate::sql;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Exact-match filters plus paging for list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    /// Limit defaults to 100 and is capped at 1000.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// CRUD over a configured resource. Every call names its routing context explicitly.
#[async_trait]
pub trait CrudService: Send + Sync {
    async fn list(&self, ctx: &RoutingContext, resource: &ResourceDef, query: &ListQuery) -> Result<Vec<Value>, AppError>;

    async fn create(
        &self,
        ctx: &RoutingContext,
        resource: &ResourceDef,
        body: Map<String, Value>,
    ) -> Result<Value, AppError>;

    async fn read(&self, ctx: &RoutingContext, resource: &ResourceDef, id: &Value) -> Result<Option<Value>, AppError>;

    async fn update(
        &self,
        ctx: &RoutingContext,
        resource: &ResourceDef,
        id: &Value,
        body: Map<String, Value>,
    ) -> Result<Option<Value>, AppError>;

    async fn delete(&self, ctx: &RoutingContext, resource: &ResourceDef, id: &Value) -> Result<Option<Value>, AppError>;
}

/// Default service: SQL built from table metadata, executed on the routed factory's pool.
pub struct SessionCrudService {
    sessions: Arc<SessionFactoryRegistry>,
}

impl SessionCrudService {
    pub fn new(sessions: Arc<SessionFactoryRegistry>) -> Self {
        SessionCrudService { sessions }
    }

    async fn target(
        &self,
        ctx: &RoutingContext,
        resource: &ResourceDef,
    ) -> Result<(Arc<SessionFactory>, Arc<TableInfo>), AppError> {
        let factory = self.sessions.factory_for(ctx.key()).await?;
        let info = factory.table_info(&resource.schema, &resource.table).await?;
        Ok((factory, info))
    }
}

/// Apply the factory's key generator and insert fill. Filled keys the table lacks are dropped.
pub(crate) fn prepare_insert(
    global: &GlobalConfig,
    resource: &ResourceDef,
    info: &TableInfo,
    mut body: Map<String, Value>,
) -> Map<String, Value> {
    let supplied: Vec<String> = body.keys().cloned().collect();
    if !body.contains_key(&resource.primary_key) {
        if let Some(id) = global.key_generator.as_ref().and_then(|g| g.generate(&resource.table)) {
            body.insert(resource.primary_key.clone(), id);
        }
    }
    if let Some(h) = &global.meta_object_handler {
        h.insert_fill(&resource.table, &mut body);
    }
    body.retain(|k, _| supplied.contains(k) || info.has_column(k));
    body
}

/// Apply update fill. Filled keys the table lacks are dropped.
pub(crate) fn prepare_update(
    global: &GlobalConfig,
    resource: &ResourceDef,
    info: &TableInfo,
    mut body: Map<String, Value>,
) -> Map<String, Value> {
    let supplied: Vec<String> = body.keys().cloned().collect();
    if let Some(h) = &global.meta_object_handler {
        h.update_fill(&resource.table, &mut body);
    }
    body.retain(|k, _| supplied.contains(k) || info.has_column(k));
    body
}

#[async_trait]
impl CrudService for SessionCrudService {
    async fn list(&self, ctx: &RoutingContext, resource: &ResourceDef, query: &ListQuery) -> Result<Vec<Value>, AppError> {
        let (factory, info) = self.target(ctx, resource).await?;
        let q = sql::select_list(
            resource,
            &info,
            &query.filters,
            query.effective_limit(),
            query.effective_offset(),
        )?;
        Ok(factory.open_session().query(q).await?)
    }

    async fn create(
        &self,
        ctx: &RoutingContext,
        resource: &ResourceDef,
        body: Map<String, Value>,
    ) -> Result<Value, AppError> {
        let (factory, info) = self.target(ctx, resource).await?;
        let body = prepare_insert(factory.global(), resource, &info, body);
        let q = sql::insert(resource, &info, &body)?;
        factory
            .open_session()
            .query_optional(q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn read(&self, ctx: &RoutingContext, resource: &ResourceDef, id: &Value) -> Result<Option<Value>, AppError> {
        let (factory, info) = self.target(ctx, resource).await?;
        let q = sql::select_by_id(resource, &info, id)?;
        Ok(factory.open_session().query_optional(q).await?)
    }

    async fn update(
        &self,
        ctx: &RoutingContext,
        resource: &ResourceDef,
        id: &Value,
        body: Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let (factory, info) = self.target(ctx, resource).await?;
        let body = prepare_update(factory.global(), resource, &info, body);
        let q = sql::update(resource, &info, id, &body)?;
        Ok(factory.open_session().query_optional(q).await?)
    }

    async fn delete(&self, ctx: &RoutingContext, resource: &ResourceDef, id: &Value) -> Result<Option<Value>, AppError> {
        let (factory, info) = self.target(ctx, resource).await?;
        let q = sql::delete(resource, &info, id)?;
        Ok(factory.open_session().query_optional(q).await?)
    }
}
