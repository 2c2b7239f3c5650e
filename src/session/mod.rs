//! Session factories: per-datasource statement configuration, mapper loading and execution.

mod factory;
pub mod mapper;
mod metadata;
pub mod plugin;
mod registry;
mod row;
mod scripting;

pub use factory::{SessionConfiguration, SessionFactory, SessionFactoryBuilder, SqlSession};
pub use mapper::{MappedStatement, StatementKind};
pub use metadata::{ColumnType, TableInfo};
pub use plugin::{
    GlobalConfig, Interceptor, KeyGenerator, MaskingTypeHandler, MetaObjectHandler, ReadOnlyInterceptor,
    TimestampFill, TypeHandler, UuidKeyGenerator,
};
pub use registry::{GlobalConfigProvider, SessionCustomizer, SessionFactoryRegistry};
pub use scripting::{BoundStatement, HashParamDriver, LanguageDriver, RowShape, HASH_DRIVER};
