//! Raw config types matching the datasource JSON file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name used for the primary datasource when none is configured.
pub const DEFAULT_PRIMARY: &str = "default";

/// Drivers accepted in `driver`. Only PostgreSQL pools are built.
pub const SUPPORTED_DRIVERS: &[&str] = &["postgres", "postgresql"];

fn default_driver() -> String {
    "postgres".into()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> Option<u64> {
    Some(600)
}

fn default_max_lifetime_secs() -> Option<u64> {
    Some(1800)
}

fn default_scripting_driver() -> String {
    crate::session::HASH_DRIVER.into()
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".into()
}

fn default_primary_key() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_secs: default_acquire_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

/// Connection parameters for one logical datasource.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSourceConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Attaches a plugin to this datasource's session factory that rejects writes.
    #[serde(default)]
    pub read_only: bool,
}

impl DataSourceConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        DataSourceConfig {
            url: url.into(),
            username: None,
            password: None,
            driver: default_driver(),
            pool: PoolConfig::default(),
            read_only: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    /// Mapper files or `dir/*.json` patterns, relative to the working directory.
    #[serde(default)]
    pub mapper_locations: Vec<String>,
    #[serde(default = "default_scripting_driver")]
    pub default_scripting_driver: String,
    /// Columns masked in every result row.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    #[serde(default)]
    pub banner: bool,
    /// Build every session factory at startup so mapper errors abort boot.
    #[serde(default = "default_true")]
    pub eager_init: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            mapper_locations: Vec::new(),
            default_scripting_driver: default_scripting_driver(),
            sensitive_columns: Vec::new(),
            banner: false,
            eager_init: true,
        }
    }
}

/// Primary key type for parsing path/body ids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PkType {
    Uuid,
    #[default]
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    pub path_segment: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub pk_type: PkType,
    /// Subset of list, create, read, update, delete. Empty means all.
    #[serde(default)]
    pub operations: Vec<String>,
    /// Fixed routing key for this resource; a request header still overrides it.
    #[serde(default)]
    pub datasource: Option<String>,
    /// `anonymous`, `login` or `role:<name>`.
    #[serde(default)]
    pub authorize: Option<String>,
}

/// Full configuration surface: datasources, routing switches, session settings and CRUD resources.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DynamicDataSourceConfig {
    #[serde(default)]
    pub primary: Option<String>,
    /// The primary datasource's own connection parameters.
    pub default: DataSourceConfig,
    #[serde(default)]
    pub datasources: BTreeMap<String, DataSourceConfig>,
    #[serde(default)]
    pub enable_multiple_tx: bool,
    /// Unknown routing keys fail instead of falling back to the primary.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl DynamicDataSourceConfig {
    /// Config with only a primary datasource.
    pub fn single(url: impl Into<String>) -> Self {
        DynamicDataSourceConfig {
            primary: None,
            default: DataSourceConfig::from_url(url),
            datasources: BTreeMap::new(),
            enable_multiple_tx: false,
            strict: false,
            session: SessionSettings::default(),
            resources: Vec::new(),
        }
    }

    /// Primary name with empty or missing values normalized to [`DEFAULT_PRIMARY`].
    pub fn primary_name(&self) -> &str {
        match self.primary.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_PRIMARY,
        }
    }

    /// XA enlistment applies only when more than the primary is configured.
    pub fn multiple_tx_active(&self) -> bool {
        self.enable_multiple_tx && !self.datasources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_name_uses_single_sentinel() {
        let mut cfg = DynamicDataSourceConfig::single("postgres://localhost/a");
        assert_eq!(cfg.primary_name(), DEFAULT_PRIMARY);
        cfg.primary = Some("  ".into());
        assert_eq!(cfg.primary_name(), DEFAULT_PRIMARY);
        cfg.primary = Some("master".into());
        assert_eq!(cfg.primary_name(), "master");
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: DynamicDataSourceConfig = serde_json::from_value(serde_json::json!({
            "default": { "url": "postgres://localhost/db1" },
            "datasources": { "reports": { "url": "postgres://localhost/db2", "read_only": true } },
            "resources": [{ "path_segment": "users", "table": "users" }]
        }))
        .unwrap();
        assert_eq!(cfg.default.driver, "postgres");
        assert_eq!(cfg.default.pool.max_connections, 10);
        assert!(cfg.datasources["reports"].read_only);
        assert!(cfg.session.eager_init);
        assert_eq!(cfg.resources[0].schema, "public");
        assert_eq!(cfg.resources[0].pk_type, PkType::BigInt);
        assert!(!cfg.multiple_tx_active());
    }
}
