//! Validate a datasource config before any pool is built.

use crate::config::resolved::ResourceModel;
use crate::config::types::{DataSourceConfig, DynamicDataSourceConfig, SUPPORTED_DRIVERS};
use crate::error::ConfigError;
use std::collections::HashSet;

fn validate_datasource(name: &str, ds: &DataSourceConfig) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation("datasource name must not be empty".into()));
    }
    if ds.url.trim().is_empty() {
        return Err(ConfigError::Validation(format!("datasource '{}': url is required", name)));
    }
    if !SUPPORTED_DRIVERS.iter().any(|d| d.eq_ignore_ascii_case(&ds.driver)) {
        return Err(ConfigError::UnsupportedDriver {
            name: name.to_string(),
            driver: ds.driver.clone(),
        });
    }
    if ds.pool.max_connections == 0 {
        return Err(ConfigError::Validation(format!(
            "datasource '{}': pool.max_connections must be > 0",
            name
        )));
    }
    if ds.pool.min_connections > ds.pool.max_connections {
        return Err(ConfigError::Validation(format!(
            "datasource '{}': pool.min_connections exceeds max_connections",
            name
        )));
    }
    Ok(())
}

/// Check datasources, primary designation and resource definitions.
pub fn validate(config: &DynamicDataSourceConfig) -> Result<(), ConfigError> {
    let primary = config.primary_name();
    validate_datasource(primary, &config.default)?;
    for (name, ds) in &config.datasources {
        if name == primary {
            return Err(ConfigError::Validation(format!(
                "datasource '{}' collides with the primary name; configure it under `default`",
                name
            )));
        }
        validate_datasource(name, ds)?;
    }

    let mut seen = HashSet::new();
    for res in &config.resources {
        if res.path_segment.is_empty() || res.table.is_empty() {
            return Err(ConfigError::Validation("resource needs path_segment and table".into()));
        }
        if !seen.insert(res.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(res.path_segment.clone()));
        }
        if let Some(ds) = &res.datasource {
            if ds != primary && !config.datasources.contains_key(ds) && config.strict {
                return Err(ConfigError::Validation(format!(
                    "resource '{}' routes to unknown datasource '{}'",
                    res.path_segment, ds
                )));
            }
        }
    }
    // operations and authorize rules must parse
    ResourceModel::resolve(&config.resources)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ResourceConfig;

    fn two_sources() -> DynamicDataSourceConfig {
        let mut cfg = DynamicDataSourceConfig::single("postgres://localhost/db1");
        cfg.primary = Some("primary".into());
        cfg.datasources
            .insert("reports".into(), DataSourceConfig::from_url("postgres://localhost/db2"));
        cfg
    }

    fn resource(path: &str) -> ResourceConfig {
        ResourceConfig {
            path_segment: path.into(),
            schema: "public".into(),
            table: path.into(),
            primary_key: "id".into(),
            pk_type: Default::default(),
            operations: vec![],
            datasource: None,
            authorize: None,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate(&two_sources()).is_ok());
    }

    #[test]
    fn rejects_named_datasource_shadowing_primary() {
        let mut cfg = two_sources();
        cfg.datasources
            .insert("primary".into(), DataSourceConfig::from_url("postgres://localhost/db3"));
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_unsupported_driver() {
        let mut cfg = two_sources();
        cfg.datasources.get_mut("reports").unwrap().driver = "mysql".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::UnsupportedDriver { .. })));
    }

    #[test]
    fn rejects_duplicate_resource_paths() {
        let mut cfg = two_sources();
        cfg.resources = vec![resource("users"), resource("users")];
        assert!(matches!(validate(&cfg), Err(ConfigError::DuplicatePathSegment(_))));
    }

    #[test]
    fn strict_mode_rejects_unknown_resource_route() {
        let mut cfg = two_sources();
        let mut r = resource("users");
        r.datasource = Some("archive".into());
        cfg.resources = vec![r];
        assert!(validate(&cfg).is_ok());
        cfg.strict = true;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_unparseable_resource_rules() {
        let mut cfg = two_sources();
        let mut r = resource("users");
        r.authorize = Some("admin".into());
        cfg.resources = vec![r];
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));

        let mut r = resource("users");
        r.operations = vec!["list".into(), "merge".into()];
        cfg.resources = vec![r];
        assert!(validate(&cfg).is_err());
    }
}
