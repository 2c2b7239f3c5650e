//! Load the datasource config from a JSON file and environment overrides.

use crate::config::types::{DataSourceConfig, DynamicDataSourceConfig};
use crate::config::validate;
use crate::error::ConfigError;
use std::path::Path;

/// Env var naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "DATASOURCE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "datasources.json";

/// Parse config from a JSON string and validate it.
pub fn from_json_str(s: &str) -> Result<DynamicDataSourceConfig, ConfigError> {
    let config: DynamicDataSourceConfig =
        serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Read and validate a JSON config file.
pub async fn load_from_path(path: &Path) -> Result<DynamicDataSourceConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    from_json_str(&raw)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `DATASOURCE_PRIMARY` and `DATASOURCE_MULTIPLE_TX` on top of a loaded config.
pub fn apply_env_overrides(
    config: &mut DynamicDataSourceConfig,
    get: impl Fn(&str) -> Option<String>,
) {
    if let Some(primary) = get("DATASOURCE_PRIMARY").filter(|s| !s.trim().is_empty()) {
        config.primary = Some(primary);
    }
    if let Some(v) = get("DATASOURCE_MULTIPLE_TX") {
        match parse_bool(&v) {
            Some(b) => config.enable_multiple_tx = b,
            None => tracing::warn!(value = %v, "ignoring unparsable DATASOURCE_MULTIPLE_TX"),
        }
    }
}

/// Load from `$DATASOURCE_CONFIG` (default `datasources.json`). When the file does not exist,
/// fall back to a single primary datasource from `DATABASE_URL`. A `.env` file is read first if present.
pub async fn load_from_env() -> Result<DynamicDataSourceConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let path = Path::new(&path);
    let mut config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tracing::info!(path = %path.display(), "loading datasource config");
        load_from_path(path).await?
    } else {
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            ConfigError::Load(format!(
                "{} not found and DATABASE_URL is not set",
                path.display()
            ))
        })?;
        tracing::info!("no datasource config file, using DATABASE_URL as the only datasource");
        DynamicDataSourceConfig {
            default: DataSourceConfig::from_url(url),
            ..DynamicDataSourceConfig::single(String::new())
        }
    };
    apply_env_overrides(&mut config, |k| std::env::var(k).ok());
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn from_json_str_reports_parse_errors() {
        assert!(matches!(from_json_str("{"), Err(ConfigError::Load(_))));
    }

    #[test]
    fn from_json_str_validates() {
        let err = from_json_str(r#"{ "default": { "url": "" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn from_json_str_rejects_bad_authorize_rule() {
        let err = from_json_str(
            r#"{ "default": { "url": "postgres://localhost/db1" },
                 "resources": [ { "path_segment": "users", "table": "users", "authorize": "admin" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn env_overrides_primary_and_tx() {
        let mut cfg = DynamicDataSourceConfig::single("postgres://localhost/a");
        let env: HashMap<&str, &str> =
            [("DATASOURCE_PRIMARY", "master"), ("DATASOURCE_MULTIPLE_TX", "yes")].into();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.primary_name(), "master");
        assert!(cfg.enable_multiple_tx);
    }

    #[tokio::test]
    async fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.json");
        tokio::fs::write(
            &path,
            r#"{ "primary": "primary", "default": { "url": "postgres://localhost/db1" },
                 "datasources": { "reports": { "url": "postgres://localhost/db2" } } }"#,
        )
        .await
        .unwrap();
        let cfg = load_from_path(&path).await.unwrap();
        assert_eq!(cfg.primary_name(), "primary");
        assert!(cfg.datasources.contains_key("reports"));
    }
}
