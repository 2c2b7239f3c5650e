//! Mapper files: named SQL statements grouped under a namespace, loaded from JSON.

use crate::error::SessionError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Select)
    }
}

#[derive(Debug, Deserialize)]
struct MapperFile {
    namespace: String,
    #[serde(default)]
    statements: Vec<StatementDef>,
}

#[derive(Debug, Deserialize)]
struct StatementDef {
    id: String,
    kind: StatementKind,
    sql: String,
    #[serde(default)]
    lang: Option<String>,
}

/// A statement addressable as `namespace.id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedStatement {
    pub id: String,
    pub kind: StatementKind,
    pub sql: String,
    /// Scripting driver name; the factory default when unset.
    pub lang: Option<String>,
}

fn mapper_err(location: &Path, message: impl Into<String>) -> SessionError {
    SessionError::Mapper {
        location: location.display().to_string(),
        message: message.into(),
    }
}

/// Parse one mapper document.
pub fn parse_mapper(location: &Path, raw: &str) -> Result<Vec<MappedStatement>, SessionError> {
    let file: MapperFile = serde_json::from_str(raw).map_err(|e| mapper_err(location, e.to_string()))?;
    if file.namespace.trim().is_empty() {
        return Err(mapper_err(location, "namespace must not be empty"));
    }
    file.statements
        .into_iter()
        .map(|s| {
            if s.id.trim().is_empty() {
                return Err(mapper_err(location, "statement id must not be empty"));
            }
            if s.sql.trim().is_empty() {
                return Err(mapper_err(location, format!("statement '{}' has no sql", s.id)));
            }
            Ok(MappedStatement {
                id: format!("{}.{}", file.namespace, s.id),
                kind: s.kind,
                sql: s.sql,
                lang: s.lang,
            })
        })
        .collect()
}

fn has_wildcard(location: &str) -> bool {
    location.contains(['*', '?', '['])
}

/// Expand mapper locations. A location is a file, a directory (all `*.json` directly inside),
/// or a glob pattern such as `mappers/**/*.json`.
pub async fn resolve_locations(locations: &[String]) -> Result<Vec<PathBuf>, SessionError> {
    let mut out = Vec::new();
    for location in locations {
        let path = Path::new(location);
        let pattern = if has_wildcard(location) {
            location.clone()
        } else if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
            format!("{}/*.json", glob::Pattern::escape(location.trim_end_matches('/')))
        } else {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(mapper_err(path, "file not found"));
            }
            out.push(path.to_path_buf());
            continue;
        };

        let entries = glob::glob(&pattern).map_err(|e| mapper_err(path, e.to_string()))?;
        let mut matched = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| mapper_err(e.path(), e.to_string()))?;
            if entry.is_file() {
                matched.push(entry);
            }
        }
        matched.sort();
        if matched.is_empty() {
            tracing::warn!(location = %location, "mapper location matched no files");
        }
        out.extend(matched);
    }
    Ok(out)
}

/// Read and parse a mapper file from disk.
pub async fn load_mapper(path: &Path) -> Result<Vec<MappedStatement>, SessionError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| mapper_err(path, e.to_string()))?;
    parse_mapper(path, &raw)
}
