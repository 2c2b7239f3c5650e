//! Resolved CRUD resources: config validated and flattened for runtime use.

use crate::config::types::{PkType, ResourceConfig};
use crate::error::ConfigError;
use std::collections::HashMap;

/// CRUD operation exposed on a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }
}

impl std::str::FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Validation(format!("unknown operation: {}", s)))
    }
}

/// Capability required to call a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessRule {
    Anonymous,
    Login,
    Role(String),
}

impl std::str::FromStr for AccessRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("anonymous") {
            return Ok(AccessRule::Anonymous);
        }
        if s.eq_ignore_ascii_case("login") {
            return Ok(AccessRule::Login);
        }
        match s.split_once(':') {
            Some((kind, role)) if kind.eq_ignore_ascii_case("role") && !role.trim().is_empty() => {
                Ok(AccessRule::Role(role.trim().to_string()))
            }
            _ => Err(ConfigError::Validation(format!(
                "invalid authorize rule: {} (expected anonymous, login or role:<name>)",
                s
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceDef {
    pub path_segment: String,
    pub schema: String,
    pub table: String,
    pub primary_key: String,
    pub pk_type: PkType,
    pub operations: Vec<Operation>,
    pub datasource: Option<String>,
    pub access: AccessRule,
}

impl ResourceDef {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }
}

impl TryFrom<&ResourceConfig> for ResourceDef {
    type Error = ConfigError;

    fn try_from(cfg: &ResourceConfig) -> Result<Self, Self::Error> {
        let operations = if cfg.operations.is_empty() {
            Operation::ALL.to_vec()
        } else {
            cfg.operations
                .iter()
                .map(|o| o.parse())
                .collect::<Result<Vec<_>, _>>()?
        };
        let access = match &cfg.authorize {
            Some(rule) => rule.parse()?,
            None => AccessRule::Anonymous,
        };
        Ok(ResourceDef {
            path_segment: cfg.path_segment.clone(),
            schema: cfg.schema.clone(),
            table: cfg.table.clone(),
            primary_key: cfg.primary_key.clone(),
            pk_type: cfg.pk_type.clone(),
            operations,
            datasource: cfg.datasource.clone().filter(|d| !d.trim().is_empty()),
            access,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceModel {
    by_path: HashMap<String, ResourceDef>,
}

impl ResourceModel {
    pub fn resolve(configs: &[ResourceConfig]) -> Result<Self, ConfigError> {
        let mut by_path = HashMap::new();
        for cfg in configs {
            let def = ResourceDef::try_from(cfg)?;
            if by_path.insert(def.path_segment.clone(), def).is_some() {
                return Err(ConfigError::DuplicatePathSegment(cfg.path_segment.clone()));
            }
        }
        Ok(ResourceModel { by_path })
    }

    pub fn by_path(&self, path: &str) -> Option<&ResourceDef> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
