//! Capability checks evaluated before any CRUD service call.

use crate::config::{AccessRule, Operation, ResourceDef};
use crate::error::AppError;
use crate::extractors::Principal;

pub trait Authorizer: Send + Sync {
    fn authorize(&self, principal: &Principal, resource: &ResourceDef, op: Operation) -> Result<(), AppError>;
}

/// Enforces each resource's `authorize` rule.
#[derive(Debug, Default)]
pub struct ConfigAuthorizer;

impl Authorizer for ConfigAuthorizer {
    fn authorize(&self, principal: &Principal, resource: &ResourceDef, op: Operation) -> Result<(), AppError> {
        match &resource.access {
            AccessRule::Anonymous => Ok(()),
            AccessRule::Login if principal.is_authenticated() => Ok(()),
            AccessRule::Role(role) if principal.is_authenticated() => {
                if principal.has_role(role) {
                    Ok(())
                } else {
                    tracing::debug!(resource = %resource.path_segment, op = op.as_str(), role = %role, "missing role");
                    Err(AppError::Forbidden(format!(
                        "{} on {} requires role '{}'",
                        op.as_str(),
                        resource.path_segment,
                        role
                    )))
                }
            }
            _ => Err(AppError::Unauthorized(format!(
                "{} on {} requires login",
                op.as_str(),
                resource.path_segment
            ))),
        }
    }
}

/// Lets everything through.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _: &Principal, _: &ResourceDef, _: Operation) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PkType;

    fn resource(access: AccessRule) -> ResourceDef {
        ResourceDef {
            path_segment: "users".into(),
            schema: "public".into(),
            table: "users".into(),
            primary_key: "id".into(),
            pk_type: PkType::BigInt,
            operations: Operation::ALL.to_vec(),
            datasource: None,
            access,
        }
    }

    fn user(roles: &[&str]) -> Principal {
        Principal {
            subject: Some("token".into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn login_rule() {
        let res = resource(AccessRule::Login);
        assert!(matches!(
            ConfigAuthorizer.authorize(&Principal::anonymous(), &res, Operation::List),
            Err(AppError::Unauthorized(_))
        ));
        assert!(ConfigAuthorizer.authorize(&user(&[]), &res, Operation::List).is_ok());
    }

    #[test]
    fn role_rule() {
        let res = resource(AccessRule::Role("admin".into()));
        assert!(matches!(
            ConfigAuthorizer.authorize(&user(&["viewer"]), &res, Operation::Delete),
            Err(AppError::Forbidden(_))
        ));
        assert!(ConfigAuthorizer.authorize(&user(&["admin"]), &res, Operation::Delete).is_ok());
        assert!(matches!(
            ConfigAuthorizer.authorize(&Principal::anonymous(), &res, Operation::Delete),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn anonymous_rule() {
        let res = resource(AccessRule::Anonymous);
        assert!(ConfigAuthorizer.authorize(&Principal::anonymous(), &res, Operation::Create).is_ok());
    }
}
