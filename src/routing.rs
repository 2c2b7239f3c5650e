//! Per-request routing: the caller supplies the key explicitly, nothing is ambient.

use crate::config::ResourceDef;

/// Trimmed routing key, or `None` when blank. Header and config keys both pass through here.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    (!key.is_empty()).then(|| key.to_string())
}

/// Routing key for one unit of work. Created per request and dropped with it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingContext {
    key: Option<String>,
}

impl RoutingContext {
    /// No key: the primary datasource.
    pub fn primary() -> Self {
        RoutingContext::default()
    }

    pub fn with_key(key: impl AsRef<str>) -> Self {
        RoutingContext {
            key: normalize_key(key.as_ref()),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Decides which datasource a request against a resource uses.
pub trait RouteSelector: Send + Sync {
    fn select(&self, requested: Option<&str>, resource: &ResourceDef) -> RoutingContext;
}

/// Request header first, then the resource's configured datasource, then the primary.
#[derive(Debug, Default)]
pub struct HeaderRouteSelector;

impl RouteSelector for HeaderRouteSelector {
    fn select(&self, requested: Option<&str>, resource: &ResourceDef) -> RoutingContext {
        match requested.and_then(normalize_key).or_else(|| resource.datasource.clone()) {
            Some(key) => RoutingContext::with_key(key),
            None => RoutingContext::primary(),
        }
    }
}

/// Ignores request headers; only the resource's configured datasource counts.
#[derive(Debug, Default)]
pub struct ResourceRouteSelector;

impl RouteSelector for ResourceRouteSelector {
    fn select(&self, _requested: Option<&str>, resource: &ResourceDef) -> RoutingContext {
        resource
            .datasource
            .as_deref()
            .map(RoutingContext::with_key)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessRule, Operation, PkType};

    fn resource(datasource: Option<&str>) -> ResourceDef {
        ResourceDef {
            path_segment: "orders".into(),
            schema: "public".into(),
            table: "orders".into(),
            primary_key: "id".into(),
            pk_type: PkType::BigInt,
            operations: Operation::ALL.to_vec(),
            datasource: datasource.map(str::to_string),
            access: AccessRule::Anonymous,
        }
    }

    #[test]
    fn blank_keys_mean_primary() {
        assert_eq!(RoutingContext::with_key("  ").key(), None);
        assert_eq!(RoutingContext::primary().key(), None);
    }

    #[test]
    fn keys_are_trimmed() {
        assert_eq!(normalize_key(" reports\t").as_deref(), Some("reports"));
        assert_eq!(normalize_key("\n"), None);
        assert_eq!(RoutingContext::with_key(" reports ").key(), Some("reports"));
        assert_eq!(
            HeaderRouteSelector.select(Some("  "), &resource(Some("archive"))).key(),
            Some("archive")
        );
    }

    #[test]
    fn header_overrides_resource_default() {
        let sel = HeaderRouteSelector;
        assert_eq!(sel.select(Some("reports"), &resource(Some("archive"))).key(), Some("reports"));
        assert_eq!(sel.select(None, &resource(Some("archive"))).key(), Some("archive"));
        assert_eq!(sel.select(Some(""), &resource(None)).key(), None);
    }

    #[test]
    fn resource_selector_ignores_header() {
        let sel = ResourceRouteSelector;
        assert_eq!(sel.select(Some("reports"), &resource(None)).key(), None);
        assert_eq!(sel.select(Some("reports"), &resource(Some("archive"))).key(), Some("archive"));
    }
}
