//! In-process transaction coordinator holding the XA resources of every enlisted datasource.

use crate::datasource::ConnectionSource;
use crate::error::XaError;
use crate::tx::transaction::GlobalTransaction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Unique resource name: the logical name plus a random suffix, so restarts never collide.
pub fn xa_resource_name(logical: &str) -> String {
    let suffix = uuid::Uuid::new_v4().to_string();
    format!("{}$${}", logical, &suffix[..15])
}

/// A connection source that can take part in two-phase commit.
#[derive(Debug)]
pub struct XaResource {
    unique_name: String,
    source: Arc<ConnectionSource>,
}

impl XaResource {
    /// Wrap a source, reusing the resource name it was built with when there is one.
    pub fn new(source: Arc<ConnectionSource>) -> Self {
        let unique_name = source
            .xa_resource_name()
            .map(str::to_string)
            .unwrap_or_else(|| xa_resource_name(source.name()));
        XaResource { unique_name, source }
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn logical_name(&self) -> &str {
        self.source.name()
    }

    pub fn source(&self) -> &Arc<ConnectionSource> {
        &self.source
    }
}

#[derive(Default)]
struct Enlisted {
    by_unique: HashMap<String, Arc<XaResource>>,
    by_logical: HashMap<String, String>,
}

#[derive(Default)]
pub struct TransactionCoordinator {
    started: AtomicBool,
    enlisted: RwLock<Enlisted>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            tracing::info!("transaction coordinator started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Register a resource. Each unique name and each logical datasource may be enlisted once.
    pub fn enlist(&self, resource: XaResource) -> Result<Arc<XaResource>, XaError> {
        if !self.is_started() {
            return Err(XaError::CoordinatorNotStarted);
        }
        let mut enlisted = self
            .enlisted
            .write()
            .map_err(|_| XaError::CoordinatorNotStarted)?;
        if enlisted.by_unique.contains_key(resource.unique_name()) {
            return Err(XaError::DuplicateResource(resource.unique_name().to_string()));
        }
        if enlisted.by_logical.contains_key(resource.logical_name()) {
            return Err(XaError::DuplicateResource(resource.logical_name().to_string()));
        }
        let resource = Arc::new(resource);
        enlisted
            .by_logical
            .insert(resource.logical_name().to_string(), resource.unique_name().to_string());
        enlisted
            .by_unique
            .insert(resource.unique_name().to_string(), resource.clone());
        tracing::info!(
            datasource = %resource.logical_name(),
            resource = %resource.unique_name(),
            "xa resource enlisted"
        );
        Ok(resource)
    }

    /// Resource enlisted for a logical datasource.
    pub fn resource(&self, logical: &str) -> Option<Arc<XaResource>> {
        let enlisted = self.enlisted.read().ok()?;
        let unique = enlisted.by_logical.get(logical)?;
        enlisted.by_unique.get(unique).cloned()
    }

    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .enlisted
            .read()
            .map(|e| e.by_unique.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn begin(self: &Arc<Self>) -> Result<GlobalTransaction, XaError> {
        if !self.is_started() {
            return Err(XaError::CoordinatorNotStarted);
        }
        Ok(GlobalTransaction::new(self.clone()))
    }
}
