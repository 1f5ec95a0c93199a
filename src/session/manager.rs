//! Session Manager
//!
//! Owns the catalog in use and the ordered set of active handles. The same
//! name may be connected more than once; every connect appends a new,
//! independent handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::handle::DatabaseHandle;
use crate::catalog::ConnectionCatalog;
use crate::error::{Error, Result};

/// Owner of the active session set
#[derive(Debug)]
pub struct SessionManager {
    catalog: RwLock<Arc<ConnectionCatalog>>,
    active: Mutex<Vec<Arc<DatabaseHandle>>>,
    next_handle_id: AtomicU64,
}

impl SessionManager {
    /// Create a manager over a catalog, with no active handles
    pub fn new(catalog: ConnectionCatalog) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            active: Mutex::new(Vec::new()),
            next_handle_id: AtomicU64::new(1),
        }
    }

    /// The catalog currently in use
    pub async fn catalog(&self) -> Arc<ConnectionCatalog> {
        self.catalog.read().await.clone()
    }

    /// Atomically replace the catalog
    ///
    /// Active handles are unaffected; they hold no reference to the catalog.
    pub async fn reload_catalog(&self, catalog: ConnectionCatalog) {
        info!(count = catalog.len(), "connection catalog replaced");
        *self.catalog.write().await = Arc::new(catalog);
    }

    /// Open a new handle for `name` and append it to the active set
    ///
    /// On failure the active set is left untouched.
    pub async fn connect(&self, name: &str) -> Result<()> {
        let config = {
            let catalog = self.catalog.read().await;
            catalog
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownConnection(name.to_string()))?
        };

        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        let handle = DatabaseHandle::open(id, &config).await?;
        info!(handle = %handle, kind = %config.kind, "connected");

        self.active.lock().await.push(Arc::new(handle));
        Ok(())
    }

    /// Close every active handle and empty the active set
    ///
    /// Close failures are logged, never raised. Returns the names that were
    /// active, in connection order; empty when there was nothing to close.
    pub async fn disconnect_all(&self) -> Vec<String> {
        let handles = std::mem::take(&mut *self.active.lock().await);

        let mut names = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Err(e) = handle.close().await {
                warn!(handle = %handle, error = %e, "error closing connection");
            }
            names.push(handle.name().to_string());
        }

        if !names.is_empty() {
            info!(names = ?names, "disconnected");
        }
        names
    }

    /// Active handle names in connection order, duplicates included
    pub async fn list_active(&self) -> Vec<String> {
        self.active
            .lock()
            .await
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Snapshot of the active handles, in connection order
    pub async fn handles(&self) -> Vec<Arc<DatabaseHandle>> {
        self.active.lock().await.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Table names seen through the first active handle
    pub async fn table_names(&self) -> Vec<String> {
        let first = self.active.lock().await.first().cloned();
        match first {
            Some(handle) => handle.table_names().await.unwrap_or_else(|e| {
                warn!(handle = %handle, error = %e, "error fetching table names");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(ConnectionCatalog::new())
    }
}
