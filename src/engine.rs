//! Front-end facade
//!
//! `MultiDb` bundles one session manager with one broadcaster. Front ends
//! hold it by value; there is no process-wide session state.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::broadcast::{BatchStatus, BroadcastConfig, CancelFlag, QueryBroadcaster, ResultBatch};
use crate::catalog::ConnectionCatalog;
use crate::error::Result;
use crate::session::{DatabaseHandle, SessionManager};
use crate::sink::{FileSink, ResultSink};

/// One independent multi-database session
pub struct MultiDb {
    sessions: SessionManager,
    broadcaster: QueryBroadcaster,
}

impl MultiDb {
    pub fn new(catalog: ConnectionCatalog, config: BroadcastConfig) -> Self {
        Self {
            sessions: SessionManager::new(catalog),
            broadcaster: QueryBroadcaster::new(config),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Connect a named connection, appending a new active handle
    pub async fn connect(&self, name: &str) -> Result<()> {
        self.sessions.connect(name).await
    }

    /// Close and forget every active handle; returns the names closed
    pub async fn disconnect_all(&self) -> Vec<String> {
        self.sessions.disconnect_all().await
    }

    pub async fn list_active(&self) -> Vec<String> {
        self.sessions.list_active().await
    }

    /// Replace the catalog with the contents of a connection file
    ///
    /// A file that cannot be loaded yields an empty catalog.
    pub async fn reload(&self, path: impl AsRef<Path>) -> Arc<ConnectionCatalog> {
        let catalog = ConnectionCatalog::load_or_empty(path);
        self.sessions.reload_catalog(catalog).await;
        self.sessions.catalog().await
    }

    /// Broadcast a text block to every active handle
    pub async fn broadcast(&self, text: &str, cancel: &CancelFlag) -> ResultBatch {
        let handles: Vec<Arc<DatabaseHandle>> = self.sessions.handles().await;
        self.broadcaster
            .execute_with_cancel(&handles, text, cancel)
            .await
    }

    /// Broadcast a text block, optionally appending the rendering to a file
    ///
    /// The returned batch is the same whether or not it was logged; a
    /// failed append is logged and otherwise ignored. Nothing is written
    /// when no handle is active.
    pub async fn execute(&self, text: &str, log_to_file: bool, output_path: &Path) -> ResultBatch {
        let batch = self.broadcast(text, &CancelFlag::new()).await;
        if log_to_file && batch.status() != BatchStatus::NoActiveConnection {
            if let Err(e) = append_to_file(&batch, output_path) {
                error!(path = %output_path.display(), error = %e, "error writing output to file");
            }
        }
        batch
    }
}

/// Append a batch's text rendering to `path`
pub fn append_to_file(batch: &ResultBatch, path: &Path) -> Result<()> {
    FileSink::new(path).deliver(batch)?;
    info!(path = %path.display(), outcomes = batch.len(), "batch appended to file");
    Ok(())
}
