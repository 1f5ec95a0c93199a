//! Query Broadcaster
//!
//! Runs every statement of a text block against every active handle and
//! collects one outcome per (statement, handle) pair. A failure on one pair
//! never stops the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::outcome::{BatchStatus, OutcomeKind, ResultBatch, StatementOutcome};
use super::splitter::{SemicolonSplitter, Statement, StatementSplitter};
use crate::session::DatabaseHandle;

/// How pairs within one statement are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One pair at a time, in connection order
    #[default]
    Sequential,
    /// All handles at once for a statement, then re-ordered
    Parallel,
}

/// Broadcaster configuration
#[derive(Debug, Clone, Default)]
pub struct BroadcastConfig {
    pub mode: ExecutionMode,
}

impl BroadcastConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Request to abandon a running batch
///
/// The pair already sent to a driver finishes; no new pair starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fans statements out across handles
pub struct QueryBroadcaster {
    config: BroadcastConfig,
    splitter: Box<dyn StatementSplitter>,
}

impl QueryBroadcaster {
    /// Create a broadcaster with the semicolon splitter
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            splitter: Box::new(SemicolonSplitter),
        }
    }

    /// Replace the statement splitter
    pub fn with_splitter(mut self, splitter: impl StatementSplitter + 'static) -> Self {
        self.splitter = Box::new(splitter);
        self
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Execute a text block on every handle
    pub async fn execute(&self, handles: &[Arc<DatabaseHandle>], text: &str) -> ResultBatch {
        self.execute_with_cancel(handles, text, &CancelFlag::new())
            .await
    }

    /// Execute a text block on every handle, checking `cancel` between pairs
    pub async fn execute_with_cancel(
        &self,
        handles: &[Arc<DatabaseHandle>],
        text: &str,
        cancel: &CancelFlag,
    ) -> ResultBatch {
        if handles.is_empty() {
            return ResultBatch::no_active_connection();
        }

        let statements = self.splitter.split(text);
        debug!(
            statements = statements.len(),
            handles = handles.len(),
            mode = ?self.config.mode,
            "broadcasting"
        );

        let mut outcomes = Vec::with_capacity(statements.len() * handles.len());
        let mut status = BatchStatus::Completed;

        for (i, statement) in statements.iter().enumerate() {
            let index = i + 1;
            let finished = match self.config.mode {
                ExecutionMode::Sequential => {
                    run_sequential(handles, statement, index, cancel, &mut outcomes).await
                }
                ExecutionMode::Parallel => {
                    run_parallel(handles, statement, index, cancel, &mut outcomes).await
                }
            };

            if !finished {
                info!(
                    completed = outcomes.len(),
                    total = statements.len() * handles.len(),
                    "batch cancelled"
                );
                status = BatchStatus::Cancelled;
                break;
            }
        }

        ResultBatch::new(statements, outcomes, status)
    }
}

fn outcome(handle: &DatabaseHandle, index: usize, kind: OutcomeKind) -> StatementOutcome {
    StatementOutcome {
        connection: handle.name().to_string(),
        handle_id: handle.id(),
        statement_index: index,
        kind,
    }
}

/// Returns false if cancelled before every handle ran
async fn run_sequential(
    handles: &[Arc<DatabaseHandle>],
    statement: &Statement,
    index: usize,
    cancel: &CancelFlag,
    outcomes: &mut Vec<StatementOutcome>,
) -> bool {
    for handle in handles {
        if cancel.is_cancelled() {
            return false;
        }
        let kind = handle.run(statement).await;
        outcomes.push(outcome(handle, index, kind));
    }
    true
}

/// Returns false if cancelled before the statement started
async fn run_parallel(
    handles: &[Arc<DatabaseHandle>],
    statement: &Statement,
    index: usize,
    cancel: &CancelFlag,
    outcomes: &mut Vec<StatementOutcome>,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }

    let mut tasks = JoinSet::new();
    for (position, handle) in handles.iter().enumerate() {
        let handle = Arc::clone(handle);
        let statement = statement.clone();
        tasks.spawn(async move { (position, handle.run(&statement).await) });
    }

    let mut slots: Vec<Option<OutcomeKind>> = vec![None; handles.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, kind)) => slots[position] = Some(kind),
            Err(e) => warn!(error = %e, statement = index, "execution task failed"),
        }
    }

    // Back into connection order
    for (handle, slot) in handles.iter().zip(slots) {
        let kind = slot
            .unwrap_or_else(|| OutcomeKind::Failed("execution task did not complete".to_string()));
        outcomes.push(outcome(handle, index, kind));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BroadcastConfig::new().mode(ExecutionMode::Parallel);
        assert_eq!(config.mode, ExecutionMode::Parallel);
        assert_eq!(BroadcastConfig::default().mode, ExecutionMode::Sequential);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_handles() {
        let broadcaster = QueryBroadcaster::new(BroadcastConfig::new());
        let batch = broadcaster.execute(&[], "SELECT 1").await;
        assert!(batch.is_empty());
        assert_eq!(batch.status(), BatchStatus::NoActiveConnection);
    }

    struct LineSplitter;

    impl StatementSplitter for LineSplitter {
        fn split(&self, text: &str) -> Vec<Statement> {
            text.lines()
                .filter(|l| !l.trim().is_empty())
                .map(Statement::new)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_custom_splitter() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::catalog::ConnectionConfig::sqlite("a", dir.path().join("a.db"));
        let handle = Arc::new(DatabaseHandle::open(1, &config).await.unwrap());

        let broadcaster =
            QueryBroadcaster::new(BroadcastConfig::new()).with_splitter(LineSplitter);
        let batch = broadcaster
            .execute(&[handle], "SELECT 'a;b' AS v\nSELECT 2")
            .await;

        assert_eq!(batch.statements().len(), 2);
        let first = &batch.outcomes()[0];
        assert_eq!(
            first.kind.rows()[0].get("v"),
            Some(&crate::session::Value::Text("a;b".to_string()))
        );
    }
}
