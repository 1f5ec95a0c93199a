//! Statement outcomes and result batches

use serde::Serialize;

use super::splitter::Statement;
use crate::error::{Error, Result};
use crate::session::Row;

/// What happened when one statement ran on one handle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A read returned at least one row
    RowsReturned(Vec<Row>),
    /// A read returned no rows
    NoRowsReturned,
    /// A write executed and committed
    Committed,
    /// Execution or commit raised a driver error
    Failed(String),
}

impl OutcomeKind {
    pub fn is_failed(&self) -> bool {
        matches!(self, OutcomeKind::Failed(_))
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            OutcomeKind::RowsReturned(rows) => rows,
            _ => &[],
        }
    }
}

/// The outcome of one (statement, handle) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementOutcome {
    /// Name of the connection the handle was opened from
    pub connection: String,
    /// Id of the handle, unique even when names repeat
    pub handle_id: u64,
    /// 1-based position of the statement in the batch
    pub statement_index: usize,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every (statement, handle) pair was attempted
    Completed,
    /// Nothing ran because no handle was active
    NoActiveConnection,
    /// Stopped early on request; outcomes cover the pairs that ran
    Cancelled,
}

/// Every outcome produced for one submitted text block
///
/// Outcomes are ordered statement-major, connection-minor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBatch {
    statements: Vec<Statement>,
    outcomes: Vec<StatementOutcome>,
    status: BatchStatus,
}

impl ResultBatch {
    pub(crate) fn new(
        statements: Vec<Statement>,
        outcomes: Vec<StatementOutcome>,
        status: BatchStatus,
    ) -> Self {
        Self {
            statements,
            outcomes,
            status,
        }
    }

    /// An empty batch for an execute with no active handles
    pub fn no_active_connection() -> Self {
        Self::new(Vec::new(), Vec::new(), BatchStatus::NoActiveConnection)
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BatchStatus::Cancelled
    }

    /// `Ok` for a completed batch, otherwise the error for its status
    pub fn check_status(&self) -> Result<()> {
        match self.status {
            BatchStatus::Completed => Ok(()),
            BatchStatus::NoActiveConnection => Err(Error::NoActiveConnection),
            BatchStatus::Cancelled => Err(Error::Cancelled),
        }
    }

    /// The statements the text block split into
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Statement text for a 1-based index
    pub fn statement(&self, index: usize) -> Option<&Statement> {
        index.checked_sub(1).and_then(|i| self.statements.get(i))
    }

    pub fn outcomes(&self) -> &[StatementOutcome] {
        &self.outcomes
    }

    /// Outcomes of one statement (1-based), in connection order
    pub fn for_statement(&self, index: usize) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.statement_index == index)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes.iter().filter(|o| o.kind.is_failed())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl IntoIterator for ResultBatch {
    type Item = StatementOutcome;
    type IntoIter = std::vec::IntoIter<StatementOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, connection: &str, kind: OutcomeKind) -> StatementOutcome {
        StatementOutcome {
            connection: connection.to_string(),
            handle_id: 1,
            statement_index: index,
            kind,
        }
    }

    #[test]
    fn test_batch_accessors() {
        let batch = ResultBatch::new(
            vec![Statement::new("CREATE TABLE t(x INT)"), Statement::new("SELECT 1")],
            vec![
                outcome(1, "a", OutcomeKind::Committed),
                outcome(1, "b", OutcomeKind::Failed("locked".to_string())),
                outcome(2, "a", OutcomeKind::NoRowsReturned),
                outcome(2, "b", OutcomeKind::NoRowsReturned),
            ],
            BatchStatus::Completed,
        );

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.statement(2).unwrap().as_str(), "SELECT 1");
        assert!(batch.statement(0).is_none());
        assert_eq!(batch.for_statement(1).count(), 2);
        assert_eq!(batch.failures().count(), 1);
        assert_eq!(batch.status(), BatchStatus::Completed);
    }

    #[test]
    fn test_no_active_connection_batch() {
        let batch = ResultBatch::no_active_connection();
        assert!(batch.is_empty());
        assert_eq!(batch.status(), BatchStatus::NoActiveConnection);
        assert!(matches!(batch.check_status(), Err(Error::NoActiveConnection)));
    }

    #[test]
    fn test_check_status() {
        let done = ResultBatch::new(Vec::new(), Vec::new(), BatchStatus::Completed);
        assert!(done.check_status().is_ok());

        let cancelled = ResultBatch::new(
            vec![Statement::new("SELECT 1")],
            vec![outcome(1, "a", OutcomeKind::NoRowsReturned)],
            BatchStatus::Cancelled,
        );
        let err = cancelled.check_status().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(err.to_string(), "Execution error: batch cancelled");
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(outcome(1, "a", OutcomeKind::Failed("boom".into()))).unwrap();
        assert_eq!(json["connection"], "a");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["detail"], "boom");
    }
}
