//! Broadcast module
//!
//! This module contains statement splitting, the query broadcaster and the
//! outcome types it produces.

pub mod broadcaster;
pub mod outcome;
pub mod splitter;

pub use broadcaster::{BroadcastConfig, CancelFlag, ExecutionMode, QueryBroadcaster};
pub use outcome::{BatchStatus, OutcomeKind, ResultBatch, StatementOutcome};
pub use splitter::{SemicolonSplitter, Statement, StatementKind, StatementSplitter};
