//! Remote query engine boundary.
//!
//! The engine runs SQL asynchronously: a submission returns an execution id, the
//! execution is polled until it reaches a terminal state, and results are read back
//! page by page with continuation tokens.

use std::fmt;

use async_trait::async_trait;

use crate::config::validate_destination;
use crate::error::Result;

pub mod poller;
pub mod results;
mod scripted;

pub use scripted::{ExecutionScript, PollStep, ScriptedEngine};

#[cfg(feature = "athena")]
mod athena;
#[cfg(feature = "athena")]
pub use athena::AthenaEngine;

/// Unified interface for the remote engine.
///
/// Implementations are shared across requests behind an `Arc` and must not keep
/// per-request state outside of what the execution id identifies.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn start_query_execution(&self, submission: &QuerySubmission) -> Result<ExecutionId>;
    async fn get_query_execution(&self, id: &ExecutionId) -> Result<ExecutionStatus>;
    /// Fetch one page of results. `next_token` is `None` for the first page.
    async fn get_query_results(
        &self,
        id: &ExecutionId,
        next_token: Option<&str>,
    ) -> Result<RawResultPage>;
}

/// Engine-assigned execution handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// Executions only move forward: QUEUED -> RUNNING -> terminal. RUNNING may be
    /// skipped and repeated observations of the same state are allowed.
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match (self, next) {
            (Queued, Queued | Running | Succeeded | Failed | Cancelled) => true,
            (Running, Running | Succeeded | Failed | Cancelled) => true,
            (Running, Queued) => false,
            (Succeeded, Succeeded) | (Failed, Failed) | (Cancelled, Cancelled) => true,
            (Succeeded | Failed | Cancelled, _) => false,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Queued => "QUEUED",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
            ExecutionState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// One observation of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    /// Engine-supplied explanation; only meaningful for FAILED/CANCELLED.
    pub reason: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(state: ExecutionState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
        }
    }
}

/// SQL plus the destination it runs against. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySubmission {
    sql: String,
    database: String,
    output_location: String,
    workgroup: Option<String>,
}

impl QuerySubmission {
    /// Fails with a configuration error, before anything is sent, when the database is
    /// empty or the output location is not an `s3://bucket/.../` URI.
    pub fn new(
        sql: impl Into<String>,
        database: impl Into<String>,
        output_location: impl Into<String>,
        workgroup: Option<String>,
    ) -> Result<Self> {
        let database = database.into();
        let output_location = output_location.into();
        validate_destination(&database, &output_location)?;
        Ok(Self {
            sql: sql.into(),
            database,
            output_location,
            workgroup,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn output_location(&self) -> &str {
        &self.output_location
    }

    pub fn workgroup(&self) -> Option<&str> {
        self.workgroup.as_deref()
    }
}

/// A page of results as the engine returns it. The first page may repeat the column
/// names as its first row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub next_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KpiError;

    #[test]
    fn forward_transitions_only() {
        use ExecutionState::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Succeeded));
        assert!(Failed.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(!ExecutionState::Queued.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
        assert!(ExecutionState::Succeeded.is_terminal());
        assert!(ExecutionState::Cancelled.is_terminal());
    }

    #[test]
    fn submission_requires_destination() {
        let ok = QuerySubmission::new("SELECT 1", "lake", "s3://results/", None).unwrap();
        assert_eq!(ok.database(), "lake");

        let err = QuerySubmission::new("SELECT 1", "", "s3://results/", None).unwrap_err();
        assert!(matches!(err, KpiError::Config(_)));

        let err = QuerySubmission::new("SELECT 1", "lake", "s3://results", None).unwrap_err();
        assert!(matches!(err, KpiError::Config(_)));
    }
}
