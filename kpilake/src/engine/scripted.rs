//! In-process engine that replays scripted executions.
//!
//! Each submission asks a responder for an [`ExecutionScript`]: the sequence of
//! answers successive status checks receive, and the result pages served once the
//! execution succeeds. Executions are kept for the engine's lifetime so tests can inspect
//! them afterwards; meant for tests, not long-running service use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ExecutionId, ExecutionState, ExecutionStatus, QueryEngine, QuerySubmission, RawResultPage};
use crate::error::{KpiError, Result};

/// Answer to one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Status(ExecutionStatus),
    Throttled,
}

impl PollStep {
    pub fn state(state: ExecutionState) -> Self {
        PollStep::Status(ExecutionStatus::new(state))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionScript {
    /// Consumed one per status check; the last entry repeats forever.
    pub polls: Vec<PollStep>,
    /// Served in order, linked through synthetic continuation tokens.
    pub pages: Vec<RawResultPage>,
}

impl ExecutionScript {
    /// Execution that succeeds on the first check and returns `pages`.
    pub fn succeeded(pages: Vec<RawResultPage>) -> Self {
        Self {
            polls: vec![PollStep::state(ExecutionState::Succeeded)],
            pages,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            polls: vec![PollStep::Status(ExecutionStatus::with_reason(
                ExecutionState::Failed,
                reason,
            ))],
            pages: Vec::new(),
        }
    }
}

type Responder = dyn Fn(&QuerySubmission) -> ExecutionScript + Send + Sync;

struct Running {
    script: ExecutionScript,
    polls_seen: usize,
}

pub struct ScriptedEngine {
    responder: Arc<Responder>,
    executions: Mutex<HashMap<ExecutionId, Running>>,
    submissions: Mutex<Vec<(ExecutionId, QuerySubmission)>>,
}

impl ScriptedEngine {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&QuerySubmission) -> ExecutionScript + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            executions: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every submission replays the same script.
    pub fn with_script(script: ExecutionScript) -> Self {
        Self::new(move |_| script.clone())
    }

    /// Submissions received so far, in order.
    pub fn submissions(&self) -> Vec<(ExecutionId, QuerySubmission)> {
        self.submissions.lock().clone()
    }

    /// Status checks made against one execution.
    pub fn poll_count(&self, id: &ExecutionId) -> usize {
        self.executions
            .lock()
            .get(id)
            .map(|r| r.polls_seen)
            .unwrap_or_default()
    }

    fn unknown(id: &ExecutionId) -> KpiError {
        KpiError::Remote(format!("unknown execution {id}"))
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn start_query_execution(&self, submission: &QuerySubmission) -> Result<ExecutionId> {
        let script = (self.responder)(submission);
        let id = ExecutionId::from(uuid::Uuid::new_v4().to_string());
        self.executions.lock().insert(
            id.clone(),
            Running {
                script,
                polls_seen: 0,
            },
        );
        self.submissions.lock().push((id.clone(), submission.clone()));
        tracing::debug!(execution_id = %id, "scripted execution started");
        Ok(id)
    }

    async fn get_query_execution(&self, id: &ExecutionId) -> Result<ExecutionStatus> {
        let mut executions = self.executions.lock();
        let running = executions.get_mut(id).ok_or_else(|| Self::unknown(id))?;
        let idx = running
            .polls_seen
            .min(running.script.polls.len().saturating_sub(1));
        running.polls_seen += 1;
        match running.script.polls.get(idx) {
            Some(PollStep::Status(status)) => Ok(status.clone()),
            Some(PollStep::Throttled) => {
                Err(KpiError::RemoteThrottling("Rate exceeded".to_string()))
            }
            None => Ok(ExecutionStatus::new(ExecutionState::Succeeded)),
        }
    }

    async fn get_query_results(
        &self,
        id: &ExecutionId,
        next_token: Option<&str>,
    ) -> Result<RawResultPage> {
        let executions = self.executions.lock();
        let running = executions.get(id).ok_or_else(|| Self::unknown(id))?;
        let idx = match next_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| KpiError::Remote(format!("invalid continuation token {token}")))?,
        };
        let pages = &running.script.pages;
        if pages.is_empty() && idx == 0 {
            return Ok(RawResultPage::default());
        }
        let mut page = pages
            .get(idx)
            .cloned()
            .ok_or_else(|| KpiError::Remote(format!("no result page {idx} for {id}")))?;
        page.next_token = (idx + 1 < pages.len()).then(|| format!("page-{}", idx + 1));
        Ok(page)
    }
}
