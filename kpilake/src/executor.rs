use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{AthenaConfig, PollingConfig};
use crate::engine::{poller, results, QueryEngine, QuerySubmission};
use crate::error::Result;

/// Column layout of one result set, derived once from the first page's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSchema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl ResultSchema {
    pub fn new(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One result row: raw string-or-null cells in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    schema: Arc<ResultSchema>,
    values: Vec<Option<String>>,
}

impl RowRecord {
    pub(crate) fn new(schema: Arc<ResultSchema>, values: Vec<Option<String>>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self { schema, values }
    }

    /// Cell text by column name; `None` for null cells and unknown columns.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .and_then(|i| self.values.get(i))
            .and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub schema: Arc<ResultSchema>,
    pub rows: Vec<RowRecord>,
}

/// Runs one SQL statement end to end: submit, poll, retrieve.
///
/// Cheap to clone; the engine handle is shared by every request.
#[derive(Clone)]
pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    athena: AthenaConfig,
    polling: PollingConfig,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>, athena: AthenaConfig, polling: PollingConfig) -> Self {
        Self {
            engine,
            athena,
            polling,
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let submission = QuerySubmission::new(
            sql,
            self.athena.database.as_str(),
            self.athena.output_location.as_str(),
            self.athena.workgroup.clone(),
        )?;

        let start = Instant::now();
        tracing::trace!(sql = %sql, "submitting SQL");
        let id = self.engine.start_query_execution(&submission).await?;
        tracing::debug!(
            execution_id = %id,
            database = %submission.database(),
            sql_len = sql.len(),
            "query submitted"
        );

        poller::wait_for_completion(self.engine.as_ref(), &id, &self.polling).await?;
        let result = results::fetch_all(self.engine.as_ref(), &id).await?;

        tracing::debug!(
            execution_id = %id,
            rows = result.rows.len(),
            ms = start.elapsed().as_millis(),
            "query executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutionScript, ExecutionState, PollStep, RawResultPage, ScriptedEngine};
    use crate::error::KpiError;

    fn athena() -> AthenaConfig {
        AthenaConfig {
            database: "lake".to_string(),
            output_location: "s3://out/".to_string(),
            ..AthenaConfig::default()
        }
    }

    #[test]
    fn row_lookup_by_name() {
        let schema = Arc::new(ResultSchema::new(vec!["a".into(), "b".into()]));
        let row = RowRecord::new(schema, vec![Some("1".into()), None]);
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), None);
        assert_eq!(row.get("c"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn executes_end_to_end() {
        let engine = Arc::new(ScriptedEngine::with_script(ExecutionScript {
            polls: vec![
                PollStep::state(ExecutionState::Queued),
                PollStep::state(ExecutionState::Running),
                PollStep::state(ExecutionState::Succeeded),
            ],
            pages: vec![RawResultPage {
                columns: vec!["_col0".to_string()],
                rows: vec![vec![Some("_col0".to_string())], vec![Some("1".to_string())]],
                next_token: None,
            }],
        }));
        let executor = QueryExecutor::new(engine.clone(), athena(), PollingConfig::default());
        let result = executor.execute("SELECT 1").await.unwrap();
        assert_eq!(result.schema.columns(), ["_col0".to_string()].as_slice());
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("_col0"), Some("1"));

        let submissions = engine.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].1.sql(), "SELECT 1");
        assert_eq!(submissions[0].1.output_location(), "s3://out/");
    }

    #[tokio::test]
    async fn bad_destination_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::with_script(ExecutionScript::succeeded(
            Vec::new(),
        )));
        let mut cfg = athena();
        cfg.output_location = "s3://out".to_string();
        let executor = QueryExecutor::new(engine.clone(), cfg, PollingConfig::default());
        let err = executor.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, KpiError::Config(_)));
        assert!(engine.submissions().is_empty());
    }
}
