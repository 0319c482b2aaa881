//! Amazon Athena engine using aws-sdk-athena.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_athena::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use aws_sdk_athena::Client;

use super::{ExecutionId, ExecutionState, ExecutionStatus, QueryEngine, QuerySubmission, RawResultPage};
use crate::config::AthenaConfig;
use crate::error::{KpiError, Result};

const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "Throttling",
];
const ACCESS_DENIED_CODES: &[&str] = &["AccessDeniedException", "AccessDenied"];

pub struct AthenaEngine {
    client: Client,
    page_size: i32,
}

impl AthenaEngine {
    /// Build a client from the default AWS credential chain in the configured region.
    pub async fn from_config(config: &AthenaConfig) -> Result<Self> {
        tracing::info!(
            region = %config.region,
            database = %config.database,
            workgroup = config.workgroup.as_deref().unwrap_or("primary"),
            max_attempts = config.max_attempts,
            "creating Athena client"
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::adaptive().with_max_attempts(config.max_attempts.max(1)))
            .load()
            .await;
        Ok(Self::from_client(Client::new(&sdk_config), config))
    }

    pub fn from_client(client: Client, config: &AthenaConfig) -> Self {
        Self {
            client,
            page_size: i32::try_from(config.results_page_size).unwrap_or(1000),
        }
    }
}

fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> KpiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.code().unwrap_or_default().to_string();
    let message = err.message().unwrap_or_default().to_string();
    if THROTTLING_CODES.contains(&code.as_str()) {
        return KpiError::RemoteThrottling(format!("{operation}: {code}: {message}"));
    }
    if ACCESS_DENIED_CODES.contains(&code.as_str()) {
        return KpiError::RemoteAccessDenied(format!("{operation}: {message}"));
    }
    KpiError::Remote(format!("{operation}: {}", DisplayErrorContext(&err)))
}

fn map_state(state: &QueryExecutionState) -> Result<ExecutionState> {
    match state {
        QueryExecutionState::Queued => Ok(ExecutionState::Queued),
        QueryExecutionState::Running => Ok(ExecutionState::Running),
        QueryExecutionState::Succeeded => Ok(ExecutionState::Succeeded),
        QueryExecutionState::Failed => Ok(ExecutionState::Failed),
        QueryExecutionState::Cancelled => Ok(ExecutionState::Cancelled),
        other => Err(KpiError::Remote(format!(
            "unrecognised execution state {}",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn start_query_execution(&self, submission: &QuerySubmission) -> Result<ExecutionId> {
        let context = QueryExecutionContext::builder()
            .database(submission.database())
            .build();
        let output = ResultConfiguration::builder()
            .output_location(submission.output_location())
            .build();
        let response = self
            .client
            .start_query_execution()
            .query_string(submission.sql())
            .query_execution_context(context)
            .result_configuration(output)
            .set_work_group(submission.workgroup().map(str::to_string))
            .send()
            .await
            .map_err(|e| classify("StartQueryExecution", e))?;

        response
            .query_execution_id()
            .map(ExecutionId::from)
            .ok_or_else(|| KpiError::Remote("StartQueryExecution returned no execution id".into()))
    }

    async fn get_query_execution(&self, id: &ExecutionId) -> Result<ExecutionStatus> {
        let response = self
            .client
            .get_query_execution()
            .query_execution_id(id.as_str())
            .send()
            .await
            .map_err(|e| classify("GetQueryExecution", e))?;

        let status = response
            .query_execution()
            .and_then(|q| q.status())
            .ok_or_else(|| KpiError::Remote(format!("no status reported for {id}")))?;
        let state = status
            .state()
            .ok_or_else(|| KpiError::Remote(format!("no state reported for {id}")))?;

        Ok(ExecutionStatus {
            state: map_state(state)?,
            reason: status.state_change_reason().map(str::to_string),
        })
    }

    async fn get_query_results(
        &self,
        id: &ExecutionId,
        next_token: Option<&str>,
    ) -> Result<RawResultPage> {
        let response = self
            .client
            .get_query_results()
            .query_execution_id(id.as_str())
            .set_next_token(next_token.map(str::to_string))
            .max_results(self.page_size)
            .send()
            .await
            .map_err(|e| classify("GetQueryResults", e))?;

        let mut page = RawResultPage {
            next_token: response.next_token().map(str::to_string),
            ..RawResultPage::default()
        };
        if let Some(result_set) = response.result_set() {
            if let Some(metadata) = result_set.result_set_metadata() {
                page.columns = metadata
                    .column_info()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
            }
            page.rows = result_set
                .rows()
                .iter()
                .map(|row| {
                    row.data()
                        .iter()
                        .map(|d| d.var_char_value().map(str::to_string))
                        .collect()
                })
                .collect();
        }
        tracing::trace!(
            execution_id = %id,
            rows = page.rows.len(),
            has_next = page.next_token.is_some(),
            "fetched Athena result page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_states() {
        assert_eq!(
            map_state(&QueryExecutionState::Queued).unwrap(),
            ExecutionState::Queued
        );
        assert_eq!(
            map_state(&QueryExecutionState::Cancelled).unwrap(),
            ExecutionState::Cancelled
        );
        let err = map_state(&QueryExecutionState::from("PAUSED")).unwrap_err();
        assert!(matches!(err, KpiError::Remote(_)));
    }
}
