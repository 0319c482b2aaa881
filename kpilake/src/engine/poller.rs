//! Status polling with adaptive back-off under a hard time budget.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::{ExecutionId, ExecutionState, QueryEngine};
use crate::config::PollingConfig;
use crate::error::{KpiError, Result};

/// Poll `id` until it succeeds, fails, or the budget runs out.
///
/// Throttled status checks are retried after a doubling wait that counts against the
/// same budget. Timing out leaves the remote execution running.
pub async fn wait_for_completion(
    engine: &dyn QueryEngine,
    id: &ExecutionId,
    polling: &PollingConfig,
) -> Result<()> {
    let start = Instant::now();
    let budget = polling.budget();
    let mut last_state = ExecutionState::Queued;
    let mut throttle_wait: Option<Duration> = None;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let wait = match engine.get_query_execution(id).await {
            Ok(status) => {
                throttle_wait = None;
                if !last_state.can_transition_to(status.state) {
                    return Err(KpiError::Remote(format!(
                        "execution {id} moved from {last_state} to {}",
                        status.state
                    )));
                }
                if status.state != last_state {
                    tracing::debug!(
                        execution_id = %id,
                        state = %status.state,
                        ms = start.elapsed().as_millis(),
                        "execution state changed"
                    );
                }
                last_state = status.state;

                match status.state {
                    ExecutionState::Succeeded => {
                        tracing::debug!(
                            execution_id = %id,
                            polls,
                            ms = start.elapsed().as_millis(),
                            "execution succeeded"
                        );
                        return Ok(());
                    }
                    ExecutionState::Failed | ExecutionState::Cancelled => {
                        let reason = status
                            .reason
                            .unwrap_or_else(|| "no reason given".to_string());
                        return Err(KpiError::RemoteQueryFailure {
                            execution_id: id.clone(),
                            state: status.state,
                            reason,
                        });
                    }
                    ExecutionState::Queued | ExecutionState::Running => {
                        polling.interval_after(start.elapsed())
                    }
                }
            }
            Err(KpiError::RemoteThrottling(message)) => {
                let wait = throttle_wait
                    .map(|w| w * 2)
                    .unwrap_or_else(|| polling.interval_after(start.elapsed()) * 2);
                if start.elapsed() >= budget {
                    return Err(KpiError::RemoteThrottling(message));
                }
                tracing::warn!(
                    execution_id = %id,
                    wait_ms = wait.as_millis(),
                    message = %message,
                    "status check throttled"
                );
                throttle_wait = Some(wait);
                wait
            }
            Err(e) => return Err(e),
        };

        let elapsed = start.elapsed();
        if elapsed >= budget {
            tracing::error!(
                execution_id = %id,
                state = %last_state,
                polls,
                waited_ms = elapsed.as_millis(),
                "poll budget exhausted; remote execution left running"
            );
            return Err(KpiError::RemoteTimeout {
                execution_id: id.clone(),
                waited: elapsed,
            });
        }
        sleep(wait.min(budget - elapsed)).await;
    }
}
