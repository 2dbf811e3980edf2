//! Retry Orchestrator: retry counting, repeated-error detection, and the
//! resource-exhaustion backoff ladder.

use chrono::{DateTime, Utc};

use foreman_db::model::{BlockedTask, ResourceExhaustedState, Task, TaskProgress, ValidationReport, RESOURCE_EXHAUSTED_BACKOFF_SECONDS};

/// How many consecutive identical errors block a task immediately,
/// independent of remaining retry budget.
pub const REPEATED_ERROR_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Dispatch a fix prompt on the next iteration.
    Retry,
    /// Retries exhausted; run one final interrogation round before
    /// blocking (handled by the caller, this decision just signals it).
    FinalInterrogation,
    /// Block the task immediately (repeated identical error).
    BlockImmediately,
}

/// Decide what happens to a task after a validation failure, given its
/// current progress record (mutated to reflect the new error).
pub fn record_failure(progress: &mut TaskProgress, task: &Task, error: &str) -> RetryDecision {
    let repeated = progress.last_error.as_deref() == Some(error);
    progress.repeated_error_count = if repeated { progress.repeated_error_count + 1 } else { 1 };
    progress.last_error = Some(error.to_string());

    if progress.repeated_error_count >= REPEATED_ERROR_THRESHOLD {
        return RetryDecision::BlockImmediately;
    }

    progress.retry_count += 1;
    if progress.retry_count > task.retry_policy.max_retries {
        RetryDecision::FinalInterrogation
    } else {
        RetryDecision::Retry
    }
}

/// Build the `BlockedTask` record for a task that is being given up on.
pub fn block_task(task: Task, reason: impl Into<String>, last_error: Option<String>, validation_report: Option<ValidationReport>) -> BlockedTask {
    BlockedTask { task, reason: reason.into(), blocked_at: Utc::now(), last_error, validation_report }
}

/// Advance the resource-exhaustion backoff ladder for a task. Returns the
/// new state and whether the ladder is now exhausted (permanent halt).
pub fn advance_backoff(existing: Option<&ResourceExhaustedState>) -> (ResourceExhaustedState, bool) {
    let next_index = existing.map(|s| s.backoff_index + 1).unwrap_or(0);
    if next_index >= RESOURCE_EXHAUSTED_BACKOFF_SECONDS.len() {
        let last = RESOURCE_EXHAUSTED_BACKOFF_SECONDS.len() - 1;
        return (
            ResourceExhaustedState { backoff_index: last, retry_at: Utc::now() + chrono::Duration::seconds(RESOURCE_EXHAUSTED_BACKOFF_SECONDS[last]) },
            true,
        );
    }
    let seconds = RESOURCE_EXHAUSTED_BACKOFF_SECONDS[next_index];
    (ResourceExhaustedState { backoff_index: next_index, retry_at: Utc::now() + chrono::Duration::seconds(seconds) }, false)
}

pub fn backoff_elapsed(state: &ResourceExhaustedState, now: DateTime<Utc>) -> bool {
    state.retry_at <= now
}
