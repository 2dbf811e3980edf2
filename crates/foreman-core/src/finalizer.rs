//! Task Finalizer: commits a validated success into state and clears the
//! per-task scratchpad.

use foreman_db::model::{CompletedTask, SupervisorState, ValidationReport};

/// Record `task_id` as completed, clear `current_task` and its progress
/// record. Does not persist; the caller owns the persist call so it can be
/// combined with an audit entry in one iteration.
pub fn finalize(state: &mut SupervisorState, task_id: &str, validation_report: ValidationReport) {
    state.completed_tasks.push(CompletedTask { task_id: task_id.to_string(), completed_at: chrono::Utc::now(), validation_report, iteration: state.iteration });
    state.current_task = None;
    state.task_progress.remove(task_id);
    state.last_updated = chrono::Utc::now();
}
