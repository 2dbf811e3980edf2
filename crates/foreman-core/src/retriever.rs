//! Task Retriever: decides what task the control loop works on next.
//!
//! Ensures at-most-one task in flight and that no task is silently
//! dropped across restarts.

use foreman_db::model::{SupervisorState, Task};
use foreman_db::TaskQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveSource {
    CurrentTaskRecovery,
    RetryTask,
    Queue,
    None,
}

pub struct Retrieved {
    pub task: Option<Task>,
    pub source: RetrieveSource,
    pub queue_exhausted: bool,
}

/// (1) resume an in-flight task, (2) resume a task flagged for retry,
/// (3) pop the next queued task, (4) report the queue is exhausted.
pub async fn retrieve(state: &SupervisorState, queue: &TaskQueue) -> anyhow::Result<Retrieved> {
    if let Some(task) = &state.current_task {
        return Ok(Retrieved { task: Some(task.clone()), source: RetrieveSource::CurrentTaskRecovery, queue_exhausted: false });
    }

    if let Some(task_id) = retry_flagged_task_id(state) {
        if let Some(blocked_or_progress) = find_retry_candidate(state, &task_id) {
            return Ok(Retrieved { task: Some(blocked_or_progress), source: RetrieveSource::RetryTask, queue_exhausted: false });
        }
    }

    match queue.dequeue().await? {
        Some(task) => Ok(Retrieved { task: Some(task), source: RetrieveSource::Queue, queue_exhausted: false }),
        None => Ok(Retrieved { task: None, source: RetrieveSource::None, queue_exhausted: true }),
    }
}

/// A task is flagged for immediate retry when its `TaskProgress` carries a
/// resource-exhaustion backoff whose deadline has already passed.
fn retry_flagged_task_id(state: &SupervisorState) -> Option<String> {
    let now = chrono::Utc::now();
    state.task_progress.iter().find_map(|(task_id, progress)| {
        progress.resource_exhausted.as_ref().filter(|r| r.retry_at <= now).map(|_| task_id.clone())
    })
}

fn find_retry_candidate(state: &SupervisorState, task_id: &str) -> Option<Task> {
    state.blocked_tasks.iter().find(|b| b.task.task_id == task_id).map(|b| b.task.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_db::memory::MemoryStore;
    use foreman_db::model::{Goal, ResourceExhaustedState, TaskProgress};
    use std::sync::Arc;

    fn base_state() -> SupervisorState {
        SupervisorState::new(Goal { description: "g".into(), project_id: "p".into(), completed: false }, true)
    }

    #[tokio::test]
    async fn recovers_current_task_before_touching_queue() {
        let mut state = base_state();
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        let in_flight = Task::new("t1", "do x", vec!["c".into()]);
        state.current_task = Some(in_flight.clone());
        queue.enqueue(&Task::new("t2", "do y", vec!["c".into()])).await.unwrap();

        let retrieved = retrieve(&state, &queue).await.unwrap();
        assert_eq!(retrieved.source, RetrieveSource::CurrentTaskRecovery);
        assert_eq!(retrieved.task.unwrap().task_id, "t1");
    }

    #[tokio::test]
    async fn pops_queue_when_nothing_in_flight() {
        let state = base_state();
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        queue.enqueue(&Task::new("t1", "do x", vec!["c".into()])).await.unwrap();

        let retrieved = retrieve(&state, &queue).await.unwrap();
        assert_eq!(retrieved.source, RetrieveSource::Queue);
        assert_eq!(retrieved.task.unwrap().task_id, "t1");
    }

    #[tokio::test]
    async fn reports_queue_exhausted_when_empty() {
        let state = base_state();
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        let retrieved = retrieve(&state, &queue).await.unwrap();
        assert_eq!(retrieved.source, RetrieveSource::None);
        assert!(retrieved.queue_exhausted);
    }

    #[tokio::test]
    async fn returns_retry_flagged_task_when_backoff_elapsed() {
        let mut state = base_state();
        let blocked_task = Task::new("t3", "retry me", vec!["c".into()]);
        state.blocked_tasks.push(foreman_db::model::BlockedTask {
            task: blocked_task.clone(),
            reason: "resource exhausted".into(),
            blocked_at: chrono::Utc::now(),
            last_error: None,
            validation_report: None,
        });
        state.task_progress.insert(
            "t3".into(),
            TaskProgress {
                resource_exhausted: Some(ResourceExhaustedState { backoff_index: 0, retry_at: chrono::Utc::now() - chrono::Duration::seconds(1) }),
                ..Default::default()
            },
        );
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");

        let retrieved = retrieve(&state, &queue).await.unwrap();
        assert_eq!(retrieved.source, RetrieveSource::RetryTask);
        assert_eq!(retrieved.task.unwrap().task_id, "t3");
    }
}
