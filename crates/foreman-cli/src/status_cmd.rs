//! `foreman status` command: print supervisor status, goal, and per-task
//! progress, in the teacher's table/icon style adapted to a single current
//! task instead of a DAG of plans.

use anyhow::{Context, Result};

use foreman_core::state::StateManager;
use foreman_db::model::{SupervisorStatus, TaskStatus};
use foreman_db::TaskQueue;

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => ".",
        TaskStatus::InProgress => "*",
        TaskStatus::Completed => "+",
        TaskStatus::Blocked => "!",
    }
}

pub async fn run_status(manager: &StateManager, queue: &TaskQueue) -> Result<()> {
    let state = manager.load_required().await.context("state not initialized; run `foreman init-state` first")?;

    println!("Goal: {}", state.goal.description);
    println!("Project: {}", state.goal.project_id);
    println!("Status: {}", state.status);
    println!("Iteration: {}", state.iteration);
    if let Some(reason) = &state.halt_reason {
        println!("Halt reason: {reason}");
    }
    if let Some(details) = &state.halt_details {
        println!("Halt details: {details}");
    }
    println!();

    let queued = queue.len().await?;
    println!(
        "Tasks: {} completed, {} blocked, {} queued, {}",
        state.completed_tasks.len(),
        state.blocked_tasks.len(),
        queued,
        if state.current_task.is_some() { "1 in flight" } else { "none in flight" },
    );
    println!();

    if let Some(task) = &state.current_task {
        println!("  [{}] {} (in_progress)", status_icon(TaskStatus::InProgress), task.intent);
    }
    for completed in &state.completed_tasks {
        println!("  [{}] {} (iteration {})", status_icon(TaskStatus::Completed), completed.task_id, completed.iteration);
    }
    for blocked in &state.blocked_tasks {
        println!("  [{}] {} ({})", status_icon(TaskStatus::Blocked), blocked.task.task_id, blocked.reason);
    }

    if matches!(state.status, SupervisorStatus::Completed) {
        println!();
        println!("Goal completed.");
    }

    Ok(())
}
