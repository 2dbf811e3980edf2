//! `foreman enqueue` command: read a task file (one task object or an
//! array of tasks) and LPUSH each onto the task queue.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use foreman_db::model::{RetryPolicy, Task, TaskMeta, TaskStatus, TaskType};
use foreman_db::TaskQueue;

/// The operator-facing task shape: looser than the persisted `Task` record
/// since `task_type` and `status` are inferred rather than required.
#[derive(Debug, Deserialize)]
struct TaskInput {
    task_id: String,
    intent: String,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    agent_mode: Option<String>,
    #[serde(default)]
    instructions: String,
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    required_artifacts: Vec<String>,
    #[serde(default)]
    test_command: Option<String>,
    #[serde(default)]
    tests_required: bool,
    #[serde(default)]
    meta: TaskMeta,
}

impl From<TaskInput> for Task {
    fn from(input: TaskInput) -> Self {
        let task_type = input
            .task_type
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| TaskType::detect(&input.intent, &input.instructions));
        Task {
            task_id: input.task_id,
            intent: input.intent,
            task_type,
            tool: input.tool,
            agent_mode: input.agent_mode,
            instructions: input.instructions,
            acceptance_criteria: input.acceptance_criteria,
            retry_policy: input.retry_policy.unwrap_or_default(),
            status: TaskStatus::Pending,
            working_directory: input.working_directory,
            required_artifacts: input.required_artifacts,
            test_command: input.test_command,
            tests_required: input.tests_required,
            meta: input.meta,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Many(Vec<TaskInput>),
    One(Box<TaskInput>),
}

pub async fn run_enqueue(queue: &TaskQueue, task_file: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(task_file)
        .await
        .with_context(|| format!("failed to read task file at {}", task_file.display()))?;
    let parsed: TaskFile = serde_json::from_str(&contents).context("task file is not valid JSON for a task or an array of tasks")?;

    let tasks: Vec<Task> = match parsed {
        TaskFile::Many(inputs) => inputs.into_iter().map(Task::from).collect(),
        TaskFile::One(input) => vec![Task::from(*input)],
    };

    queue.enqueue_many(&tasks).await?;
    println!("Enqueued {} task(s).", tasks.len());
    for task in &tasks {
        println!("  - {} ({})", task.task_id, task.task_type);
    }
    Ok(())
}
