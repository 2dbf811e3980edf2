//! Prompt Builder: assembles a task-type-specific prompt from a task plus
//! a minimal projection of state (prior attempt feedback, nothing more).

use foreman_db::model::{Task, TaskProgress, TaskType};

/// Build the initial or retry prompt for one task.
///
/// Does NOT include other tasks' details, session internals, or raw state
/// — only what the provider needs to act on this one task.
pub fn build_prompt(task: &Task, progress: Option<&TaskProgress>) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Task: {}\n\n", task.intent));
    out.push_str(&format!("**Type:** {}\n\n", task.task_type));

    if !task.instructions.is_empty() {
        out.push_str("## Instructions\n\n");
        out.push_str(task.instructions.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Acceptance Criteria\n\n");
    for criterion in &task.acceptance_criteria {
        out.push_str(&format!("- {criterion}\n"));
    }
    out.push('\n');

    if let Some(dir) = &task.working_directory {
        out.push_str(&format!("**Working directory:** {dir}\n\n"));
    }

    if matches!(task.task_type, TaskType::Behavioral) {
        out.push_str("This is a behavioral task: respond directly, no file changes are expected.\n\n");
    }

    if let Some(progress) = progress {
        if let Some(last_error) = &progress.last_error {
            out.push_str("## Previous Attempt Feedback\n\n");
            out.push_str(&format!(
                "Attempt {} failed. Last recorded issue:\n\n```\n{}\n```\n\n",
                progress.retry_count, last_error
            ));
        }
    }

    out
}

/// Build a fix prompt incorporating failed criteria and diagnostic
/// evidence gathered by the validation pipeline.
pub fn build_fix_prompt(task: &Task, failed_criteria: &[String], evidence: &[String]) -> String {
    let mut out = build_prompt(task, None);
    out.push_str("## Validation Failed\n\n");
    out.push_str("The following acceptance criteria were not satisfied:\n\n");
    for criterion in failed_criteria {
        out.push_str(&format!("- {criterion}\n"));
    }
    if !evidence.is_empty() {
        out.push_str("\n## Evidence\n\n");
        for item in evidence {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.push_str("\nAddress each unmet criterion before responding again.\n");
    out
}
