//! `foreman metrics` command: print the analytics summary for the current
//! project, in the teacher's token/duration report style.

use std::path::Path;

use anyhow::{Context, Result};

use foreman_core::analytics::{self, summarize};
use foreman_core::state::StateManager;

pub async fn run_metrics(manager: &StateManager, sandbox_root: &Path) -> Result<()> {
    let state = manager.load_required().await.context("state not initialized; run `foreman init-state` first")?;
    let project_id = &state.goal.project_id;

    let entries = analytics::read_all(sandbox_root, project_id).await?;
    if entries.is_empty() {
        println!("No metrics recorded yet for project '{project_id}'.");
        return Ok(());
    }

    let summary = summarize(&entries);
    let total_tokens = summary.total_input_tokens + summary.total_output_tokens;

    println!("Project: {project_id}");
    println!("Tasks recorded: {}", summary.total_tasks);
    println!("Total attempts: {}", summary.total_attempts);
    println!();
    println!("Token usage:");
    println!("  Input:  {}", summary.total_input_tokens);
    println!("  Output: {}", summary.total_output_tokens);
    println!("  Total:  {total_tokens}");
    println!();
    println!("Total wall time: {}ms", summary.total_duration_ms);
    println!();

    println!("{:<24} {:<12} {:>8} {:>12} {:>10}", "TASK", "OUTCOME", "ATTEMPTS", "TOKENS", "DURATION");
    println!("{}", "-".repeat(70));
    for entry in &entries {
        let tokens = entry.input_tokens + entry.output_tokens;
        let name_display = if entry.task_id.len() > 22 { format!("{}...", &entry.task_id[..19]) } else { entry.task_id.clone() };
        println!("{:<24} {:<12} {:>8} {:>12} {:>9}ms", name_display, entry.outcome, entry.attempts, tokens, entry.duration_ms);
    }

    Ok(())
}
