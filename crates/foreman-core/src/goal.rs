//! Goal Completion Checker: invoked only once the queue is exhausted, asks
//! the configured provider whether the accumulated completed tasks satisfy
//! the operator's goal.

use std::time::Duration;

use foreman_db::model::{CompletedTask, Goal};

use crate::provider::{Provider, ProviderRequest};

pub const GOAL_CHECK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalOutcome {
    Completed,
    Incomplete,
    Ambiguous,
}

pub fn build_goal_check_prompt(goal: &Goal, completed_tasks: &[CompletedTask]) -> String {
    let mut out = String::new();
    out.push_str("## Goal\n\n");
    out.push_str(&goal.description);
    out.push_str("\n\n## Completed Tasks\n\n");
    if completed_tasks.is_empty() {
        out.push_str("(none)\n");
    } else {
        for t in completed_tasks {
            out.push_str(&format!("- {} (iteration {})\n", t.task_id, t.iteration));
        }
    }
    out.push_str("\nDoes the work above fully satisfy the goal? Respond as JSON: {\"outcome\": \"completed\"|\"incomplete\"|\"ambiguous\", \"reasoning\": string}\n");
    out
}

pub fn parse_goal_outcome(raw: &str) -> GoalOutcome {
    #[derive(serde::Deserialize)]
    struct Response {
        outcome: String,
    }
    match serde_json::from_str::<Response>(raw).map(|r| r.outcome.to_lowercase()) {
        Ok(s) if s == "completed" => GoalOutcome::Completed,
        Ok(s) if s == "incomplete" => GoalOutcome::Incomplete,
        _ => GoalOutcome::Ambiguous,
    }
}

/// Ask the provider whether the goal is satisfied, bounded by
/// [`GOAL_CHECK_TIMEOUT`]. A timeout is treated as ambiguous, not an error,
/// since the loop must always be able to produce a goal verdict.
pub async fn check_goal(provider: &dyn Provider, request: &ProviderRequest) -> GoalOutcome {
    match tokio::time::timeout(GOAL_CHECK_TIMEOUT, provider.execute(request)).await {
        Ok(Ok(result)) => parse_goal_outcome(&result.raw_output),
        Ok(Err(_)) | Err(_) => GoalOutcome::Ambiguous,
    }
}
