//! Validation Pipeline: deterministic checks → helper-agent verification
//! → bounded interrogation, short-circuiting on the first HIGH-confidence
//! pass. Behavioral tasks bypass all of this (see [`behavioral`]).

pub mod behavioral;
pub mod deterministic;
pub mod helper;
pub mod interrogation;

use std::path::Path;

use foreman_db::model::{Confidence, Task, TaskProgress, TaskType, ValidationReport};

use crate::provider::{Provider, ProviderRequest};
use deterministic::{map_criterion_to_checks, run_check, Check};

pub struct PipelineOutcome {
    pub report: ValidationReport,
    pub needs_retry: bool,
    /// Paths referenced by failed deterministic checks, used to make
    /// round-2 interrogation prompts concrete.
    pub missing_paths: Vec<String>,
}

/// Run deterministic checks for every failed acceptance criterion.
/// Returns the still-failing criteria and the weakest confidence seen
/// among criteria that *did* map to a check.
fn run_deterministic_stage(task: &Task, sandbox_dir: &Path, use_ripgrep: bool) -> (Vec<String>, Vec<String>, Confidence, Vec<String>) {
    let mut still_failed = Vec::new();
    let mut passed = Vec::new();
    let mut missing_paths = Vec::new();
    let mut weakest = Confidence::High;
    let mut any_mapped = false;

    for criterion in &task.acceptance_criteria {
        let checks = map_criterion_to_checks(criterion);
        if checks.is_empty() {
            still_failed.push(criterion.clone());
            weakest = Confidence::Low;
            continue;
        }
        any_mapped = true;
        let mut criterion_passed = true;
        for check in &checks {
            let result = run_check(check, sandbox_dir, use_ripgrep);
            if !result.passed {
                criterion_passed = false;
                if let Check::FileExists(p) | Check::FileNotExists(p) = &check {
                    missing_paths.push(p.clone());
                }
            }
            if check.confidence() < weakest {
                weakest = check.confidence();
            }
        }
        if criterion_passed {
            passed.push(criterion.clone());
        } else {
            still_failed.push(criterion.clone());
        }
    }

    if !any_mapped && still_failed.len() == task.acceptance_criteria.len() {
        weakest = Confidence::Low;
    }

    (passed, still_failed, weakest, missing_paths)
}

/// Full pipeline entry point for one task attempt.
#[allow(clippy::too_many_arguments)]
pub async fn validate_task(
    task: &Task,
    response_text: &str,
    sandbox_dir: &Path,
    helper_provider: Option<&dyn Provider>,
    helper_request: Option<&ProviderRequest>,
    strict_helper: bool,
    use_ripgrep: bool,
    _progress: Option<&TaskProgress>,
) -> anyhow::Result<PipelineOutcome> {
    if matches!(task.task_type, TaskType::Behavioral) {
        let report = behavioral::validate_behavioral(&task.acceptance_criteria, response_text);
        let needs_retry = !report.valid;
        return Ok(PipelineOutcome { report, needs_retry, missing_paths: Vec::new() });
    }

    let (passed, still_failed, confidence, missing_paths) = run_deterministic_stage(task, sandbox_dir, use_ripgrep);

    if still_failed.is_empty() {
        return Ok(PipelineOutcome {
            report: ValidationReport { rules_passed: passed, ..ValidationReport::pass(Confidence::High, "deterministic checks satisfied all criteria") },
            needs_retry: false,
            missing_paths,
        });
    }

    if confidence == Confidence::High {
        // All mapped checks were HIGH-confidence existence checks yet some
        // still failed: a genuine failure, not something helper verification
        // would add value to.
        return Ok(PipelineOutcome {
            report: ValidationReport { rules_passed: passed, ..ValidationReport::fail(Confidence::High, "deterministic checks failed", still_failed) },
            needs_retry: true,
            missing_paths,
        });
    }

    // Stage 3: helper agent verification, when a provider is wired in.
    if let (Some(provider), Some(request)) = (helper_provider, helper_request) {
        let (helper_valid, _outcomes, reasoning) = helper::run_helper_stage(provider, request, sandbox_dir, strict_helper).await?;
        if helper_valid {
            return Ok(PipelineOutcome {
                report: ValidationReport { rules_passed: passed, ..ValidationReport::pass(Confidence::Medium, reasoning) },
                needs_retry: false,
                missing_paths,
            });
        }
        return Ok(PipelineOutcome {
            report: ValidationReport {
                rules_passed: passed,
                uncertain_criteria: still_failed.clone(),
                ..ValidationReport::fail(Confidence::Low, format!("helper verification failed: {reasoning}"), still_failed)
            },
            needs_retry: true,
            missing_paths,
        });
    }

    Ok(PipelineOutcome {
        report: ValidationReport { rules_passed: passed, ..ValidationReport::fail(confidence, "deterministic evidence insufficient, no helper available", still_failed) },
        needs_retry: true,
        missing_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn coding_task(criteria: Vec<&str>) -> Task {
        let mut task = Task::new("t1", "Create package.json", criteria.into_iter().map(String::from).collect());
        task.task_type = TaskType::Coding;
        task
    }

    #[tokio::test]
    async fn happy_path_passes_with_high_confidence_when_file_exists() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let task = coding_task(vec!["package.json exists"]);
        let outcome = validate_task(&task, "", dir.path(), None, None, false, false, None).await.unwrap();
        assert!(outcome.report.valid);
        assert_eq!(outcome.report.confidence, Confidence::High);
        assert!(!outcome.needs_retry);
    }

    #[tokio::test]
    async fn fails_with_high_confidence_when_expected_file_missing() {
        let dir = tempdir().unwrap();
        let task = coding_task(vec!["package.json exists"]);
        let outcome = validate_task(&task, "", dir.path(), None, None, false, false, None).await.unwrap();
        assert!(!outcome.report.valid);
        assert!(outcome.needs_retry);
    }

    #[tokio::test]
    async fn behavioral_tasks_bypass_file_checks() {
        let mut task = coding_task(vec!["Greet using hello/hi/welcome"]);
        task.task_type = TaskType::Behavioral;
        let dir = tempdir().unwrap();
        let outcome = validate_task(&task, "Hello there!", dir.path(), None, None, false, false, None).await.unwrap();
        assert!(outcome.report.valid);
        assert!(!outcome.needs_retry);
    }

    #[tokio::test]
    async fn unrecognized_criterion_without_helper_fails_low_confidence() {
        let dir = tempdir().unwrap();
        let task = coding_task(vec!["the code is elegant"]);
        let outcome = validate_task(&task, "", dir.path(), None, None, false, false, None).await.unwrap();
        assert!(!outcome.report.valid);
        assert_eq!(outcome.report.confidence, Confidence::Low);
    }
}
