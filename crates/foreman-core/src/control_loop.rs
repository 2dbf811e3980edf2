//! Control Loop: the top-level state machine that sequences every other
//! component. LOADING -> READY -> DISPATCHING -> VALIDATING -> FINALIZING ->
//! LOADING, with exits to HALTED on critical halts and SLEEPING on
//! resource-exhausted backoff.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use foreman_db::model::{HaltReason, SessionInfo, SupervisorState, SupervisorStatus, Task, TaskProgress};
use foreman_db::{KvStore, TaskQueue};

use crate::analytics::{AnalyticsSink, TaskMetrics};
use crate::audit::{AuditEntry, AuditSink};
use crate::circuit_breaker::{trips_breaker, CircuitBreaker};
use crate::config::Config;
use crate::goal::{self, GoalOutcome};
use crate::halt::{self, HaltSignal};
use crate::prompt;
use crate::provider::registry::ProviderRegistry;
use crate::provider::{Provider, ProviderRequest, ProviderStatus};
use crate::retriever;
use crate::retry::{self, RetryDecision};
use crate::session;
use crate::state::StateManager;
use crate::validate::{self, helper};

/// What the outer `run` loop should do after one iteration.
enum IterationResult {
    Continue,
    Halted,
    Completed,
    Sleep(Duration),
}

/// Why [`ControlLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Completed,
    Halted,
    Cancelled,
}

pub struct ControlLoop {
    state_manager: StateManager,
    queue: TaskQueue,
    config: Config,
    providers: ProviderRegistry,
    breaker: CircuitBreaker,
}

impl ControlLoop {
    pub fn new(state_store: Arc<dyn KvStore>, queue_store: Arc<dyn KvStore>, config: Config, providers: ProviderRegistry) -> Self {
        let state_manager = StateManager::new(state_store.clone(), config.kv.state_key.clone());
        let queue = TaskQueue::new(queue_store, config.kv.queue_name.clone());
        let breaker = CircuitBreaker::new(state_store, config.circuit_breaker_ttl);
        ControlLoop { state_manager, queue, config, providers, breaker }
    }

    fn sandbox_dir(&self, project_id: &str) -> PathBuf {
        self.config.sandbox_root.join(project_id)
    }

    fn audit_for(&self, project_id: &str) -> AuditSink {
        AuditSink::new(&self.config.sandbox_root, project_id)
    }

    fn analytics_for(&self, project_id: &str) -> AnalyticsSink {
        AnalyticsSink::new(&self.config.sandbox_root, project_id)
    }

    /// Drive the loop until HALTED, COMPLETED, or cooperative cancellation.
    /// Does not self-restart; the operator must invoke `start` again after
    /// a `resume`.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<LoopExit> {
        loop {
            if cancel.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }

            let mut state = self.state_manager.load_required().await?;
            if !matches!(state.status, SupervisorStatus::Running) {
                return Ok(LoopExit::Halted);
            }

            let outcome = self.run_iteration(&mut state).await?;
            self.state_manager.persist(&state).await?;

            match outcome {
                IterationResult::Continue => continue,
                IterationResult::Halted => return Ok(LoopExit::Halted),
                IterationResult::Completed => return Ok(LoopExit::Completed),
                IterationResult::Sleep(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => continue,
                        _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                    }
                }
            }
        }
    }

    async fn run_iteration(&self, state: &mut SupervisorState) -> anyhow::Result<IterationResult> {
        state.iteration += 1;
        state.last_updated = Utc::now();
        let project_id = state.goal.project_id.clone();

        let retrieved = retriever::retrieve(state, &self.queue).await?;
        let Some(task) = retrieved.task else {
            return self.check_goal_completion(state).await;
        };

        state.current_task = Some(task.clone());
        let progress = state.task_progress.get(&task.task_id).cloned();
        let feature_id = task.feature_id(&project_id);
        let session_id = session::resolve_session(state, &feature_id, self.config.disable_session_reuse);

        let eligible = self.breaker.select(&self.config.kv, &self.config.provider_priority, task.tool.as_deref()).await?;
        let Some(provider_name) = eligible.first() else {
            return self.halt(state, HaltReason::ProviderCircuitBroken, "no eligible provider remains").await;
        };
        let Some(provider) = self.providers.get(provider_name) else {
            anyhow::bail!("provider {provider_name} is not registered");
        };

        let sandbox_dir = self.sandbox_dir(&project_id);
        let request = ProviderRequest {
            prompt: prompt::build_prompt(&task, progress.as_ref()),
            cwd: sandbox_dir.clone(),
            agent_mode: task.agent_mode.clone(),
            session_id,
            feature_id: Some(feature_id.clone()),
        };

        let started = Instant::now();
        let dispatch = provider.execute(&request).await;
        let provider_result = match dispatch {
            Ok(result) => result,
            Err(e) => return self.handle_validation_failure(state, &task, progress, &format!("provider exec failed: {e}"), provider_name, None, &[], &[]).await,
        };

        let self_reported_blocked = matches!(provider_result.status, Some(ProviderStatus::Blocked));
        let expect_json_schema = task.task_type == foreman_db::model::TaskType::Coding;
        let signal = halt::classify(&provider_result.raw_output, &provider_result.stderr, provider_result.exit_code, expect_json_schema, self_reported_blocked);

        if signal.is_critical() {
            let reason = match signal {
                HaltSignal::Blocked => HaltReason::Blocked,
                HaltSignal::OutputFormatInvalid => HaltReason::OutputFormatInvalid,
                HaltSignal::ProviderCircuitBroken => HaltReason::ProviderCircuitBroken,
                _ => unreachable!("is_critical only returns these three variants"),
            };
            return self.halt(state, reason, format!("provider {provider_name} raised {reason}")).await;
        }

        match signal {
            HaltSignal::ProviderExecFailure => {
                let class = halt::classify_error(&provider_result.stderr, provider_result.exit_code);
                if trips_breaker(class, 1) {
                    self.breaker.trip(&self.config.kv, provider_name, class).await?;
                }
                return self
                    .handle_validation_failure(state, &task, progress, &format!("provider exec failure: {}", provider_result.stderr), provider_name, None, &[], &[])
                    .await;
            }
            HaltSignal::ResourceExhausted => return self.handle_resource_exhausted(state, &task, provider_name).await,
            HaltSignal::AmbiguityDetected => {
                return self
                    .handle_validation_failure(state, &task, progress, "agent asked a clarifying question instead of completing the task", provider_name, None, &[], &[])
                    .await;
            }
            _ => {}
        }

        if let Some(sid) = &provider_result.session_id {
            let tokens = provider_result.usage.as_ref().map(|u| u.input_tokens + u.output_tokens).unwrap_or(0);
            session::record_session(
                state,
                &feature_id,
                SessionInfo { session_id: sid.clone(), provider: provider_name.clone(), feature_id: feature_id.clone(), last_used: Utc::now(), error_count: 0, total_tokens: tokens, context_limit: None },
            );
        }

        let helper_feature = session::helper_feature_id(&project_id);
        let helper_session = session::resolve_session(state, &helper_feature, self.config.disable_session_reuse);
        let helper_request = ProviderRequest {
            prompt: helper::build_helper_prompt(&task.acceptance_criteria, &truncate(&provider_result.stdout, 2000), &file_tree_summary(&sandbox_dir)),
            cwd: sandbox_dir.clone(),
            agent_mode: None,
            session_id: helper_session,
            feature_id: Some(helper_feature),
        };

        let pipeline_outcome = validate::validate_task(
            &task,
            &provider_result.stdout,
            &sandbox_dir,
            Some(provider),
            Some(&helper_request),
            self.config.strict_helper,
            self.config.use_ripgrep,
            progress.as_ref(),
        )
        .await?;

        let duration_ms = started.elapsed().as_millis() as u64;

        if pipeline_outcome.report.valid {
            crate::finalizer::finalize(state, &task.task_id, pipeline_outcome.report.clone());
            self.audit_for(&project_id).append(&AuditEntry::new("task_completed").with_task_id(&task.task_id)).await?;
            self.analytics_for(&project_id)
                .record(&TaskMetrics::new(&task.task_id, provider_name.clone(), progress.as_ref().map(|p| p.retry_count + 1).unwrap_or(1), duration_ms, provider_result.usage.as_ref(), "completed"))
                .await?;
            return Ok(IterationResult::Continue);
        }

        self.handle_validation_failure(
            state,
            &task,
            progress,
            &pipeline_outcome.report.reason,
            provider_name,
            Some(pipeline_outcome.report.clone()),
            &pipeline_outcome.report.failed_criteria,
            &pipeline_outcome.missing_paths,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_validation_failure(
        &self,
        state: &mut SupervisorState,
        task: &Task,
        progress: Option<TaskProgress>,
        error: &str,
        provider_name: &str,
        validation_report: Option<foreman_db::model::ValidationReport>,
        failed_criteria: &[String],
        missing_paths: &[String],
    ) -> anyhow::Result<IterationResult> {
        let project_id = state.goal.project_id.clone();
        let mut progress = progress.unwrap_or_default();
        let decision = retry::record_failure(&mut progress, task, error);

        match decision {
            RetryDecision::Retry => {
                state.task_progress.insert(task.task_id.clone(), progress);
                Ok(IterationResult::Continue)
            }
            RetryDecision::FinalInterrogation => {
                if !progress.interrogation_done && !failed_criteria.is_empty() {
                    if let Some(provider) = self.providers.get(provider_name) {
                        let outcome = self.run_interrogation(provider, task, &project_id, failed_criteria, missing_paths).await?;
                        if outcome.still_unresolved.is_empty() {
                            let report = foreman_db::model::ValidationReport::pass(foreman_db::model::Confidence::Medium, "resolved via interrogation");
                            state.task_progress.remove(&task.task_id);
                            crate::finalizer::finalize(state, &task.task_id, report);
                            self.audit_for(&project_id).append(&AuditEntry::new("task_completed_via_interrogation").with_task_id(&task.task_id)).await?;
                            return Ok(IterationResult::Continue);
                        }
                    }
                }
                progress.interrogation_done = true;
                state.task_progress.remove(&task.task_id);
                let blocked = retry::block_task(task.clone(), "max_retries exceeded after final interrogation", Some(error.to_string()), validation_report);
                state.blocked_tasks.push(blocked);
                state.current_task = None;
                self.audit_for(&project_id).append(&AuditEntry::new("task_blocked").with_task_id(&task.task_id)).await?;
                Ok(IterationResult::Continue)
            }
            RetryDecision::BlockImmediately => {
                state.task_progress.remove(&task.task_id);
                let blocked = retry::block_task(task.clone(), "repeated_identical_error", Some(error.to_string()), validation_report);
                state.blocked_tasks.push(blocked);
                state.current_task = None;
                self.audit_for(&project_id).append(&AuditEntry::new("task_blocked").with_task_id(&task.task_id)).await?;
                Ok(IterationResult::Continue)
            }
        }
    }

    /// Run up to [`interrogation::MAX_ROUNDS`] rounds against the unresolved
    /// criteria, stopping early once every criterion resolves or a round
    /// reports everything incomplete.
    async fn run_interrogation(
        &self,
        provider: &dyn Provider,
        task: &Task,
        project_id: &str,
        failed_criteria: &[String],
        missing_paths: &[String],
    ) -> anyhow::Result<validate::interrogation::InterrogationOutcome> {
        let mut unresolved = failed_criteria.to_vec();
        let mut resolved = Vec::new();

        for round in 1..=validate::interrogation::MAX_ROUNDS {
            if unresolved.is_empty() {
                break;
            }
            let prompt = validate::interrogation::build_interrogation_prompt(&unresolved, &resolved, round, missing_paths);
            let request = ProviderRequest {
                prompt,
                cwd: self.sandbox_dir(project_id),
                agent_mode: None,
                session_id: None,
                feature_id: Some(format!("interrogation:{project_id}:{}", task.task_id)),
            };
            let result = provider.execute(&request).await?;
            let response = validate::interrogation::parse_interrogation_response(&result.raw_output);
            let outcome = validate::interrogation::evaluate_round(&unresolved, &response, round);
            resolved.extend(outcome.resolved);
            unresolved = outcome.still_unresolved;
            if outcome.should_halt_interrogation {
                break;
            }
        }

        Ok(validate::interrogation::InterrogationOutcome { resolved, still_unresolved: unresolved, should_halt_interrogation: false })
    }

    async fn handle_resource_exhausted(&self, state: &mut SupervisorState, task: &Task, _provider_name: &str) -> anyhow::Result<IterationResult> {
        let project_id = state.goal.project_id.clone();
        let existing = state.task_progress.get(&task.task_id).and_then(|p| p.resource_exhausted.clone());
        let (next, exhausted) = retry::advance_backoff(existing.as_ref());
        let mut progress = state.task_progress.get(&task.task_id).cloned().unwrap_or_default();
        progress.resource_exhausted = Some(next.clone());
        state.task_progress.insert(task.task_id.clone(), progress);

        if exhausted {
            return self.halt(state, HaltReason::ResourceExhaustedFinal, format!("task {} exhausted the resource backoff ladder", task.task_id)).await;
        }

        let sleep_duration = (next.retry_at - Utc::now()).to_std().unwrap_or(Duration::from_secs(1));
        self.audit_for(&project_id).append(&AuditEntry::new("resource_exhausted_backoff").with_task_id(&task.task_id)).await?;
        Ok(IterationResult::Sleep(sleep_duration))
    }

    async fn check_goal_completion(&self, state: &mut SupervisorState) -> anyhow::Result<IterationResult> {
        state.queue_meta.exhausted = true;
        let project_id = state.goal.project_id.clone();

        let eligible = self.breaker.select(&self.config.kv, &self.config.provider_priority, None).await?;
        let Some(provider_name) = eligible.first() else {
            return self.halt(state, HaltReason::ProviderCircuitBroken, "no eligible provider for goal check").await;
        };
        let Some(provider) = self.providers.get(provider_name) else {
            anyhow::bail!("provider {provider_name} is not registered");
        };

        let request = ProviderRequest {
            prompt: goal::build_goal_check_prompt(&state.goal, &state.completed_tasks),
            cwd: self.sandbox_dir(&project_id),
            agent_mode: None,
            session_id: None,
            feature_id: Some(format!("goal-check:{project_id}")),
        };

        match goal::check_goal(provider, &request).await {
            GoalOutcome::Completed => {
                state.status = SupervisorStatus::Completed;
                state.goal.completed = true;
                Ok(IterationResult::Completed)
            }
            GoalOutcome::Incomplete | GoalOutcome::Ambiguous => self.halt(state, HaltReason::TaskListExhaustedGoalIncomplete, "queue exhausted, goal not yet satisfied").await,
        }
    }

    async fn halt(&self, state: &mut SupervisorState, reason: HaltReason, details: impl Into<String>) -> anyhow::Result<IterationResult> {
        let project_id = state.goal.project_id.clone();
        state.status = SupervisorStatus::Halted;
        state.halt_reason = Some(reason);
        state.halt_details = Some(details.into());
        state.current_task = None;
        self.audit_for(&project_id).append(&AuditEntry::new("halted").with_halt_reason(reason)).await?;
        Ok(IterationResult::Halted)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    crate::audit::truncate_preview(s, max_chars)
}

/// A shallow, bounded directory listing used as context for the helper
/// agent; not a substitute for the deterministic validator's own scans.
fn file_tree_summary(sandbox_dir: &Path) -> String {
    let mut out = String::new();
    let Ok(entries) = std::fs::read_dir(sandbox_dir) else { return "(sandbox directory does not exist yet)".to_string() };
    for entry in entries.flatten().take(200) {
        if let Some(name) = entry.file_name().to_str() {
            out.push_str(name);
            out.push('\n');
        }
    }
    if out.is_empty() {
        out.push_str("(empty)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_db::memory::MemoryStore;
    use foreman_db::model::Goal;
    use tempfile::tempdir;

    use crate::provider::stub::StubProvider;

    fn config(sandbox_root: PathBuf) -> Config {
        Config {
            kv: foreman_db::KvConfig { host: "127.0.0.1".into(), port: 6379, queue_db: 0, state_db: 0, state_key: "supervisor:state".into(), queue_name: "tasks".into() },
            sandbox_root,
            provider_priority: vec!["gemini_stub".to_string()],
            circuit_breaker_ttl: Duration::from_secs(3600),
            use_ripgrep: false,
            disable_session_reuse: false,
            strict_helper: false,
        }
    }

    fn goal(project_id: &str) -> Goal {
        Goal { description: "create package.json".into(), project_id: project_id.into(), completed: false }
    }

    fn is_goal_check(req: &ProviderRequest) -> bool {
        req.feature_id.as_deref().is_some_and(|f| f.starts_with("goal-check:"))
    }

    fn goal_check_result() -> crate::provider::ProviderResult {
        let body = r#"{"outcome":"completed"}"#.to_string();
        crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() }
    }

    async fn seeded_loop(sandbox_root: PathBuf, provider: Box<dyn Provider>) -> (ControlLoop, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let control_loop = ControlLoop::new(store.clone(), store.clone(), config(sandbox_root), registry);
        (control_loop, store)
    }

    #[tokio::test]
    async fn happy_path_completes_when_provider_satisfies_acceptance_criteria() {
        let sandbox = tempdir().unwrap();
        let project_dir = sandbox.path().join("proj1");
        std::fs::create_dir_all(&project_dir).unwrap();

        let provider = StubProvider::new("gemini_stub", move |req: &ProviderRequest| {
            if is_goal_check(req) {
                return goal_check_result();
            }
            std::fs::write(req.cwd.join("package.json"), "{}").unwrap();
            let body = r#"{"summary": "created package.json"}"#.to_string();
            crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() }
        });
        let (control_loop, store) = seeded_loop(sandbox.path().to_path_buf(), Box::new(provider)).await;

        let state = SupervisorState::new(goal("proj1"), true);
        control_loop.state_manager.init(&state).await.unwrap();
        control_loop.queue.enqueue(&Task::new("t1", "Create package.json", vec!["package.json exists".to_string()])).await.unwrap();

        let exit = control_loop.run(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, LoopExit::Completed);

        let final_state: SupervisorState = serde_json::from_slice(&store.get("supervisor:state").await.unwrap().unwrap()).unwrap();
        assert_eq!(final_state.status, SupervisorStatus::Completed);
        assert_eq!(final_state.completed_tasks.len(), 1);
    }

    #[tokio::test]
    async fn behavioral_task_completes_without_touching_sandbox() {
        let sandbox = tempdir().unwrap();
        let project_dir = sandbox.path().join("proj1");
        std::fs::create_dir_all(&project_dir).unwrap();

        let provider = StubProvider::new("gemini_stub", |req: &ProviderRequest| {
            if is_goal_check(req) {
                return goal_check_result();
            }
            let body = "Hello! Welcome aboard.".to_string();
            crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() }
        });
        let (control_loop, _store) = seeded_loop(sandbox.path().to_path_buf(), Box::new(provider)).await;

        let state = SupervisorState::new(goal("proj1"), true);
        control_loop.state_manager.init(&state).await.unwrap();
        let mut task = Task::new("t4", "Greet the user", vec!["Greet using hello/hi/welcome".to_string()]);
        task.task_type = foreman_db::model::TaskType::Behavioral;
        control_loop.queue.enqueue(&task).await.unwrap();

        let exit = control_loop.run(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, LoopExit::Completed);
    }

    #[tokio::test]
    async fn final_interrogation_resolves_unverifiable_criterion_into_completion() {
        let sandbox = tempdir().unwrap();
        let project_dir = sandbox.path().join("proj1");
        std::fs::create_dir_all(&project_dir).unwrap();

        let provider = StubProvider::new("gemini_stub", |req: &ProviderRequest| {
            let feature = req.feature_id.as_deref().unwrap_or("");
            if feature.starts_with("goal-check:") {
                return goal_check_result();
            }
            if feature.starts_with("interrogation:") {
                let body = r#"{"answers":[{"criterion":"the code is elegant","status":"COMPLETE","evidence":"reviewed manually"}]}"#.to_string();
                return crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() };
            }
            if feature.starts_with("helper:validation:") {
                let body = r#"{"isValid": false, "verificationCommands": [], "reasoning": "not sure"}"#.to_string();
                return crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() };
            }
            let body = r#"{"summary": "I did my best"}"#.to_string();
            crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() }
        });
        let (control_loop, store) = seeded_loop(sandbox.path().to_path_buf(), Box::new(provider)).await;

        let state = SupervisorState::new(goal("proj1"), true);
        control_loop.state_manager.init(&state).await.unwrap();
        let mut task = Task::new("t9", "Write elegant code", vec!["the code is elegant".to_string()]);
        task.retry_policy = foreman_db::model::RetryPolicy { max_retries: 1 };
        control_loop.queue.enqueue(&task).await.unwrap();

        let exit = control_loop.run(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, LoopExit::Completed);

        let final_state: SupervisorState = serde_json::from_slice(&store.get("supervisor:state").await.unwrap().unwrap()).unwrap();
        assert_eq!(final_state.completed_tasks.len(), 1);
        assert!(final_state.blocked_tasks.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_error_blocks_task_without_halting_loop() {
        let sandbox = tempdir().unwrap();
        let project_dir = sandbox.path().join("proj1");
        std::fs::create_dir_all(&project_dir).unwrap();

        let provider = StubProvider::new("gemini_stub", |_req: &ProviderRequest| crate::provider::ProviderResult {
            stdout: String::new(),
            stderr: "invalid model argument 'foo'".to_string(),
            exit_code: Some(1),
            ..Default::default()
        });
        let (control_loop, store) = seeded_loop(sandbox.path().to_path_buf(), Box::new(provider)).await;

        let state = SupervisorState::new(goal("proj1"), true);
        control_loop.state_manager.init(&state).await.unwrap();
        let mut task = Task::new("t3", "Build the widget", vec!["package.json exists".to_string()]);
        task.retry_policy = foreman_db::model::RetryPolicy { max_retries: 10 };
        control_loop.queue.enqueue(&task).await.unwrap();

        let exit = control_loop.run(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, LoopExit::Halted);

        let final_state: SupervisorState = serde_json::from_slice(&store.get("supervisor:state").await.unwrap().unwrap()).unwrap();
        assert_eq!(final_state.blocked_tasks.len(), 1);
        assert_eq!(final_state.blocked_tasks[0].reason, "repeated_identical_error");
    }

    #[tokio::test]
    async fn crash_recovery_resumes_in_flight_task_without_requeuing() {
        let sandbox = tempdir().unwrap();
        let project_dir = sandbox.path().join("proj1");
        std::fs::create_dir_all(&project_dir).unwrap();

        let provider = StubProvider::new("gemini_stub", move |req: &ProviderRequest| {
            if is_goal_check(req) {
                return goal_check_result();
            }
            std::fs::write(req.cwd.join("package.json"), "{}").unwrap();
            let body = r#"{"summary": "created"}"#.to_string();
            crate::provider::ProviderResult { stdout: body.clone(), raw_output: body, exit_code: Some(0), ..Default::default() }
        });
        let (control_loop, store) = seeded_loop(sandbox.path().to_path_buf(), Box::new(provider)).await;

        let mut state = SupervisorState::new(goal("proj1"), true);
        state.current_task = Some(Task::new("t5", "Create package.json", vec!["package.json exists".to_string()]));
        control_loop.state_manager.init(&state).await.unwrap();

        let exit = control_loop.run(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, LoopExit::Completed);

        let final_state: SupervisorState = serde_json::from_slice(&store.get("supervisor:state").await.unwrap().unwrap()).unwrap();
        assert_eq!(final_state.completed_tasks.len(), 1);
        assert_eq!(final_state.completed_tasks[0].task_id, "t5");
    }
}
