//! Data model for the supervisor state blob and its nested records.
//!
//! Every type here is plain `serde` (de)serializable — the KV store treats
//! the whole tree as one JSON blob under one key, so there is no row-level
//! mapping layer the way a relational schema would need.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level status of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorStatus {
    Running,
    Halted,
    Blocked,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid supervisor status: {0:?}")]
pub struct SupervisorStatusParseError(String);

impl fmt::Display for SupervisorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorStatus::Running => "running",
            SupervisorStatus::Halted => "halted",
            SupervisorStatus::Blocked => "blocked",
            SupervisorStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for SupervisorStatus {
    type Err = SupervisorStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SupervisorStatus::Running),
            "halted" => Ok(SupervisorStatus::Halted),
            "blocked" => Ok(SupervisorStatus::Blocked),
            "completed" => Ok(SupervisorStatus::Completed),
            other => Err(SupervisorStatusParseError(other.to_string())),
        }
    }
}

/// Why the loop halted, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Blocked,
    OutputFormatInvalid,
    ProviderCircuitBroken,
    InvariantViolation,
    ResourceExhaustedFinal,
    TaskListExhaustedGoalIncomplete,
    OperatorRequested,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HaltReason::Blocked => "BLOCKED",
            HaltReason::OutputFormatInvalid => "OUTPUT_FORMAT_INVALID",
            HaltReason::ProviderCircuitBroken => "PROVIDER_CIRCUIT_BROKEN",
            HaltReason::InvariantViolation => "INVARIANT_VIOLATION",
            HaltReason::ResourceExhaustedFinal => "RESOURCE_EXHAUSTED_FINAL",
            HaltReason::TaskListExhaustedGoalIncomplete => "TASK_LIST_EXHAUSTED_GOAL_INCOMPLETE",
            HaltReason::OperatorRequested => "OPERATOR_REQUESTED",
        };
        f.write_str(s)
    }
}

/// Task type, auto-detected from keywords when the operator omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coding,
    Behavioral,
    Configuration,
    Testing,
    Documentation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task type: {0:?}")]
pub struct TaskTypeParseError(String);

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Coding => "coding",
            TaskType::Behavioral => "behavioral",
            TaskType::Configuration => "configuration",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskType {
    type Err = TaskTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coding" => Ok(TaskType::Coding),
            "behavioral" => Ok(TaskType::Behavioral),
            "configuration" => Ok(TaskType::Configuration),
            "testing" => Ok(TaskType::Testing),
            "documentation" => Ok(TaskType::Documentation),
            other => Err(TaskTypeParseError(other.to_string())),
        }
    }
}

impl TaskType {
    /// Infer a task type from free-text intent/instructions when the
    /// operator did not set one explicitly.
    pub fn detect(intent: &str, instructions: &str) -> TaskType {
        let haystack = format!("{intent} {instructions}").to_lowercase();
        const CONFIG_KEYWORDS: &[&str] = &["config", ".toml", ".yaml", ".yml", "env var", "environment variable"];
        const TEST_KEYWORDS: &[&str] = &["test", "spec", "assert"];
        const DOC_KEYWORDS: &[&str] = &["document", "readme", "comment", "docstring"];
        const BEHAVIORAL_KEYWORDS: &[&str] = &["greet", "explain", "describe", "say hello", "respond to"];

        if CONFIG_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            TaskType::Configuration
        } else if TEST_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            TaskType::Testing
        } else if DOC_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            TaskType::Documentation
        } else if BEHAVIORAL_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            TaskType::Behavioral
        } else {
            TaskType::Coding
        }
    }
}

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Retry budget for a task. Default is one retry (two attempts total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_retries: 1 }
    }
}

/// Optional task-level metadata: feature grouping and a pinned session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// The atomic unit of operator intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub intent: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub agent_mode: Option<String>,
    #[serde(default)]
    pub instructions: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    pub status: TaskStatus,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub required_artifacts: Vec<String>,
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default)]
    pub tests_required: bool,
    #[serde(default)]
    pub meta: TaskMeta,
}

impl Task {
    /// Build a task from operator-supplied fields, auto-detecting
    /// `task_type` when absent and defaulting `status` to pending.
    pub fn new(task_id: impl Into<String>, intent: impl Into<String>, acceptance_criteria: Vec<String>) -> Self {
        let intent = intent.into();
        let task_type = TaskType::detect(&intent, "");
        Task {
            task_id: task_id.into(),
            intent,
            task_type,
            tool: None,
            agent_mode: None,
            instructions: String::new(),
            acceptance_criteria,
            retry_policy: RetryPolicy::default(),
            status: TaskStatus::Pending,
            working_directory: None,
            required_artifacts: Vec::new(),
            test_command: None,
            tests_required: false,
            meta: TaskMeta::default(),
        }
    }

    /// The feature_id this task's provider session should be grouped
    /// under: `task.meta.feature` if set, else `<project_id>:<task_type>`.
    pub fn feature_id(&self, project_id: &str) -> String {
        match &self.meta.feature {
            Some(f) => f.clone(),
            None => format!("{project_id}:{}", self.task_type),
        }
    }
}

/// A live provider conversation handle for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub provider: String,
    pub feature_id: String,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub context_limit: Option<u64>,
}

impl SessionInfo {
    /// Max consecutive errors a session tolerates before being discarded.
    pub const MAX_ERROR_COUNT: u32 = 5;

    /// Whether this session may still be reused.
    pub fn is_reusable(&self) -> bool {
        if self.error_count >= Self::MAX_ERROR_COUNT {
            return false;
        }
        if let Some(cap) = self.context_limit {
            if self.total_tokens >= cap {
                return false;
            }
        }
        true
    }
}

/// Provider-level error classification used by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Auth,
    RateLimit,
    ResourceExhausted,
    InvalidModel,
    Unknown,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Auth => "AUTH",
            ErrorClass::RateLimit => "RATE_LIMIT",
            ErrorClass::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorClass::InvalidModel => "INVALID_MODEL",
            ErrorClass::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A tripped per-provider breaker, stored under its own key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub provider: String,
    pub triggered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub error_type: ErrorClass,
}

impl CircuitBreakerRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Confidence level attached to a validation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Uncertain,
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
            Confidence::Uncertain => "UNCERTAIN",
        };
        f.write_str(s)
    }
}

/// Outcome of the validation pipeline for one task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub confidence: Confidence,
    pub reason: String,
    #[serde(default)]
    pub rules_passed: Vec<String>,
    #[serde(default)]
    pub rules_failed: Vec<String>,
    #[serde(default)]
    pub failed_criteria: Vec<String>,
    #[serde(default)]
    pub uncertain_criteria: Vec<String>,
}

impl ValidationReport {
    pub fn pass(confidence: Confidence, reason: impl Into<String>) -> Self {
        ValidationReport {
            valid: true,
            confidence,
            reason: reason.into(),
            rules_passed: Vec::new(),
            rules_failed: Vec::new(),
            failed_criteria: Vec::new(),
            uncertain_criteria: Vec::new(),
        }
    }

    pub fn fail(confidence: Confidence, reason: impl Into<String>, failed_criteria: Vec<String>) -> Self {
        ValidationReport {
            valid: false,
            confidence,
            reason: reason.into(),
            rules_passed: Vec::new(),
            rules_failed: Vec::new(),
            failed_criteria,
            uncertain_criteria: Vec::new(),
        }
    }
}

/// Per-task scratchpad, replacing dynamically-named `retry_count_<id>` keys
/// with a single structured record per task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub repeated_error_count: u32,
    #[serde(default)]
    pub interrogation_done: bool,
    #[serde(default)]
    pub resource_exhausted: Option<ResourceExhaustedState>,
}

/// Backoff bookkeeping for a task that tripped RESOURCE_EXHAUSTED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceExhaustedState {
    pub backoff_index: usize,
    pub retry_at: DateTime<Utc>,
}

/// The fixed exponential backoff sequence for resource exhaustion.
pub const RESOURCE_EXHAUSTED_BACKOFF_SECONDS: &[i64] = &[60, 300, 1200, 3600, 7200];

/// A task that completed successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTask {
    pub task_id: String,
    pub completed_at: DateTime<Utc>,
    pub validation_report: ValidationReport,
    pub iteration: u64,
}

/// A task that exhausted its retries/interrogation without success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task: Task,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub validation_report: Option<ValidationReport>,
}

/// Operator-authored overall objective. The system never synthesizes one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub completed: bool,
}

/// Bookkeeping about the task queue itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMeta {
    #[serde(default)]
    pub exhausted: bool,
}

/// The single supervisor state blob, persisted atomically under one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub status: SupervisorStatus,
    #[serde(default)]
    pub iteration: u64,
    pub goal: Goal,
    #[serde(default)]
    pub queue_meta: QueueMeta,
    #[serde(default)]
    pub current_task: Option<Task>,
    #[serde(default)]
    pub completed_tasks: Vec<CompletedTask>,
    #[serde(default)]
    pub blocked_tasks: Vec<BlockedTask>,
    #[serde(default)]
    pub last_validation_report: Option<ValidationReport>,
    #[serde(default)]
    pub active_sessions: BTreeMap<String, SessionInfo>,
    #[serde(default)]
    pub task_progress: BTreeMap<String, TaskProgress>,
    #[serde(default)]
    pub halt_reason: Option<HaltReason>,
    #[serde(default)]
    pub halt_details: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl SupervisorState {
    /// A freshly initialized state blob: RUNNING (or HALTED if the operator
    /// asked for MANUAL mode), empty queue bookkeeping, no history.
    pub fn new(goal: Goal, start_running: bool) -> Self {
        SupervisorState {
            status: if start_running { SupervisorStatus::Running } else { SupervisorStatus::Halted },
            iteration: 0,
            goal,
            queue_meta: QueueMeta::default(),
            current_task: None,
            completed_tasks: Vec::new(),
            blocked_tasks: Vec::new(),
            last_validation_report: None,
            active_sessions: BTreeMap::new(),
            task_progress: BTreeMap::new(),
            halt_reason: None,
            halt_details: None,
            last_updated: Utc::now(),
        }
    }

    /// Deep-copy the state (the whole tree is owned, so this is a clone,
    /// but kept as a named operation to mirror the State Manager contract).
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Validate structural invariants. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.goal.description.is_empty() && !matches!(self.status, SupervisorStatus::Halted) {
            return Err("goal.description must not be empty while running".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.completed_tasks {
            if !seen.insert(t.task_id.clone()) {
                return Err(format!("duplicate task_id {} in completed_tasks", t.task_id));
            }
        }
        for t in &self.blocked_tasks {
            if !seen.insert(t.task.task_id.clone()) {
                return Err(format!("duplicate task_id {} across completed/blocked", t.task.task_id));
            }
        }
        for (feature, session) in &self.active_sessions {
            if session.error_count >= SessionInfo::MAX_ERROR_COUNT {
                return Err(format!("session for feature {feature} exceeds max error count"));
            }
        }
        if matches!(self.status, SupervisorStatus::Running) && self.current_task.is_none() {
            // Valid only transiently during LOADING/DISPATCHING; the State
            // Manager does not attempt to detect that window here.
        }
        Ok(())
    }
}
