//! Analytics: per-task metrics aggregation appended to `metrics.jsonl`
//! under the project sandbox, mirroring the Audit Sink's append-only model.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::provider::Usage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub provider: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub outcome: String,
}

impl TaskMetrics {
    pub fn new(task_id: impl Into<String>, provider: impl Into<String>, attempts: u32, duration_ms: u64, usage: Option<&Usage>, outcome: impl Into<String>) -> Self {
        TaskMetrics {
            task_id: task_id.into(),
            timestamp: Utc::now(),
            attempts,
            duration_ms,
            provider: provider.into(),
            input_tokens: usage.map(|u| u.input_tokens).unwrap_or(0),
            output_tokens: usage.map(|u| u.output_tokens).unwrap_or(0),
            outcome: outcome.into(),
        }
    }
}

pub struct AnalyticsSink {
    path: PathBuf,
}

impl AnalyticsSink {
    pub fn new(sandbox_root: &Path, project_id: &str) -> Self {
        AnalyticsSink { path: sandbox_root.join(project_id).join("metrics.jsonl") }
    }

    pub async fn record(&self, metrics: &TaskMetrics) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(metrics)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Summary statistics over a set of recorded metrics, used by `foreman
/// metrics` to print an aggregate view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub total_tasks: usize,
    pub total_attempts: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

pub fn summarize(entries: &[TaskMetrics]) -> MetricsSummary {
    let mut summary = MetricsSummary::default();
    for e in entries {
        summary.total_tasks += 1;
        summary.total_attempts += e.attempts;
        summary.total_input_tokens += e.input_tokens;
        summary.total_output_tokens += e.output_tokens;
        summary.total_duration_ms += e.duration_ms;
    }
    summary
}

pub async fn read_all(sandbox_root: &Path, project_id: &str) -> anyhow::Result<Vec<TaskMetrics>> {
    let path = sandbox_root.join(project_id).join("metrics.jsonl");
    if !tokio::fs::try_exists(&path).await? {
        return Ok(Vec::new());
    }
    let contents = tokio::fs::read_to_string(&path).await?;
    Ok(contents.lines().filter(|l| !l.trim().is_empty()).filter_map(|l| serde_json::from_str(l).ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn record_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let sink = AnalyticsSink::new(dir.path(), "proj1");
        sink.record(&TaskMetrics::new("t1", "gemini", 1, 1200, None, "completed")).await.unwrap();
        sink.record(&TaskMetrics::new("t2", "gemini", 2, 3400, Some(&Usage { input_tokens: 100, output_tokens: 50, cached_tokens: None }), "blocked")).await.unwrap();

        let entries = read_all(dir.path(), "proj1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].input_tokens, 100);
    }

    #[test]
    fn summarize_aggregates_across_entries() {
        let entries = vec![
            TaskMetrics::new("t1", "gemini", 1, 1000, None, "completed"),
            TaskMetrics::new("t2", "gemini", 2, 2000, Some(&Usage { input_tokens: 10, output_tokens: 20, cached_tokens: None }), "blocked"),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.total_attempts, 3);
        assert_eq!(summary.total_duration_ms, 3000);
        assert_eq!(summary.total_input_tokens, 10);
    }

    #[tokio::test]
    async fn read_all_on_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let entries = read_all(dir.path(), "nonexistent").await.unwrap();
        assert!(entries.is_empty());
    }
}
