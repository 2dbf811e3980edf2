//! Audit Sink: an append-only structured log per project.
//!
//! Ownership: this module is the only code permitted to write
//! `audit.log.jsonl`. No updates, no deletes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use foreman_db::model::HaltReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub event: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub validation_summary: Option<String>,
    #[serde(default)]
    pub state_diff: Option<StateDiff>,
    #[serde(default)]
    pub prompt_preview: Option<String>,
    #[serde(default)]
    pub response_preview: Option<String>,
    #[serde(default)]
    pub halt_reason: Option<HaltReason>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    pub before: Value,
    pub after: Value,
}

impl AuditEntry {
    pub fn new(event: impl Into<String>) -> Self {
        AuditEntry {
            timestamp: Utc::now(),
            task_id: None,
            event: event.into(),
            event_type: None,
            validation_summary: None,
            state_diff: None,
            prompt_preview: None,
            response_preview: None,
            halt_reason: None,
            metadata: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_halt_reason(mut self, reason: HaltReason) -> Self {
        self.halt_reason = Some(reason);
        self
    }
}

/// Truncate text to a reasonable preview length, at a char boundary.
pub fn truncate_preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub struct AuditSink {
    path: PathBuf,
}

impl AuditSink {
    /// Sink writing to `<sandbox_root>/<project_id>/audit.log.jsonl`.
    pub fn new(sandbox_root: &Path, project_id: &str) -> Self {
        AuditSink { path: sandbox_root.join(project_id).join("audit.log.jsonl") }
    }

    pub async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_creates_file_and_writes_one_line_per_entry() {
        let dir = tempdir().unwrap();
        let sink = AuditSink::new(dir.path(), "proj1");
        sink.append(&AuditEntry::new("task_started").with_task_id("t1")).await.unwrap();
        sink.append(&AuditEntry::new("task_completed").with_task_id("t1")).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("proj1").join("audit.log.jsonl")).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event, "task_started");
    }

    #[test]
    fn truncate_preview_respects_char_boundaries() {
        let s = "hello world";
        assert_eq!(truncate_preview(s, 5), "hello...");
        assert_eq!(truncate_preview(s, 100), "hello world");
    }
}
