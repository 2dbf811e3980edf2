//! A provider backed by an external CLI binary, invoked as a subprocess
//! with the prompt on stdin and stream-json-style output on stdout.
//!
//! Concurrent stdout/stderr draining guarded by a hard timeout is the same
//! shape used elsewhere in this codebase for bounded subprocess execution;
//! it avoids a full pipe deadlocking the child while we wait on the other.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{Provider, ProviderRequest, ProviderResult, Usage};

/// Default hard cap on one provider dispatch (§5: 30 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct CliAdapter {
    provider_name: String,
    binary_path: PathBuf,
    timeout: Duration,
}

impl CliAdapter {
    pub fn new(provider_name: impl Into<String>, binary_path: impl Into<PathBuf>) -> Self {
        CliAdapter { provider_name: provider_name.into(), binary_path: binary_path.into(), timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Provider for CliAdapter {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn execute(&self, request: &ProviderRequest) -> anyhow::Result<ProviderResult> {
        let mut child = Command::new(&self.binary_path)
            .current_dir(&request.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.prompt.as_bytes()).await?;
        }

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let run = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let (stdout_res, stderr_res) = tokio::join!(
                stdout_pipe.read_to_string(&mut stdout),
                stderr_pipe.read_to_string(&mut stderr),
            );
            stdout_res?;
            stderr_res?;
            let status = child.wait().await?;
            anyhow::Ok((stdout, stderr, status.code()))
        };

        let (stdout, stderr, exit_code) = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                child.start_kill().ok();
                anyhow::bail!("provider {} timed out after {:?}", self.provider_name, self.timeout);
            }
        };

        Ok(parse_stream_output(&stdout, &stderr, exit_code))
    }
}

/// Parse line-delimited JSON provider output into a [`ProviderResult`].
///
/// Unrecognized `"type"` values are ignored rather than treated as errors,
/// since providers may emit progress events this port does not model.
pub fn parse_stream_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ProviderResult {
    let mut result = ProviderResult {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
        raw_output: stdout.to_string(),
        ..Default::default()
    };

    for line in stdout.lines() {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else { continue };
        let Some(kind) = value.get("type").and_then(|v| v.as_str()) else { continue };
        match kind {
            "result" => {
                if let Some(session_id) = value.get("session_id").and_then(|v| v.as_str()) {
                    result.session_id = Some(session_id.to_string());
                }
                if let Some(usage) = value.get("usage") {
                    result.usage = Some(Usage {
                        input_tokens: usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                        output_tokens: usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                        cached_tokens: usage.get("cached_tokens").and_then(|v| v.as_u64()),
                    });
                }
            }
            "error" => {
                tracing::debug!(line, "provider emitted an error event");
            }
            _ => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stream_output_extracts_session_and_usage() {
        let stdout = r#"{"type":"assistant","text":"working"}
{"type":"result","session_id":"abc123","usage":{"input_tokens":100,"output_tokens":50}}"#;
        let result = parse_stream_output(stdout, "", Some(0));
        assert_eq!(result.session_id.as_deref(), Some("abc123"));
        let usage = result.usage.unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 50);
    }

    #[test]
    fn parse_stream_output_ignores_unrecognized_lines() {
        let stdout = "not json at all\n{\"type\":\"debug\"}";
        let result = parse_stream_output(stdout, "", Some(0));
        assert!(result.session_id.is_none());
    }
}
