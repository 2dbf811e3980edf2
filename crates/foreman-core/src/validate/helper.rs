//! Stage 3 — Helper Agent Verification: a second AI provider invocation
//! synthesizes verification commands, which are then executed read-only
//! in the sandbox under a bounded timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::provider::{Provider, ProviderRequest};

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const HELPER_CALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Upper bound on verification commands executed at once.
const MAX_CONCURRENT_COMMANDS: usize = 4;

/// Shell fragments that indicate a command would mutate the sandbox or
/// reach outside it; refused without execution.
const DESTRUCTIVE_PATTERNS: &[&str] = &["rm ", "rm\t", "mv ", ">", "chmod ", "chown ", "curl -x post", "curl --request post", "git push"];

#[derive(Debug, Deserialize)]
pub struct HelperVerdict {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    #[serde(rename = "verificationCommands", default)]
    pub verification_commands: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

pub struct CommandOutcome {
    pub command: String,
    pub passed: bool,
    pub detail: String,
}

/// Build the helper agent's verification prompt.
pub fn build_helper_prompt(failed_criteria: &[String], response_excerpt: &str, file_tree_summary: &str) -> String {
    let mut out = String::new();
    out.push_str("You are verifying whether unmet acceptance criteria have actually been satisfied.\n\n");
    out.push_str("## Unresolved Criteria\n\n");
    for c in failed_criteria {
        out.push_str(&format!("- {c}\n"));
    }
    out.push_str("\n## Agent Response Excerpt\n\n");
    out.push_str(response_excerpt);
    out.push_str("\n\n## Sandbox File Tree\n\n");
    out.push_str(file_tree_summary);
    out.push_str("\n\nRespond with JSON: {\"isValid\": bool, \"verificationCommands\": string[], \"reasoning\": string}\n");
    out
}

/// Parse the helper's JSON response. Malformed output is treated as
/// `isValid=false` with no commands, forcing the pipeline onward to
/// interrogation rather than silently trusting garbage.
pub fn parse_helper_verdict(raw: &str) -> HelperVerdict {
    serde_json::from_str(raw).unwrap_or(HelperVerdict { is_valid: false, verification_commands: Vec::new(), reasoning: "helper response was not valid JSON".to_string() })
}

fn is_destructive(command: &str) -> bool {
    let lower = command.to_lowercase();
    DESTRUCTIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Execute one read-only verification command in the sandbox, bounded by
/// `COMMAND_TIMEOUT`. Mirrors the concurrent stdout/stderr drain pattern
/// used for invariant checks elsewhere in this codebase.
pub async fn run_verification_command(command: &str, sandbox_dir: &Path) -> CommandOutcome {
    if is_destructive(command) {
        return CommandOutcome { command: command.to_string(), passed: false, detail: "refused: destructive command pattern".to_string() };
    }

    let spawn = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(sandbox_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawn {
        Ok(c) => c,
        Err(e) => return CommandOutcome { command: command.to_string(), passed: false, detail: format!("failed to spawn: {e}") },
    };

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let run = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let _ = tokio::join!(stdout_pipe.read_to_string(&mut stdout), stderr_pipe.read_to_string(&mut stderr));
        let status = child.wait().await;
        (stdout, stderr, status)
    };

    match tokio::time::timeout(COMMAND_TIMEOUT, run).await {
        Ok((stdout, stderr, Ok(status))) => {
            let passed = status.success();
            CommandOutcome { command: command.to_string(), passed, detail: format!("exit={:?} stdout={stdout} stderr={stderr}", status.code()) }
        }
        Ok((_, _, Err(e))) => CommandOutcome { command: command.to_string(), passed: false, detail: format!("wait failed: {e}") },
        Err(_) => CommandOutcome { command: command.to_string(), passed: false, detail: "timed out after 30s".to_string() },
    }
}

/// Run the full helper stage: call the provider, parse its verdict, and
/// either trust it or execute its verification commands.
pub async fn run_helper_stage(
    provider: &dyn Provider,
    request: &ProviderRequest,
    sandbox_dir: &Path,
    strict_helper: bool,
) -> anyhow::Result<(bool, Vec<CommandOutcome>, String)> {
    let result = match tokio::time::timeout(HELPER_CALL_TIMEOUT, provider.execute(request)).await {
        Ok(r) => r?,
        Err(_) => anyhow::bail!("helper agent call timed out after {:?}", HELPER_CALL_TIMEOUT),
    };
    let verdict = parse_helper_verdict(&result.raw_output);

    if verdict.is_valid && verdict.verification_commands.is_empty() {
        if strict_helper {
            return Ok((false, Vec::new(), "strict_helper requires at least one verification command".to_string()));
        }
        return Ok((true, Vec::new(), verdict.reasoning));
    }

    let outcomes: Vec<CommandOutcome> = stream::iter(&verdict.verification_commands)
        .map(|command| run_verification_command(command, sandbox_dir))
        .buffer_unordered(MAX_CONCURRENT_COMMANDS)
        .collect()
        .await;
    let all_passed = !outcomes.is_empty() && outcomes.iter().all(|o| o.passed);
    Ok((all_passed, outcomes, verdict.reasoning))
}
