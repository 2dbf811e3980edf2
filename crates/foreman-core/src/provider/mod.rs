//! The Provider port: dispatch a prompt to one AI coding agent and get back
//! raw plus parsed output. Transport is not prescribed; CLI subprocess is
//! the default (see [`cli_adapter`]).

pub mod cli_adapter;
pub mod registry;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token usage reported by a provider, when it reports one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: Option<u64>,
}

/// Provider-reported status embedded in its own structured output, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Blocked,
    AmbiguityDetected,
}

/// The result of one provider invocation.
#[derive(Debug, Clone, Default)]
pub struct ProviderResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub raw_output: String,
    pub session_id: Option<String>,
    pub usage: Option<Usage>,
    pub status: Option<ProviderStatus>,
}

/// One request to a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub cwd: std::path::PathBuf,
    pub agent_mode: Option<String>,
    pub session_id: Option<String>,
    pub feature_id: Option<String>,
}

/// A single AI coding agent backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in priority lists and circuit breaker keys.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ProviderRequest) -> anyhow::Result<ProviderResult>;
}

#[cfg(test)]
mod object_safety {
    use super::Provider;
    const _: Option<Box<dyn Provider>> = None;
}
