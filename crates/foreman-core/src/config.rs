//! A single immutable `Config` value built once at startup and passed by
//! reference everywhere — no ambient globals (§9 design note).

use std::path::PathBuf;
use std::time::Duration;

use foreman_db::KvConfig;

/// Everything the control loop needs that is not part of the persisted
/// state: connection info, sandbox location, and provider/validation
/// tuning knobs, all resolvable from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub kv: KvConfig,
    pub sandbox_root: PathBuf,
    pub provider_priority: Vec<String>,
    pub circuit_breaker_ttl: Duration,
    pub use_ripgrep: bool,
    pub disable_session_reuse: bool,
    /// Tightens the helper-agent trust branch: a zero-command
    /// `isValid=true` helper verdict is demoted to LOW confidence and at
    /// least one verification command is required before acceptance.
    pub strict_helper: bool,
}

impl Config {
    /// CLI-flag overrides take precedence over environment variables,
    /// which take precedence over the defaults below.
    pub fn resolve(sandbox_root: Option<PathBuf>, kv: KvConfig) -> Self {
        let provider_priority = std::env::var("CLI_PROVIDER_PRIORITY")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_else(|| {
                crate::provider::registry::DEFAULT_PRIORITY.iter().map(|s| s.to_string()).collect()
            });

        let circuit_breaker_ttl = std::env::var("CIRCUIT_BREAKER_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(24 * 3600));

        Config {
            kv,
            sandbox_root: sandbox_root
                .or_else(|| std::env::var("SANDBOX_ROOT").ok().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./sandbox")),
            provider_priority,
            circuit_breaker_ttl,
            use_ripgrep: env_bool("USE_RIPGREP", false),
            disable_session_reuse: env_bool("DISABLE_SESSION_REUSE", false),
            strict_helper: env_bool("STRICT_HELPER", false),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).ok().map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn resolve_uses_default_provider_priority_when_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::remove_var("CLI_PROVIDER_PRIORITY") };
        let config = Config::resolve(None, KvConfig::default());
        assert_eq!(config.provider_priority, vec!["gemini", "copilot", "cursor", "codex", "claude", "gemini_stub"]);
    }

    #[test]
    fn resolve_honors_explicit_sandbox_root_over_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("SANDBOX_ROOT", "/env/sandbox") };
        let config = Config::resolve(Some(PathBuf::from("/flag/sandbox")), KvConfig::default());
        assert_eq!(config.sandbox_root, PathBuf::from("/flag/sandbox"));
        unsafe { std::env::remove_var("SANDBOX_ROOT") };
    }

    #[test]
    fn env_bool_parses_common_truthy_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("USE_RIPGREP", "true") };
        assert!(env_bool("USE_RIPGREP", false));
        unsafe { std::env::remove_var("USE_RIPGREP") };
    }
}
