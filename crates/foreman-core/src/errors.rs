//! Error taxonomy for the control loop.
//!
//! Callers that need to branch on *kind* match on [`ForemanError`]; callers
//! that only need to propagate use `anyhow::Result` with `.context()`, the
//! same split the rest of this codebase uses throughout.

use foreman_db::model::ErrorClass;

/// A typed error kind the control loop must react to specifically.
#[derive(Debug, thiserror::Error)]
pub enum ForemanError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("transient I/O failure after {attempts} attempts: {source}")]
    TransientIo { attempts: u32, #[source] source: anyhow::Error },

    #[error("provider {provider} failed: {class}")]
    ProviderFailure { provider: String, class: ErrorClass },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ForemanError {
    /// Whether this error kind must stop the control loop outright.
    pub fn is_critical(&self) -> bool {
        matches!(self, ForemanError::InvariantViolation(_))
    }
}
