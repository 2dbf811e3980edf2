//! State Manager: the exclusive owner of the supervisor state blob.
//!
//! Persist is atomic at the KV-store boundary — the whole serialized blob
//! replaces the previous version in one `Set` call. There is no partial
//! update API; callers load, mutate the in-memory copy, and persist.

use std::sync::Arc;

use foreman_db::model::SupervisorState;
use foreman_db::KvStore;

use crate::errors::ForemanError;

pub struct StateManager {
    store: Arc<dyn KvStore>,
    state_key: String,
}

impl StateManager {
    pub fn new(store: Arc<dyn KvStore>, state_key: impl Into<String>) -> Self {
        StateManager { store, state_key: state_key.into() }
    }

    /// Load the last fully persisted blob. `Ok(None)` means
    /// `init-state` has not been run yet.
    pub async fn load(&self) -> anyhow::Result<Option<SupervisorState>> {
        let Some(bytes) = self.store.get(&self.state_key).await? else { return Ok(None) };
        let state: SupervisorState = serde_json::from_slice(&bytes)?;
        Ok(Some(state))
    }

    /// Load, failing loudly if `init-state` was never run.
    pub async fn load_required(&self) -> anyhow::Result<SupervisorState> {
        self.load().await?.ok_or_else(|| ForemanError::InvariantViolation("state not initialized".to_string()).into())
    }

    /// Validate then atomically persist the whole state blob.
    pub async fn persist(&self, state: &SupervisorState) -> anyhow::Result<()> {
        self.validate(state)?;
        let bytes = serde_json::to_vec(state)?;
        self.store.set(&self.state_key, &bytes).await
    }

    /// Validate structural invariants without persisting.
    pub fn validate(&self, state: &SupervisorState) -> Result<(), ForemanError> {
        state.validate().map_err(ForemanError::InvariantViolation)
    }

    /// Initialize state; fails if a blob already exists under this key.
    pub async fn init(&self, state: &SupervisorState) -> anyhow::Result<()> {
        if self.store.get(&self.state_key).await?.is_some() {
            anyhow::bail!("state already initialized under key {}", self.state_key);
        }
        self.persist(state).await
    }

    pub fn deep_copy(&self, state: &SupervisorState) -> SupervisorState {
        state.deep_copy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_db::memory::MemoryStore;
    use foreman_db::model::Goal;

    fn fresh_state() -> SupervisorState {
        SupervisorState::new(Goal { description: "ship it".into(), project_id: "proj".into(), completed: false }, true)
    }

    #[tokio::test]
    async fn load_on_empty_store_returns_none() {
        let manager = StateManager::new(Arc::new(MemoryStore::new()), "supervisor:state");
        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn init_then_load_round_trips() {
        let manager = StateManager::new(Arc::new(MemoryStore::new()), "supervisor:state");
        manager.init(&fresh_state()).await.unwrap();
        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.goal.description, "ship it");
    }

    #[tokio::test]
    async fn init_twice_fails() {
        let manager = StateManager::new(Arc::new(MemoryStore::new()), "supervisor:state");
        manager.init(&fresh_state()).await.unwrap();
        assert!(manager.init(&fresh_state()).await.is_err());
    }

    #[tokio::test]
    async fn persist_then_load_is_a_no_op_on_observable_state() {
        let manager = StateManager::new(Arc::new(MemoryStore::new()), "supervisor:state");
        let state = fresh_state();
        manager.persist(&state).await.unwrap();
        let loaded = manager.load().await.unwrap().unwrap();
        manager.persist(&loaded).await.unwrap();
        let reloaded = manager.load().await.unwrap().unwrap();
        assert_eq!(serde_json::to_string(&loaded).unwrap(), serde_json::to_string(&reloaded).unwrap());
    }

    #[tokio::test]
    async fn persist_rejects_invariant_violation() {
        let manager = StateManager::new(Arc::new(MemoryStore::new()), "supervisor:state");
        let mut state = fresh_state();
        state.goal.description.clear();
        assert!(manager.persist(&state).await.is_err());
    }
}
