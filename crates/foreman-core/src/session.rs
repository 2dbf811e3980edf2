//! Session Resolver: maps (provider, feature_id) to a reusable session_id
//! under context-limit and error-count policy.

use foreman_db::model::{SessionInfo, SupervisorState};

/// Look up whether an existing session can be reused for this feature.
/// Returns `None` when the provider should open a fresh session, either
/// because none is reusable or because `disable_session_reuse` forces a
/// fresh session on every dispatch.
pub fn resolve_session(state: &SupervisorState, feature_id: &str, disable_session_reuse: bool) -> Option<String> {
    if disable_session_reuse {
        return None;
    }
    state.active_sessions.get(feature_id).filter(|s| s.is_reusable()).map(|s| s.session_id.clone())
}

/// Record a newly created or reused session back into state after a
/// provider call completes.
pub fn record_session(state: &mut SupervisorState, feature_id: &str, mut session: SessionInfo) {
    session.feature_id = feature_id.to_string();
    state.active_sessions.insert(feature_id.to_string(), session);
}

/// Feature_id for the helper agent's dedicated per-project session,
/// kept separate from ordinary task sessions so its context never mixes
/// with task-generation conversations.
pub fn helper_feature_id(project_id: &str) -> String {
    format!("helper:validation:{project_id}")
}
