//! A registry mapping provider names to implementations, and the static
//! priority list used for provider selection.

use std::collections::HashMap;
use std::fmt;

use super::Provider;

/// Default provider priority order, filtered at selection time by task
/// preference, operator preference, and circuit-breaker state.
pub const DEFAULT_PRIORITY: &[&str] = &["gemini", "copilot", "cursor", "codex", "claude", "gemini_stub"];

pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.providers.keys().collect::<Vec<_>>()).finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry { providers: HashMap::new() }
    }

    pub fn register(&mut self, provider: Box<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Provider> {
        self.providers.get(name).map(|p| p.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderRequest, ProviderResult};
    use async_trait::async_trait;

    struct FakeProvider {
        name: &'static str,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, _request: &ProviderRequest) -> anyhow::Result<ProviderResult> {
            Ok(ProviderResult::default())
        }
    }

    #[test]
    fn register_then_get_by_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(FakeProvider { name: "gemini" }));
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("cursor").is_none());
    }

    #[test]
    fn len_and_is_empty_track_registration() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(FakeProvider { name: "gemini" }));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn list_returns_all_registered_names() {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(FakeProvider { name: "gemini" }));
        registry.register(Box::new(FakeProvider { name: "cursor" }));
        let mut names = registry.list();
        names.sort();
        assert_eq!(names, vec!["cursor", "gemini"]);
    }
}
