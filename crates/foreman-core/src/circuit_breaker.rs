//! Circuit Breaker: a per-provider TTL failure latch, plus the provider
//! selection logic that filters the static priority list by it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foreman_db::model::{CircuitBreakerRecord, ErrorClass};
use foreman_db::{KvConfig, KvStore};

pub struct CircuitBreaker {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        CircuitBreaker { store, ttl }
    }

    /// Trip the breaker for a provider. AUTH, RATE_LIMIT, and repeated
    /// UNKNOWN (the caller pre-filters to >=3 consecutive) trip it.
    pub async fn trip(&self, config: &KvConfig, provider: &str, error_type: ErrorClass) -> anyhow::Result<()> {
        let now = Utc::now();
        let record = CircuitBreakerRecord {
            provider: provider.to_string(),
            triggered_at: now,
            expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(24)),
            error_type,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.store.set(&config.breaker_key(provider), &bytes).await
    }

    /// Read the breaker record for a provider, purging it if expired.
    pub async fn record_for(&self, config: &KvConfig, provider: &str) -> anyhow::Result<Option<CircuitBreakerRecord>> {
        let key = config.breaker_key(provider);
        let Some(bytes) = self.store.get(&key).await? else { return Ok(None) };
        let record: CircuitBreakerRecord = serde_json::from_slice(&bytes)?;
        if record.is_expired(Utc::now()) {
            self.store.del(&key).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub async fn is_eligible(&self, config: &KvConfig, provider: &str) -> anyhow::Result<bool> {
        Ok(self.record_for(config, provider).await?.is_none())
    }

    /// Filter the priority list down to eligible providers, in order,
    /// further narrowed by task/operator preference when given.
    pub async fn select(&self, config: &KvConfig, priority: &[String], preferred: Option<&str>) -> anyhow::Result<Vec<String>> {
        let mut ordered: Vec<String> = match preferred {
            Some(pref) if priority.iter().any(|p| p == pref) => {
                let mut v = vec![pref.to_string()];
                v.extend(priority.iter().filter(|p| p.as_str() != pref).cloned());
                v
            }
            _ => priority.to_vec(),
        };
        ordered.retain(|_| true);

        let mut eligible = Vec::new();
        for provider in ordered.drain(..) {
            if self.is_eligible(config, &provider).await? {
                eligible.push(provider);
            }
        }
        Ok(eligible)
    }
}

/// Whether an error class trips the breaker outright (vs. triggering
/// task-level backoff for RESOURCE_EXHAUSTED).
pub fn trips_breaker(class: ErrorClass, consecutive_unknown: u32) -> bool {
    match class {
        ErrorClass::Auth | ErrorClass::RateLimit => true,
        ErrorClass::Unknown => consecutive_unknown >= 3,
        ErrorClass::ResourceExhausted | ErrorClass::InvalidModel => false,
    }
}
