//! Environment-derived configuration for the KV store connection and the
//! well-known key/list names it addresses.

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_STATE_KEY: &str = "supervisor:state";
const DEFAULT_QUEUE_NAME: &str = "tasks";

/// Connection and key-naming configuration for the KV + list store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
    pub queue_db: u8,
    pub state_db: u8,
    pub state_key: String,
    pub queue_name: String,
}

impl KvConfig {
    /// Build from `REDIS_HOST`, `REDIS_PORT`, `STATE_KEY`, `QUEUE_NAME`,
    /// `QUEUE_DB`, `STATE_DB`, falling back to defaults when unset.
    pub fn from_env() -> Self {
        KvConfig {
            host: std::env::var("REDIS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: std::env::var("REDIS_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT),
            queue_db: std::env::var("QUEUE_DB").ok().and_then(|v| v.parse().ok()).unwrap_or(0),
            state_db: std::env::var("STATE_DB").ok().and_then(|v| v.parse().ok()).unwrap_or(0),
            state_key: std::env::var("STATE_KEY").unwrap_or_else(|_| DEFAULT_STATE_KEY.to_string()),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or_else(|_| DEFAULT_QUEUE_NAME.to_string()),
        }
    }

    /// Resolve with CLI-flag overrides taking precedence over the
    /// environment-derived defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        host: Option<String>,
        port: Option<u16>,
        state_key: Option<String>,
        queue_name: Option<String>,
        queue_db: Option<u8>,
        state_db: Option<u8>,
    ) -> Self {
        let env = Self::from_env();
        KvConfig {
            host: host.unwrap_or(env.host),
            port: port.unwrap_or(env.port),
            queue_db: queue_db.unwrap_or(env.queue_db),
            state_db: state_db.unwrap_or(env.state_db),
            state_key: state_key.unwrap_or(env.state_key),
            queue_name: queue_name.unwrap_or(env.queue_name),
        }
    }

    /// The `redis://` connection URL for the state database.
    pub fn state_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.state_db)
    }

    /// The `redis://` connection URL for the queue database.
    pub fn queue_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.queue_db)
    }

    /// The per-provider circuit breaker key.
    pub fn breaker_key(&self, provider: &str) -> String {
        format!("circuit_breaker:{provider}")
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
