//! The KV + List store port: a durable map of state blobs and FIFO lists.
//!
//! This is the one dependency boundary the control loop cannot reason past.
//! Everything above it only ever sees bytes in, bytes out.

use async_trait::async_trait;

/// Minimal KV + list operations the rest of the system needs.
///
/// All values are opaque UTF-8 JSON bytes; this trait does not know about
/// `SupervisorState` or any other domain type.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;
    async fn lpush(&self, list: &str, value: &[u8]) -> anyhow::Result<()>;
    async fn rpop(&self, list: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn llen(&self, list: &str) -> anyhow::Result<u64>;
    async fn lrange(&self, list: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>>;
}
