//! Redis/DragonflyDB-backed `KvStore`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::KvStore;

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn lpush(&self, list: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(list, value).await?;
        Ok(())
    }

    async fn rpop(&self, list: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.rpop(list, None).await?;
        Ok(value)
    }

    async fn llen(&self, list: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(list).await?;
        Ok(len)
    }

    async fn lrange(&self, list: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let values: Vec<Vec<u8>> = conn.lrange(list, start as isize, stop as isize).await?;
        Ok(values)
    }
}
