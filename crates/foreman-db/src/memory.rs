//! An in-process `KvStore` used by tests and by anything exercising the
//! control loop without a live Redis/DragonflyDB instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::KvStore;

#[derive(Default)]
pub struct MemoryStore {
    kv: Mutex<HashMap<String, Vec<u8>>>,
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.kv.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.kv.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.kv.lock().unwrap().remove(key);
        Ok(())
    }

    async fn lpush(&self, list: &str, value: &[u8]) -> anyhow::Result<()> {
        self.lists.lock().unwrap().entry(list.to_string()).or_default().push_front(value.to_vec());
        Ok(())
    }

    async fn rpop(&self, list: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lists.lock().unwrap().get_mut(list).and_then(|l| l.pop_back()))
    }

    async fn llen(&self, list: &str) -> anyhow::Result<u64> {
        Ok(self.lists.lock().unwrap().get(list).map(|l| l.len() as u64).unwrap_or(0))
    }

    async fn lrange(&self, list: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>> {
        let lists = self.lists.lock().unwrap();
        let Some(l) = lists.get(list) else { return Ok(Vec::new()) };
        let len = l.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 { if i < 0 { (len + i).max(0) } else { i.min(len - 1).max(0) } };
        let start = norm(start);
        let stop = norm(stop);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(l.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect())
    }
}
