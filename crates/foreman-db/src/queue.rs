//! The Task Queue: an LPUSH/RPOP FIFO with crash-safe dequeue semantics.
//!
//! Ownership: this module is the only code permitted to touch the list key.

use std::sync::Arc;

use crate::model::Task;
use crate::store::KvStore;

pub struct TaskQueue {
    store: Arc<dyn KvStore>,
    list_name: String,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn KvStore>, list_name: impl Into<String>) -> Self {
        TaskQueue { store, list_name: list_name.into() }
    }

    /// Push one task onto the queue (tail of the FIFO, via LPUSH).
    pub async fn enqueue(&self, task: &Task) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(task)?;
        self.store.lpush(&self.list_name, &bytes).await
    }

    /// Push several tasks preserving relative order.
    pub async fn enqueue_many(&self, tasks: &[Task]) -> anyhow::Result<()> {
        for task in tasks {
            self.enqueue(task).await?;
        }
        Ok(())
    }

    /// Pop the oldest task, if any.
    pub async fn dequeue(&self) -> anyhow::Result<Option<Task>> {
        let Some(bytes) = self.store.rpop(&self.list_name).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn len(&self) -> anyhow::Result<u64> {
        self.store.llen(&self.list_name).await
    }

    pub async fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Peek at up to `limit` queued tasks without removing them, oldest
    /// first, for `status`-style reporting.
    pub async fn peek(&self, limit: i64) -> anyhow::Result<Vec<Task>> {
        let raw = self.store.lrange(&self.list_name, -limit, -1).await?;
        raw.into_iter().rev().map(|bytes| Ok(serde_json::from_slice(&bytes)?)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn task(id: &str) -> Task {
        Task::new(id, "do a thing", vec!["criterion".into()])
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_returns_same_task_fifo() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        queue.enqueue(&task("t1")).await.unwrap();
        queue.enqueue(&task("t2")).await.unwrap();
        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.task_id, "t1");
        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.task_id, "t2");
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_is_none() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_many_preserves_order() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        queue.enqueue_many(&[task("a"), task("b"), task("c")]).await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().unwrap().task_id, "a");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().task_id, "b");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().task_id, "c");
    }

    #[tokio::test]
    async fn len_and_is_empty_track_queue_size() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), "tasks");
        assert!(queue.is_empty().await.unwrap());
        queue.enqueue(&task("t1")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(!queue.is_empty().await.unwrap());
    }
}
