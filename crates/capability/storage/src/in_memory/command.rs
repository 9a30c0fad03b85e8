//! 命令队列内存实现
//!
//! 模拟 SQL 行 + Redis 列表的双存储：`rows` 对应权威行（ack 时删除），
//! `queues` 对应派发镜像（pop/push_front）。

use crate::error::StorageError;
use crate::traits::CommandQueue;
use domain::CommandEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCommandQueue {
    queues: RwLock<HashMap<String, VecDeque<CommandEntry>>>,
    rows: RwLock<HashMap<i64, CommandEntry>>,
    next_id: AtomicI64,
}

impl InMemoryCommandQueue {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// 权威行是否仍存在（测试断言送达语义用）。
    pub fn sql_row_exists(&self, id: i64) -> bool {
        self.rows
            .read()
            .map(|rows| rows.contains_key(&id))
            .unwrap_or(false)
    }

    /// 镜像队列当前长度。
    pub fn queue_len(&self, imei: &str) -> usize {
        self.queues
            .read()
            .map(|queues| queues.get(imei).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl CommandQueue for InMemoryCommandQueue {
    async fn enqueue(&self, imei: &str, command: &str) -> Result<CommandEntry, StorageError> {
        let entry = CommandEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            command: command.to_string(),
            created_at_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
        };
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        rows.insert(entry.id, entry.clone());
        queues
            .entry(imei.to_string())
            .or_default()
            .push_back(entry.clone());
        Ok(entry)
    }

    async fn pop(&self, imei: &str) -> Result<Option<CommandEntry>, StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(queues.get_mut(imei).and_then(VecDeque::pop_front))
    }

    async fn push_front(&self, imei: &str, entry: &CommandEntry) -> Result<(), StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        queues
            .entry(imei.to_string())
            .or_default()
            .push_front(entry.clone());
        Ok(())
    }

    async fn ack(&self, id: i64) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        rows.remove(&id);
        Ok(())
    }
}
