//! 在线状态内存实现
//!
//! 与 Redis 实现保持同一合并语义：None 字段不覆盖，updated_at 后写为准。

use crate::error::StorageError;
use crate::traits::StatusStore;
use domain::{DeviceStatusRecord, StatusUpdate};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStatusStore {
    statuses: RwLock<HashMap<String, DeviceStatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn upsert_status(&self, update: &StatusUpdate) -> Result<(), StorageError> {
        let mut statuses = self
            .statuses
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match statuses.get_mut(&update.imei) {
            Some(record) => record.merge(update),
            None => {
                statuses.insert(update.imei.clone(), DeviceStatusRecord::from_update(update));
            }
        }
        Ok(())
    }

    async fn get_status(&self, imei: &str) -> Result<Option<DeviceStatusRecord>, StorageError> {
        let statuses = self
            .statuses
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(statuses.get(imei).cloned())
    }

    async fn list_statuses(&self) -> Result<Vec<DeviceStatusRecord>, StorageError> {
        let statuses = self
            .statuses
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(statuses.values().cloned().collect())
    }
}
