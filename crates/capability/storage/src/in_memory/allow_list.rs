//! 许可名单内存实现

use crate::error::StorageError;
use crate::traits::AllowListStore;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryAllowListStore {
    imeis: RwLock<HashSet<String>>,
}

impl InMemoryAllowListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置若干 IMEI（测试用）。
    pub fn with_imeis<I, S>(imeis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            imeis: RwLock::new(imeis.into_iter().map(Into::into).collect()),
        }
    }

    pub fn insert(&self, imei: impl Into<String>) {
        if let Ok(mut imeis) = self.imeis.write() {
            imeis.insert(imei.into());
        }
    }
}

#[async_trait::async_trait]
impl AllowListStore for InMemoryAllowListStore {
    async fn is_authorised(&self, imei: &str) -> Result<bool, StorageError> {
        let imeis = self
            .imeis
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(imeis.contains(imei))
    }

    async fn replace_all(&self, imeis: &[String]) -> Result<(), StorageError> {
        let mut current = self
            .imeis
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        *current = imeis.iter().cloned().collect();
        Ok(())
    }
}
