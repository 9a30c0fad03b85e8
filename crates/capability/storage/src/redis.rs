//! Redis 热路径存储实现
//!
//! - RedisAllowListStore：`devices:imei:set` 集合成员判定与全量重建
//! - RedisStatusStore：`devices:status` HASH，Lua 脚本服务端按字段合并

use crate::error::StorageError;
use crate::traits::{AllowListStore, StatusStore};
use crate::{ALLOW_LIST_KEY, STATUS_HASH_KEY};
use domain::{DeviceStatusRecord, StatusUpdate};
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::warn;

/// 按字段合并状态 JSON。
///
/// 在服务端完成读改写，允许多个网关实例并发更新同一 IMEI。
const STATUS_MERGE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
local merged
if current then
    merged = cjson.decode(current)
else
    merged = {}
end
local update = cjson.decode(ARGV[2])
for key, value in pairs(update) do
    merged[key] = value
end
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(merged))
return 1
"#;

/// Redis 许可名单存储。
///
/// `lenient` 打开时，Redis 不可用落回最近一次全量重建的进程内快照；
/// 关闭（默认）则向上返回错误，由会话层按拒绝处理。
pub struct RedisAllowListStore {
    client: redis::Client,
    lenient: bool,
    last_known: RwLock<HashSet<String>>,
}

impl RedisAllowListStore {
    pub fn new(client: redis::Client, lenient: bool) -> Self {
        Self {
            client,
            lenient,
            last_known: RwLock::new(HashSet::new()),
        }
    }

    pub fn connect(redis_url: &str, lenient: bool) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client, lenient))
    }
}

#[async_trait::async_trait]
impl AllowListStore for RedisAllowListStore {
    async fn is_authorised(&self, imei: &str) -> Result<bool, StorageError> {
        let result = async {
            let mut connection = self
                .client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(|err| StorageError::new(err.to_string()))?;
            let member: bool = connection
                .sismember(ALLOW_LIST_KEY, imei)
                .await
                .map_err(|err| StorageError::new(err.to_string()))?;
            Ok::<bool, StorageError>(member)
        }
        .await;
        match result {
            Ok(member) => Ok(member),
            Err(err) if self.lenient => {
                warn!(target: "tgw.storage", error = %err, "allow-list lookup failed, using last-known snapshot");
                let snapshot = self
                    .last_known
                    .read()
                    .map_err(|_| StorageError::new("lock failed"))?;
                Ok(snapshot.contains(imei))
            }
            Err(err) => Err(err),
        }
    }

    async fn replace_all(&self, imeis: &[String]) -> Result<(), StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(ALLOW_LIST_KEY).ignore();
        if !imeis.is_empty() {
            pipe.sadd(ALLOW_LIST_KEY, imeis).ignore();
        }
        pipe.query_async::<_, ()>(&mut connection)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let mut snapshot = self
            .last_known
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        *snapshot = imeis.iter().cloned().collect();
        Ok(())
    }
}

/// Redis 在线状态存储。
pub struct RedisStatusStore {
    client: redis::Client,
    merge_script: redis::Script,
}

impl RedisStatusStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            merge_script: redis::Script::new(STATUS_MERGE_SCRIPT),
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl StatusStore for RedisStatusStore {
    async fn upsert_status(&self, update: &StatusUpdate) -> Result<(), StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let data =
            serde_json::to_string(update).map_err(|err| StorageError::new(err.to_string()))?;
        self.merge_script
            .key(STATUS_HASH_KEY)
            .arg(&update.imei)
            .arg(data)
            .invoke_async::<_, ()>(&mut connection)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        Ok(())
    }

    async fn get_status(&self, imei: &str) -> Result<Option<DeviceStatusRecord>, StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let data: Option<String> = connection
            .hget(STATUS_HASH_KEY, imei)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let mut record: DeviceStatusRecord =
            serde_json::from_str(&data).map_err(|err| StorageError::new(err.to_string()))?;
        record.imei = imei.to_string();
        Ok(Some(record))
    }

    async fn list_statuses(&self) -> Result<Vec<DeviceStatusRecord>, StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let entries: HashMap<String, String> = connection
            .hgetall(STATUS_HASH_KEY)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let mut items = Vec::with_capacity(entries.len());
        for (imei, data) in entries {
            let mut record: DeviceStatusRecord = match serde_json::from_str(&data) {
                Ok(record) => record,
                Err(err) => {
                    warn!(target: "tgw.storage", imei = %imei, error = %err, "skipping malformed status entry");
                    continue;
                }
            };
            record.imei = imei;
            items.push(record);
        }
        Ok(items)
    }
}
