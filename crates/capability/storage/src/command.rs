//! 下行命令队列（生产实现）
//!
//! SQL `command_queue` 表为权威存储，Redis 列表 `devices:commands:<imei>`
//! 是派发用镜像。入队是事务对：insert 取得自增 id，RPUSH 失败即回滚。
//! 出队端约定见 [`crate::traits::CommandQueue`]。

use crate::command_queue_key;
use crate::error::StorageError;
use crate::traits::CommandQueue;
use domain::CommandEntry;
use redis::AsyncCommands;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

pub struct DurableCommandQueue {
    pool: PgPool,
    client: redis::Client,
}

impl DurableCommandQueue {
    pub fn new(pool: PgPool, client: redis::Client) -> Self {
        Self { pool, client }
    }

    pub fn connect(pool: PgPool, redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(pool, client))
    }

    /// SQL 中全部待投递命令，按 IMEI 分组、created_at 升序。
    pub async fn pending_by_imei(
        &self,
    ) -> Result<BTreeMap<String, Vec<CommandEntry>>, StorageError> {
        let rows = sqlx::query(
            "select id, imei, command, \
             (extract(epoch from created_at) * 1000)::bigint as created_at_ms \
             from command_queue \
             order by created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut pending: BTreeMap<String, Vec<CommandEntry>> = BTreeMap::new();
        for row in rows {
            let imei: String = row.try_get("imei")?;
            pending.entry(imei).or_default().push(CommandEntry {
                id: row.try_get("id")?,
                command: row.try_get("command")?,
                created_at_ms: row.try_get("created_at_ms")?,
            });
        }
        Ok(pending)
    }

    /// 按 SQL 内容重建 Redis 镜像（后台同步用）。
    ///
    /// 只清理 SQL 中出现的 IMEI 的列表，随后按序 RPUSH。
    pub async fn rebuild(
        &self,
        pending: &BTreeMap<String, Vec<CommandEntry>>,
    ) -> Result<(), StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        for (imei, entries) in pending {
            let key = command_queue_key(imei);
            let mut pipe = redis::pipe();
            pipe.atomic().del(&key).ignore();
            for entry in entries {
                let payload = serde_json::to_string(entry)
                    .map_err(|err| StorageError::new(err.to_string()))?;
                pipe.rpush(&key, payload).ignore();
            }
            pipe.query_async::<_, ()>(&mut connection)
                .await
                .map_err(|err| StorageError::new(err.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CommandQueue for DurableCommandQueue {
    async fn enqueue(&self, imei: &str, command: &str) -> Result<CommandEntry, StorageError> {
        let created_at_ms = epoch_ms();
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "insert into command_queue (imei, command, created_at, sent) \
             values ($1, $2, to_timestamp($3 / 1000.0), false) \
             returning id",
        )
        .bind(imei)
        .bind(command)
        .bind(created_at_ms as f64)
        .fetch_one(&mut *tx)
        .await?;
        let entry = CommandEntry {
            id: row.try_get("id")?,
            command: command.to_string(),
            created_at_ms,
        };
        let payload =
            serde_json::to_string(&entry).map_err(|err| StorageError::new(err.to_string()))?;

        let push = async {
            let mut connection = self
                .client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(|err| StorageError::new(err.to_string()))?;
            connection
                .rpush::<_, _, ()>(command_queue_key(imei), payload)
                .await
                .map_err(|err| StorageError::new(err.to_string()))
        }
        .await;
        match push {
            Ok(()) => {
                tx.commit().await?;
                Ok(entry)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    async fn pop(&self, imei: &str) -> Result<Option<CommandEntry>, StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let data: Option<String> = connection
            .lpop(command_queue_key(imei), None)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let entry =
            serde_json::from_str(&data).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Some(entry))
    }

    async fn push_front(&self, imei: &str, entry: &CommandEntry) -> Result<(), StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let payload =
            serde_json::to_string(entry).map_err(|err| StorageError::new(err.to_string()))?;
        connection
            .lpush::<_, _, ()>(command_queue_key(imei), payload)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        Ok(())
    }

    async fn ack(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("delete from command_queue where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
