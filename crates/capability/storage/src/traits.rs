//! 存储接口 Trait 定义
//!
//! - AllowListStore：IMEI 许可名单（热路径授权判定）
//! - StatusStore：设备在线状态（按字段合并的读改写）
//! - CommandQueue：按 IMEI 的 FIFO 下行命令队列
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发；会话层只依赖 Trait

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{CommandEntry, DeviceStatusRecord, StatusUpdate};

/// IMEI 许可名单接口。
///
/// 集合成员判定是接入授权的唯一检查。
#[async_trait]
pub trait AllowListStore: Send + Sync {
    /// O(1) 成员判定。
    async fn is_authorised(&self, imei: &str) -> Result<bool, StorageError>;

    /// 全量重建名单（后台同步用）。
    async fn replace_all(&self, imeis: &[String]) -> Result<(), StorageError>;
}

/// 设备在线状态接口。
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 读改写合并：更新中的 None 字段不覆盖既有值。
    ///
    /// 同一 IMEI 的并发更新必须在存储侧串行合并。
    async fn upsert_status(&self, update: &StatusUpdate) -> Result<(), StorageError>;

    async fn get_status(&self, imei: &str) -> Result<Option<DeviceStatusRecord>, StorageError>;

    /// 全量读取（落库刷写用）。
    async fn list_statuses(&self) -> Result<Vec<DeviceStatusRecord>, StorageError>;
}

/// 按 IMEI 的下行命令队列接口。
///
/// 送达语义：LPOP 之后只有 socket 写成功且 `ack` 删除 SQL 行才算完成；
/// 写失败必须 `push_front` 放回队头，保持 FIFO 与至少一次投递。
#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// 事务入队：SQL 行 + Redis 镜像，二者同生共死。
    async fn enqueue(&self, imei: &str, command: &str) -> Result<CommandEntry, StorageError>;

    /// 取出队头命令；队列为空返回 None。
    async fn pop(&self, imei: &str) -> Result<Option<CommandEntry>, StorageError>;

    /// 投递失败时放回队头。
    async fn push_front(&self, imei: &str, entry: &CommandEntry) -> Result<(), StorageError>;

    /// 确认送达：删除 SQL 权威行。
    async fn ack(&self, id: i64) -> Result<(), StorageError>;
}
