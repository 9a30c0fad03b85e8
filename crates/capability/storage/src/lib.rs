//! # 在线状态与命令存储模块
//!
//! 本模块提供网关热路径依赖的三类存储能力，Redis 承担低延迟并发读写，
//! PostgreSQL 作为可靠的权威存储。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：许可名单 / 在线状态 / 命令队列的异步 Trait
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **连接管理层** (`connection.rs`)：PostgreSQL 连接池管理
//! 4. **实现层**：
//!    - `redis.rs`：许可名单 SET、在线状态 HASH（Lua 服务端按字段合并）
//!    - `command.rs`：命令队列（SQL 权威行 + Redis 列表镜像）
//!    - `postgres/`：许可名单来源、在线状态落库、命令行查询
//!    - `in_memory/`：内存实现（用于测试和演示）
//!
//! ## Redis 键
//!
//! - `devices:imei:set`：许可 IMEI 集合（授权判定唯一依据）
//! - `devices:status`：HASH，imei → 状态 JSON
//! - `devices:commands:<imei>`：LIST，FIFO 命令 JSON
//!
//! ## 一致性约定
//!
//! - 同一 IMEI 的状态并发更新必须按字段合并而非整体覆盖；合并在 Redis
//!   服务端（Lua + cjson）完成，支持多网关实例并发写。
//! - 命令入队是事务对：SQL insert 取得 id 后 RPUSH 镜像，RPUSH 失败则
//!   回滚 SQL；出队（LPOP）后只有 socket 写成功并删除 SQL 行才算送达。
//! - 许可名单与命令队列由后台同步任务从 SQL 全量重建（启动时先行一次）。

pub mod command;
pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod redis;
pub mod traits;

pub use command::DurableCommandQueue;
pub use connection::*;
pub use error::*;
pub use in_memory::{InMemoryAllowListStore, InMemoryCommandQueue, InMemoryStatusStore};
pub use postgres::{PgDeviceDirectory, PgStatusStore};
pub use self::redis::{RedisAllowListStore, RedisStatusStore};
pub use traits::*;

/// 许可名单集合键。
pub const ALLOW_LIST_KEY: &str = "devices:imei:set";
/// 在线状态 HASH 键。
pub const STATUS_HASH_KEY: &str = "devices:status";
/// 命令队列键前缀。
pub const COMMAND_QUEUE_PREFIX: &str = "devices:commands:";

/// 指定 IMEI 的命令队列键。
pub fn command_queue_key(imei: &str) -> String {
    format!("{}{}", COMMAND_QUEUE_PREFIX, imei)
}
