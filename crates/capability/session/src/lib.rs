//! # 会话监管能力模块
//!
//! 每个协议端口一个接入器，每条 TCP 连接一个任务。连接状态（接收缓冲、
//! IMEI 绑定、授权标志、本地命令序列号）是任务独占的值，不进程级共享；
//! 注册表只保存用于即时派发提醒的通道句柄。
//!
//! ## 每连接处理流程
//!
//! 1. 读字节喂给帧重组器；空闲超过 socket_timeout 以 TIMEOUT 关闭
//! 2. 逐帧解码；单帧失败记日志丢帧，连续三次失败以 PROTOCOL_ERROR 关闭
//! 3. LOGIN 帧查许可名单：未命中回协议定义的否定应答（仅 Teltonika）后
//!    以 UNAUTHORISED 关闭；命中则绑定 IMEI、登记在线状态、先派发一条
//!    待下发命令、再回正向 ACK
//! 4. 未授权连接发来非 LOGIN 帧：丢弃并以 OUT_OF_ORDER 关闭；改绑其它
//!    IMEI 同样拒绝
//! 5. 已授权帧：需要应答的先回 ACK（保证 serial 回显时序），再并行做
//!    在线状态更新与 webhook 外发；心跳/定位各触发至多一条命令派发
//!
//! 命令派发遵循"LPOP → 编码 → socket 写 → 删 SQL 行"的至少一次语义，
//! 写失败放回队头。停机经 watch 信号广播，连接在下一次读处观察到。

mod connection;
mod error;
mod registry;
mod server;

pub use connection::drive_connection;
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use server::PortServer;

use std::sync::Arc;
use std::time::Duration;
use tgw_forward::Forwarder;
use tgw_storage::{AllowListStore, CommandQueue, StatusStore};

/// 会话层运行参数。
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 空闲读超时（默认 300 s）
    pub socket_timeout: Duration,
    /// 单端口并发连接上限（默认 50 000）
    pub max_connections_per_port: usize,
    /// TCP keepalive 探测间隔（默认 120 s）
    pub keepalive_interval: Duration,
    /// 停机时在途帧的处理宽限（默认 5 s）
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_secs(300),
            max_connections_per_port: 50_000,
            keepalive_interval: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// 会话层依赖集合（共享句柄注入，见各 capability crate）。
pub struct SessionDeps {
    pub allow_list: Arc<dyn AllowListStore>,
    pub status: Arc<dyn StatusStore>,
    pub commands: Arc<dyn CommandQueue>,
    pub forwarder: Arc<dyn Forwarder>,
    pub registry: SessionRegistry,
    pub options: SessionOptions,
}
