//! 活跃会话注册表
//!
//! IMEI → 派发提醒通道。管理面下发命令时先持久化，再通过该通道提醒
//! 活跃连接立即执行一次队列派发；通道只传信号不传命令内容，投递路径
//! 始终是"Redis 队头 + SQL 确认"。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, mpsc::Sender<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, imei: &str, sender: mpsc::Sender<()>) {
        let mut sessions = self.inner.write().await;
        sessions.insert(imei.to_string(), sender);
    }

    /// 注销会话；只移除仍属于本连接的句柄（同 IMEI 重连时新句柄胜出）。
    pub async fn unregister(&self, imei: &str, sender: &mpsc::Sender<()>) {
        let mut sessions = self.inner.write().await;
        if let Some(current) = sessions.get(imei) {
            if current.same_channel(sender) {
                sessions.remove(imei);
            }
        }
    }

    /// 提醒活跃连接派发一次命令队列；存在活跃会话返回 true。
    pub async fn nudge(&self, imei: &str) -> bool {
        let sessions = self.inner.read().await;
        match sessions.get(imei) {
            // 通道满说明已有待处理的提醒，视作成功
            Some(sender) => sender.try_send(()).is_ok() || !sender.is_closed(),
            None => false,
        }
    }

    pub async fn is_online(&self, imei: &str) -> bool {
        let sessions = self.inner.read().await;
        sessions
            .get(imei)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }
}
