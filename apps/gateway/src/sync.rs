//! 后台同步
//!
//! 周期任务（默认 5 分钟，实例内单飞），三件事：
//! 1. 从 SQL `devices` 表全量重建 Redis 许可名单
//! 2. 从 SQL `command_queue` 按 created_at 顺序重建各 IMEI 的 Redis 镜像
//! 3. 把 Redis 在线状态快照 upsert 回 SQL `device_status`
//!
//! 启动时先同步一次，成功后接入器才开始监听。

use std::sync::Arc;
use std::time::Duration;
use tgw_storage::{
    AllowListStore, DurableCommandQueue, PgDeviceDirectory, PgStatusStore, StatusStore,
    StorageError,
};
use tgw_telemetry::record_sync_run;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

pub struct SyncDeps {
    pub directory: PgDeviceDirectory,
    pub status_sql: PgStatusStore,
    pub allow_list: Arc<dyn AllowListStore>,
    pub status_cache: Arc<dyn StatusStore>,
    pub queue: Arc<DurableCommandQueue>,
}

/// 执行一轮同步。
pub async fn run_once(deps: &SyncDeps) -> Result<(), StorageError> {
    let imeis = deps.directory.list_imeis().await?;
    deps.allow_list.replace_all(&imeis).await?;

    let pending = deps.queue.pending_by_imei().await?;
    deps.queue.rebuild(&pending).await?;

    let statuses = deps.status_cache.list_statuses().await?;
    let flushed = deps.status_sql.upsert_many(&statuses).await?;

    record_sync_run();
    info!(
        target: "tgw.sync",
        imeis = imeis.len(),
        command_queues = pending.len(),
        statuses_flushed = flushed,
        "sync completed"
    );
    Ok(())
}

/// 同步循环；失败只记日志，下一轮重试。
pub async fn run_loop(deps: SyncDeps, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 启动同步已单独执行过，先消费立即触发的第一跳
    ticker.tick().await;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = run_once(&deps).await {
                    error!(target: "tgw.sync", error = %err, "sync failed");
                }
            }
        }
    }
}
