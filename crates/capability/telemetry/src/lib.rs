//! 追踪初始化、请求 ID 与网关基础指标。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 网关指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_refused: u64,
    pub frames_decoded: u64,
    pub framing_invalid: u64,
    pub checksum_mismatch: u64,
    pub decode_errors: u64,
    pub unauthorised: u64,
    pub packets_acked: u64,
    pub records_forwarded: u64,
    pub forward_failure: u64,
    pub presence_updates: u64,
    pub presence_update_failure: u64,
    pub commands_dispatched: u64,
    pub command_dispatch_failure: u64,
    pub sync_runs: u64,
}

/// 网关基础指标（无锁累加）。
pub struct TelemetryMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_refused: AtomicU64,
    frames_decoded: AtomicU64,
    framing_invalid: AtomicU64,
    checksum_mismatch: AtomicU64,
    decode_errors: AtomicU64,
    unauthorised: AtomicU64,
    packets_acked: AtomicU64,
    records_forwarded: AtomicU64,
    forward_failure: AtomicU64,
    presence_updates: AtomicU64,
    presence_update_failure: AtomicU64,
    commands_dispatched: AtomicU64,
    command_dispatch_failure: AtomicU64,
    sync_runs: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            connections_refused: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            framing_invalid: AtomicU64::new(0),
            checksum_mismatch: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unauthorised: AtomicU64::new(0),
            packets_acked: AtomicU64::new(0),
            records_forwarded: AtomicU64::new(0),
            forward_failure: AtomicU64::new(0),
            presence_updates: AtomicU64::new(0),
            presence_update_failure: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            command_dispatch_failure: AtomicU64::new(0),
            sync_runs: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            framing_invalid: self.framing_invalid.load(Ordering::Relaxed),
            checksum_mismatch: self.checksum_mismatch.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unauthorised: self.unauthorised.load(Ordering::Relaxed),
            packets_acked: self.packets_acked.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            forward_failure: self.forward_failure.load(Ordering::Relaxed),
            presence_updates: self.presence_updates.load(Ordering::Relaxed),
            presence_update_failure: self.presence_update_failure.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            command_dispatch_failure: self.command_dispatch_failure.load(Ordering::Relaxed),
            sync_runs: self.sync_runs.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可由环境过滤覆盖）。
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录新建连接。
pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接关闭。
pub fn record_connection_closed() {
    metrics().connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录超出端口连接上限被拒绝的连接。
pub fn record_connection_refused() {
    metrics()
        .connections_refused
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录成功解码的帧。
pub fn record_frame_decoded() {
    metrics().frames_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录非法帧（组帧失败）。
pub fn record_framing_invalid() {
    metrics().framing_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录校验和不匹配。
pub fn record_checksum_mismatch() {
    metrics().checksum_mismatch.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败。
pub fn record_decode_error() {
    metrics().decode_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录未授权 IMEI 的登录尝试。
pub fn record_unauthorised() {
    metrics().unauthorised.fetch_add(1, Ordering::Relaxed);
}

/// 记录已回写的 ACK。
pub fn record_packet_acked() {
    metrics().packets_acked.fetch_add(1, Ordering::Relaxed);
}

/// 记录成功转发的记录。
pub fn record_record_forwarded() {
    metrics().records_forwarded.fetch_add(1, Ordering::Relaxed);
}

/// 记录 webhook 转发失败。
pub fn record_forward_failure() {
    metrics().forward_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录在线状态更新成功。
pub fn record_presence_update() {
    metrics().presence_updates.fetch_add(1, Ordering::Relaxed);
}

/// 记录在线状态更新失败。
pub fn record_presence_update_failure() {
    metrics()
        .presence_update_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录下行命令写出成功。
pub fn record_command_dispatched() {
    metrics()
        .commands_dispatched
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录下行命令写出失败。
pub fn record_command_dispatch_failure() {
    metrics()
        .command_dispatch_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录后台同步执行次数。
pub fn record_sync_run() {
    metrics().sync_runs.fetch_add(1, Ordering::Relaxed);
}
