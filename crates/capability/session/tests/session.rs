//! 会话级端到端行为：内存双工流 + 内存存储驱动完整的
//! 登录 / 应答 / 状态 / 命令派发链路。

use async_trait::async_trait;
use domain::{CloseReason, DeviceRecord, LinkStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tgw_forward::{ForwardError, Forwarder};
use tgw_protocol::{crc16_ibm, crc_itu, Codec, Gt06Codec, TeltonikaCodec};
use tgw_session::{drive_connection, SessionDeps, SessionOptions, SessionRegistry};
use tgw_storage::{
    AllowListStore, CommandQueue, InMemoryAllowListStore, InMemoryCommandQueue,
    InMemoryStatusStore, StatusStore,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const IMEI: &str = "3332210";
const TELTONIKA_IMEI: &str = "357689078699600";

/// 捕获所有外发记录的测试 Forwarder。
#[derive(Default)]
struct CaptureForwarder {
    records: Mutex<Vec<DeviceRecord>>,
}

impl CaptureForwarder {
    fn count(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Forwarder for CaptureForwarder {
    async fn forward(&self, record: &DeviceRecord) -> Result<(), ForwardError> {
        self.records
            .lock()
            .expect("capture lock")
            .push(record.clone());
        Ok(())
    }
}

struct Harness {
    deps: Arc<SessionDeps>,
    status: Arc<InMemoryStatusStore>,
    commands: Arc<InMemoryCommandQueue>,
    forwarder: Arc<CaptureForwarder>,
    shutdown: watch::Sender<bool>,
}

fn harness(allowed: &[&str], options: SessionOptions) -> Harness {
    let allow_list = Arc::new(InMemoryAllowListStore::with_imeis(
        allowed.iter().copied().map(str::to_string),
    ));
    let status = Arc::new(InMemoryStatusStore::new());
    let commands = Arc::new(InMemoryCommandQueue::new());
    let forwarder = Arc::new(CaptureForwarder::default());
    let (shutdown, _) = watch::channel(false);
    let deps = Arc::new(SessionDeps {
        allow_list: allow_list as Arc<dyn AllowListStore>,
        status: status.clone() as Arc<dyn StatusStore>,
        commands: commands.clone() as Arc<dyn CommandQueue>,
        forwarder: forwarder.clone() as Arc<dyn Forwarder>,
        registry: SessionRegistry::new(),
        options,
    });
    Harness {
        deps,
        status,
        commands,
        forwarder,
        shutdown,
    }
}

fn spawn_gt06(harness: &Harness) -> (DuplexStream, JoinHandle<CloseReason>) {
    let (client, server) = tokio::io::duplex(4096);
    let deps = harness.deps.clone();
    let shutdown = harness.shutdown.subscribe();
    let handle = tokio::spawn(drive_connection(
        server,
        "test:1".to_string(),
        Codec::Gt06(Gt06Codec::default()),
        deps,
        shutdown,
    ));
    (client, handle)
}

fn spawn_teltonika(harness: &Harness) -> (DuplexStream, JoinHandle<CloseReason>) {
    let (client, server) = tokio::io::duplex(4096);
    let deps = harness.deps.clone();
    let shutdown = harness.shutdown.subscribe();
    let handle = tokio::spawn(drive_connection(
        server,
        "test:2".to_string(),
        Codec::Teltonika(TeltonikaCodec::default()),
        deps,
        shutdown,
    ));
    (client, handle)
}

fn gt06_frame(protocol_byte: u8, content: &[u8], serial: u16) -> Vec<u8> {
    let declared = content.len() + 5;
    let mut frame = vec![0x78, 0x78, declared as u8, protocol_byte];
    frame.extend_from_slice(content);
    frame.extend_from_slice(&serial.to_be_bytes());
    let crc = crc_itu(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&[0x0d, 0x0a]);
    frame
}

fn gt06_login(serial: u16) -> Vec<u8> {
    // IMEI 3332210 的 8 字节打包形式
    gt06_frame(
        0x01,
        &[0x00, 0x00, 0x00, 0x00, 0x03, 0x33, 0x22, 0x10],
        serial,
    )
}

fn gt06_heartbeat(serial: u16) -> Vec<u8> {
    gt06_frame(0x13, &[0x40, 0x04, 0x03, 0x00, 0x01], serial)
}

fn avl_record() -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&1_692_000_000_000u64.to_be_bytes());
    record.push(0x01);
    record.extend_from_slice(&(254_000_000i32).to_be_bytes());
    record.extend_from_slice(&(546_000_000i32).to_be_bytes());
    record.extend_from_slice(&(120i16).to_be_bytes());
    record.extend_from_slice(&(90u16).to_be_bytes());
    record.push(10);
    record.extend_from_slice(&(55u16).to_be_bytes());
    record.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // 空 IO 块
    record
}

fn avl_frame(records: usize) -> Vec<u8> {
    let mut data = vec![0x08, records as u8];
    for _ in 0..records {
        data.extend_from_slice(&avl_record());
    }
    data.push(records as u8);
    let mut frame = vec![0, 0, 0, 0];
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&data);
    frame.extend_from_slice(&(crc16_ibm(&data) as u32).to_be_bytes());
    frame
}

async fn read_exact(client: &mut DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

#[tokio::test]
async fn gt06_login_is_acked_and_presence_upserted() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let ack = read_exact(&mut client, 10).await;
    assert_eq!(
        ack,
        vec![0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xd9, 0xdc, 0x0d, 0x0a]
    );

    let record = harness
        .status
        .get_status(IMEI)
        .await
        .expect("get status")
        .expect("status present");
    assert_eq!(record.status, Some(LinkStatus::Connected));

    drop(client);
    let reason = handle.await.expect("join");
    assert_eq!(reason, CloseReason::PeerClosed);

    // 断开后状态翻转为 DISCONNECTED
    let record = harness
        .status
        .get_status(IMEI)
        .await
        .expect("get status")
        .expect("status present");
    assert_eq!(record.status, Some(LinkStatus::Disconnected));
}

#[tokio::test]
async fn unauthorised_gt06_login_writes_nothing_and_closes() {
    let harness = harness(&[], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let reason = handle.await.expect("join");
    assert_eq!(reason, CloseReason::Unauthorised);

    // GT06 无否定应答：对端读到 EOF 前没有任何字节
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    assert_eq!(n, 0);
    assert_eq!(harness.forwarder.count(), 0);
    assert!(harness
        .status
        .get_status(IMEI)
        .await
        .expect("get status")
        .is_none());
}

#[tokio::test]
async fn teltonika_handshake_accepts_known_imei() {
    let harness = harness(&[TELTONIKA_IMEI], SessionOptions::default());
    let (mut client, _handle) = spawn_teltonika(&harness);

    let mut frame = vec![0x00, 0x0f];
    frame.extend_from_slice(TELTONIKA_IMEI.as_bytes());
    client.write_all(&frame).await.expect("write imei");
    assert_eq!(read_exact(&mut client, 1).await, vec![0x01]);
}

#[tokio::test]
async fn teltonika_handshake_rejects_unknown_imei() {
    let harness = harness(&[], SessionOptions::default());
    let (mut client, handle) = spawn_teltonika(&harness);

    let mut frame = vec![0x00, 0x0f];
    frame.extend_from_slice(TELTONIKA_IMEI.as_bytes());
    client.write_all(&frame).await.expect("write imei");

    // 恰好一个拒绝字节，然后关闭
    assert_eq!(read_exact(&mut client, 1).await, vec![0x00]);
    assert_eq!(handle.await.expect("join"), CloseReason::Unauthorised);
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn teltonika_avl_batch_is_acked_and_forwarded() {
    let harness = harness(&[TELTONIKA_IMEI], SessionOptions::default());
    let (mut client, _handle) = spawn_teltonika(&harness);

    let mut login = vec![0x00, 0x0f];
    login.extend_from_slice(TELTONIKA_IMEI.as_bytes());
    client.write_all(&login).await.expect("write imei");
    assert_eq!(read_exact(&mut client, 1).await, vec![0x01]);

    client
        .write_all(&avl_frame(3))
        .await
        .expect("write avl batch");
    assert_eq!(read_exact(&mut client, 4).await, vec![0, 0, 0, 3]);

    // 外发在独立任务里执行，稍候再断言
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.forwarder.count(), 3);

    let record = harness
        .status
        .get_status(TELTONIKA_IMEI)
        .await
        .expect("get status")
        .expect("status present");
    assert_eq!(record.satellites, Some(10));
    assert!((record.lat.expect("lat") - 54.6).abs() < 1e-9);
}

#[tokio::test]
async fn commands_dispatch_fifo_one_per_heartbeat() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, _handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let _ = read_exact(&mut client, 10).await;

    let first = harness.commands.enqueue(IMEI, "A").await.expect("enqueue");
    let second = harness.commands.enqueue(IMEI, "B").await.expect("enqueue");

    // 第一个心跳：ACK + 命令 A
    client
        .write_all(&gt06_heartbeat(2))
        .await
        .expect("write heartbeat");
    let ack = read_exact(&mut client, 10).await;
    assert_eq!(ack[3], 0x13);
    assert_eq!(&ack[4..6], &[0x00, 0x02]);
    // 0x80 帧：1 字节命令 → 总长 13
    let command = read_exact(&mut client, 13).await;
    assert_eq!(command[3], 0x80);
    assert_eq!(command[6], b'A');

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.commands.sql_row_exists(first.id));
    assert!(harness.commands.sql_row_exists(second.id));
    assert_eq!(harness.commands.queue_len(IMEI), 1);

    // 第二个心跳：命令 B
    client
        .write_all(&gt06_heartbeat(3))
        .await
        .expect("write heartbeat");
    let _ack = read_exact(&mut client, 10).await;
    let command = read_exact(&mut client, 13).await;
    assert_eq!(command[6], b'B');

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.commands.sql_row_exists(second.id));
    assert_eq!(harness.commands.queue_len(IMEI), 0);
}

#[tokio::test]
async fn heartbeat_before_login_closes_out_of_order() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client
        .write_all(&gt06_heartbeat(1))
        .await
        .expect("write heartbeat");
    assert_eq!(handle.await.expect("join"), CloseReason::OutOfOrder);
    assert_eq!(harness.forwarder.count(), 0);
}

#[tokio::test]
async fn rebinding_to_another_imei_closes() {
    let harness = harness(&[IMEI, "409"], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let _ = read_exact(&mut client, 10).await;

    // 同一连接改用 IMEI 409 登录
    let other = gt06_frame(0x01, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x09], 2);
    client.write_all(&other).await.expect("write login");
    assert_eq!(handle.await.expect("join"), CloseReason::OutOfOrder);
}

#[tokio::test]
async fn same_imei_relogin_is_idempotent() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, _handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let _ = read_exact(&mut client, 10).await;
    client.write_all(&gt06_login(2)).await.expect("write relogin");
    let ack = read_exact(&mut client, 10).await;
    assert_eq!(&ack[4..6], &[0x00, 0x02]);
}

#[tokio::test]
async fn invalid_framing_closes_connection() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client
        .write_all(b"GET / HTTP/1.1\r\n")
        .await
        .expect("write garbage");
    assert_eq!(handle.await.expect("join"), CloseReason::ProtocolError);
}

#[tokio::test]
async fn idle_connection_times_out() {
    let options = SessionOptions {
        socket_timeout: Duration::from_millis(100),
        ..SessionOptions::default()
    };
    let harness = harness(&[IMEI], options);
    let (client, handle) = spawn_gt06(&harness);

    // 不发任何字节
    let reason = timeout(Duration::from_secs(2), handle)
        .await
        .expect("driver hung")
        .expect("join");
    assert_eq!(reason, CloseReason::Timeout);
    drop(client);
}

#[tokio::test]
async fn shutdown_signal_closes_connections() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let _ = read_exact(&mut client, 10).await;

    harness.shutdown.send(true).expect("signal shutdown");
    let reason = timeout(Duration::from_secs(2), handle)
        .await
        .expect("driver hung")
        .expect("join");
    assert_eq!(reason, CloseReason::Shutdown);
}

#[tokio::test]
async fn admin_nudge_triggers_immediate_dispatch() {
    let harness = harness(&[IMEI], SessionOptions::default());
    let (mut client, _handle) = spawn_gt06(&harness);

    client.write_all(&gt06_login(1)).await.expect("write login");
    let _ = read_exact(&mut client, 10).await;

    // 管理面：先入队，再提醒活跃会话
    harness
        .commands
        .enqueue(IMEI, "RESET#")
        .await
        .expect("enqueue");
    assert!(harness.deps.registry.nudge(IMEI).await);

    // 无需等下一个心跳即收到 0x80 帧（"RESET#" 6 字节 → 总长 18）
    let command = read_exact(&mut client, 18).await;
    assert_eq!(command[3], 0x80);
    assert_eq!(&command[6..12], b"RESET#");
}
