//! 单连接驱动
//!
//! 连接状态是本任务独占的值；读写经 `tokio::io::split` 拆半，读侧只在
//! select 的读分支出现，写侧（ACK / 命令）在各分支处理体内使用。

use crate::SessionDeps;
use domain::{CloseReason, LinkStatus, PacketType, StatusUpdate};
use std::sync::Arc;
use tgw_protocol::{
    gt06::Gt06Payload, now_epoch_ms, teltonika::TeltonikaPayload, Codec, DecodeContext,
    DecodedPacket, FrameStatus, PacketPayload, ProtocolError,
};
use tgw_telemetry::{
    record_checksum_mismatch, record_command_dispatch_failure, record_command_dispatched,
    record_connection_closed, record_connection_opened, record_decode_error, record_frame_decoded,
    record_framing_invalid, record_packet_acked, record_presence_update,
    record_presence_update_failure, record_unauthorised,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 连续解码失败的关断阈值。
const MAX_CONSECUTIVE_DECODE_ERRORS: u8 = 3;

struct ConnectionState {
    peer: String,
    codec: Codec,
    buffer: tgw_protocol::FrameBuffer,
    imei: Option<String>,
    authorised: bool,
    /// 下行命令帧的本地自增序列号
    serial: u16,
    consecutive_errors: u8,
    created_at_ms: i64,
    last_packet_at_ms: i64,
}

impl ConnectionState {
    fn next_serial(&mut self) -> u16 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }
}

/// 驱动一条连接直到关闭，返回关闭原因。
///
/// 对任意 `AsyncRead + AsyncWrite` 流泛型，便于用内存双工流做会话级测试。
pub async fn drive_connection<S>(
    stream: S,
    peer: String,
    codec: Codec,
    deps: Arc<SessionDeps>,
    mut shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    record_connection_opened();
    let started_at = now_epoch_ms();
    let mut state = ConnectionState {
        peer: peer.clone(),
        codec,
        buffer: tgw_protocol::FrameBuffer::new(),
        imei: None,
        authorised: false,
        serial: 0,
        consecutive_errors: 0,
        created_at_ms: started_at,
        last_packet_at_ms: started_at,
    };
    let (drain_tx, mut drain_rx) = mpsc::channel::<()>(4);
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut read_buf = vec![0u8; 4096];

    let reason = loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break CloseReason::Shutdown;
                }
            }
            _ = drain_rx.recv(), if state.authorised => {
                if let Err(reason) = drain_one(&mut state, &mut writer, &deps).await {
                    break reason;
                }
            }
            read = timeout(deps.options.socket_timeout, reader.read(&mut read_buf)) => {
                match read {
                    Err(_) => break CloseReason::Timeout,
                    Ok(Err(err)) => {
                        debug!(target: "tgw.session", peer = %state.peer, error = %err, "socket read error");
                        break CloseReason::SocketError;
                    }
                    Ok(Ok(0)) => break CloseReason::PeerClosed,
                    Ok(Ok(n)) => {
                        state.buffer.append(&read_buf[..n]);
                        if let Err(reason) =
                            process_frames(&mut state, &mut writer, &deps, &drain_tx).await
                        {
                            break reason;
                        }
                    }
                }
            }
        }
    };

    if let Some(imei) = state.imei.clone().filter(|_| state.authorised) {
        deps.registry.unregister(&imei, &drain_tx).await;
        let update = StatusUpdate::link(&imei, LinkStatus::Disconnected, now_epoch_ms());
        if let Err(err) = deps.status.upsert_status(&update).await {
            record_presence_update_failure();
            warn!(target: "tgw.session", imei = %imei, error = %err, "disconnect status update failed");
        }
    }
    record_connection_closed();
    let closed_at = now_epoch_ms();
    info!(
        target: "tgw.session",
        peer = %state.peer,
        imei = state.imei.as_deref().unwrap_or("-"),
        reason = %reason,
        session_ms = closed_at - state.created_at_ms,
        idle_ms = closed_at - state.last_packet_at_ms,
        "connection closed"
    );
    reason
}

async fn process_frames<W>(
    state: &mut ConnectionState,
    writer: &mut W,
    deps: &Arc<SessionDeps>,
    drain_tx: &mpsc::Sender<()>,
) -> Result<(), CloseReason>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match state.buffer.try_take_frame(state.codec.framing()) {
            FrameStatus::NeedMore => return Ok(()),
            FrameStatus::Invalid => {
                record_framing_invalid();
                warn!(
                    target: "tgw.session",
                    peer = %state.peer,
                    buffered = state.buffer.len(),
                    "invalid framing, closing"
                );
                return Err(CloseReason::ProtocolError);
            }
            FrameStatus::Frame(frame) => {
                let ctx = DecodeContext {
                    bound_imei: state.imei.clone(),
                    received_at_ms: now_epoch_ms(),
                };
                match state.codec.decode_frame(&frame, &ctx) {
                    Err(err) => {
                        record_decode_error();
                        if matches!(err, ProtocolError::ChecksumMismatch { .. }) {
                            record_checksum_mismatch();
                        }
                        state.consecutive_errors += 1;
                        warn!(
                            target: "tgw.session",
                            peer = %state.peer,
                            error = %err,
                            consecutive = state.consecutive_errors,
                            "frame dropped"
                        );
                        if state.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                            return Err(CloseReason::ProtocolError);
                        }
                    }
                    Ok(packet) => {
                        record_frame_decoded();
                        state.consecutive_errors = 0;
                        state.last_packet_at_ms = ctx.received_at_ms;
                        handle_packet(state, writer, deps, drain_tx, packet).await?;
                    }
                }
            }
        }
    }
}

async fn handle_packet<W>(
    state: &mut ConnectionState,
    writer: &mut W,
    deps: &Arc<SessionDeps>,
    drain_tx: &mpsc::Sender<()>,
    packet: DecodedPacket,
) -> Result<(), CloseReason>
where
    W: AsyncWrite + Unpin,
{
    if packet.packet_type == PacketType::Login {
        return handle_login(state, writer, deps, drain_tx, &packet).await;
    }
    if !state.authorised {
        warn!(
            target: "tgw.session",
            peer = %state.peer,
            packet_type = %packet.packet_type,
            "packet before login, closing"
        );
        return Err(CloseReason::OutOfOrder);
    }
    let imei = state
        .imei
        .clone()
        .expect("authorised connection always has an imei");

    // ACK 必须先于本帧的任何下游效应写出，保证 serial 回显单调
    if let Some(ack) = state.codec.encode_ack(&packet) {
        if let Err(err) = writer.write_all(&ack).await {
            warn!(target: "tgw.session", peer = %state.peer, error = %err, "ack write failed");
            return Err(CloseReason::SocketError);
        }
        record_packet_acked();
    }

    if let Some(update) = status_update_for(&packet, &imei) {
        match deps.status.upsert_status(&update).await {
            Ok(()) => record_presence_update(),
            Err(err) => {
                record_presence_update_failure();
                warn!(target: "tgw.session", imei = %imei, error = %err, "status update failed");
            }
        }
    }

    // webhook 外发不阻塞连接
    for record in state.codec.to_device_records(&packet, &imei) {
        let forwarder = deps.forwarder.clone();
        tokio::spawn(async move {
            let _ = forwarder.forward(&record).await;
        });
    }

    // 每个触发包至多派发一条命令，限制 ACK 被阻塞的时长
    if matches!(
        packet.packet_type,
        PacketType::Heartbeat | PacketType::Location | PacketType::Alarm | PacketType::Status
    ) {
        drain_one(state, writer, deps).await?;
    }
    Ok(())
}

async fn handle_login<W>(
    state: &mut ConnectionState,
    writer: &mut W,
    deps: &Arc<SessionDeps>,
    drain_tx: &mpsc::Sender<()>,
    packet: &DecodedPacket,
) -> Result<(), CloseReason>
where
    W: AsyncWrite + Unpin,
{
    let Some(imei) = packet.imei.clone() else {
        warn!(target: "tgw.session", peer = %state.peer, "login frame without imei");
        return Err(CloseReason::ProtocolError);
    };
    if let Some(bound) = &state.imei {
        if *bound != imei {
            warn!(
                target: "tgw.session",
                peer = %state.peer,
                bound = %bound,
                attempted = %imei,
                "imei rebind attempt, closing"
            );
            return Err(CloseReason::OutOfOrder);
        }
        // 同 IMEI 重复登录幂等：刷新在线状态并重新应答
    }

    let authorised = match deps.allow_list.is_authorised(&imei).await {
        Ok(authorised) => authorised,
        Err(err) => {
            warn!(target: "tgw.session", imei = %imei, error = %err, "allow-list check failed, denying");
            false
        }
    };
    if !authorised {
        record_unauthorised();
        info!(target: "tgw.session", peer = %state.peer, imei = %imei, "unauthorised imei");
        if let Some(reject) = state.codec.encode_login_reject() {
            let _ = writer.write_all(&reject).await;
        }
        return Err(CloseReason::Unauthorised);
    }

    let first_login = state.imei.is_none();
    state.imei = Some(imei.clone());
    state.authorised = true;
    if first_login {
        deps.registry.register(&imei, drain_tx.clone()).await;
        info!(target: "tgw.session", peer = %state.peer, imei = %imei, "device authorised");
    }

    let update = StatusUpdate::link(&imei, LinkStatus::Connected, packet.received_at_ms);
    match deps.status.upsert_status(&update).await {
        Ok(()) => record_presence_update(),
        Err(err) => {
            record_presence_update_failure();
            warn!(target: "tgw.session", imei = %imei, error = %err, "status update failed");
        }
    }

    // 登录即触发一次命令派发，随后才写正向 ACK
    drain_one(state, writer, deps).await?;

    if let Some(ack) = state.codec.encode_ack(packet) {
        if let Err(err) = writer.write_all(&ack).await {
            warn!(target: "tgw.session", peer = %state.peer, error = %err, "login ack write failed");
            return Err(CloseReason::SocketError);
        }
        record_packet_acked();
    }
    Ok(())
}

/// 派发至多一条待下发命令。
///
/// 写成功后删除 SQL 权威行；写失败把命令放回队头并关闭连接。
async fn drain_one<W>(
    state: &mut ConnectionState,
    writer: &mut W,
    deps: &Arc<SessionDeps>,
) -> Result<(), CloseReason>
where
    W: AsyncWrite + Unpin,
{
    let Some(imei) = state.imei.clone() else {
        return Ok(());
    };
    let entry = match deps.commands.pop(&imei).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return Ok(()),
        Err(err) => {
            warn!(target: "tgw.session", imei = %imei, error = %err, "command pop failed, skipping dispatch");
            return Ok(());
        }
    };
    let serial = state.next_serial();
    let bytes = match state.codec.encode_command(&entry.command, serial) {
        Ok(bytes) => bytes,
        Err(err) => {
            // 无法编码的命令不放回队头（避免每包重试同一毒丸）；
            // SQL 行保留，等下一轮同步重建后由运维处理
            record_command_dispatch_failure();
            warn!(
                target: "tgw.session",
                imei = %imei,
                command_id = entry.id,
                error = %err,
                "command encode failed, left in durable queue"
            );
            return Ok(());
        }
    };
    match writer.write_all(&bytes).await {
        Ok(()) => {
            record_command_dispatched();
            if let Err(err) = deps.commands.ack(entry.id).await {
                // 权威行未删，至少一次语义下可能重复投递
                warn!(target: "tgw.session", imei = %imei, command_id = entry.id, error = %err, "command ack failed");
            }
            info!(
                target: "tgw.session",
                imei = %imei,
                command_id = entry.id,
                serial,
                "command dispatched"
            );
            Ok(())
        }
        Err(err) => {
            record_command_dispatch_failure();
            if let Err(requeue_err) = deps.commands.push_front(&imei, &entry).await {
                warn!(target: "tgw.session", imei = %imei, command_id = entry.id, error = %requeue_err, "command requeue failed");
            }
            warn!(target: "tgw.session", imei = %imei, command_id = entry.id, error = %err, "command write failed");
            Err(CloseReason::SocketError)
        }
    }
}

/// 从已解码帧提取在线状态增量。
fn status_update_for(packet: &DecodedPacket, imei: &str) -> Option<StatusUpdate> {
    let touch = |at_ms: i64| StatusUpdate::link(imei, LinkStatus::Connected, at_ms);
    match &packet.payload {
        PacketPayload::Gt06(Gt06Payload::Location(location)) => Some(StatusUpdate {
            imei: imei.to_string(),
            status: Some(LinkStatus::Connected),
            lat: Some(location.lat),
            lon: Some(location.lon),
            speed_kmh: Some(location.speed_kmh as f64),
            course_deg: Some(location.course_deg as f64),
            acc: location.acc,
            satellites: Some(location.satellites),
            updated_at_ms: packet.received_at_ms,
        }),
        PacketPayload::Gt06(Gt06Payload::Alarm { location, .. }) => Some(StatusUpdate {
            imei: imei.to_string(),
            status: Some(LinkStatus::Connected),
            lat: Some(location.lat),
            lon: Some(location.lon),
            speed_kmh: Some(location.speed_kmh as f64),
            course_deg: Some(location.course_deg as f64),
            acc: location.acc,
            satellites: Some(location.satellites),
            updated_at_ms: packet.received_at_ms,
        }),
        PacketPayload::Gt06(Gt06Payload::Heartbeat(_))
        | PacketPayload::Gt06(Gt06Payload::StatusReport(_)) => Some(touch(packet.received_at_ms)),
        PacketPayload::Teltonika(TeltonikaPayload::Avl { records, .. }) => {
            // 批次内最后一条是最新位置
            let record = records.last()?;
            Some(StatusUpdate {
                imei: imei.to_string(),
                status: Some(LinkStatus::Connected),
                lat: Some(record.lat),
                lon: Some(record.lon),
                speed_kmh: Some(record.speed_kmh as f64),
                course_deg: Some(record.angle_deg as f64),
                acc: None,
                satellites: Some(record.satellites),
                updated_at_ms: packet.received_at_ms,
            })
        }
        _ => None,
    }
}
