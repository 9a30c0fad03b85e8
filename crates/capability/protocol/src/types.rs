//! 协议共享类型定义

use domain::{PacketType, Protocol};

/// 解码上下文：连接侧已知的信息。
///
/// 编解码本身是纯值运算，时间与已绑定 IMEI 由会话层传入。
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    /// 连接上已绑定的 IMEI（登录帧之后可用）
    pub bound_imei: Option<String>,
    /// 帧的接收时间（毫秒）
    pub received_at_ms: i64,
}

/// 一次成功解码的结果。
///
/// 在会话层同步消费：先回 ACK，再投影为 DeviceRecord。
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub protocol: Protocol,
    pub packet_type: PacketType,
    /// 帧内携带或连接上绑定的 IMEI
    pub imei: Option<String>,
    /// 接收时间（毫秒）
    pub received_at_ms: i64,
    /// 原始帧字节
    pub raw: Vec<u8>,
    pub requires_ack: bool,
    /// GT06 帧序列号（ACK 必须原样回显）
    pub serial: Option<u16>,
    pub payload: PacketPayload,
}

/// 协议相关载荷。
#[derive(Debug, Clone)]
pub enum PacketPayload {
    Gt06(crate::gt06::Gt06Payload),
    Teltonika(crate::teltonika::TeltonikaPayload),
    /// 已识别帧但无结构化载荷
    None,
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// 小写十六进制表示（DeviceRecord.raw_hex）。
pub fn to_hex_lower(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
