pub mod data;

pub use data::{
    CommandEntry, DeviceHealth, DeviceRecord, DeviceStatusRecord, GpsPosition, LinkStatus,
    StatusUpdate,
};

use serde::{Deserialize, Serialize};

/// 协议族：网关按监听端口绑定其中一种。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Gt06,
    Teltonika,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Gt06 => "GT06",
            Protocol::Teltonika => "TELTONIKA",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码后报文的语义类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketType {
    Login,
    Heartbeat,
    Location,
    Alarm,
    Status,
    Unknown,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Login => "LOGIN",
            PacketType::Heartbeat => "HEARTBEAT",
            PacketType::Location => "LOCATION",
            PacketType::Alarm => "ALARM",
            PacketType::Status => "STATUS",
            PacketType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连接关闭原因（用于日志与指标归因）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// 空闲超时
    Timeout,
    /// 帧格式非法或连续解码失败
    ProtocolError,
    /// IMEI 不在许可名单
    Unauthorised,
    /// 未登录即发送业务帧，或尝试改绑 IMEI
    OutOfOrder,
    /// 对端正常断开
    PeerClosed,
    /// socket 读写错误
    SocketError,
    /// 网关停机
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Timeout => "TIMEOUT",
            CloseReason::ProtocolError => "PROTOCOL_ERROR",
            CloseReason::Unauthorised => "UNAUTHORISED",
            CloseReason::OutOfOrder => "OUT_OF_ORDER",
            CloseReason::PeerClosed => "PEER_CLOSED",
            CloseReason::SocketError => "SOCKET_ERROR",
            CloseReason::Shutdown => "SHUTDOWN",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
