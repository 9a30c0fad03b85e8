//! # 协议编解码能力模块
//!
//! 提供 GPS 终端二进制协议的组帧与编解码能力，支持：
//! - **GT06 / Concox**：`0x7878` / `0x7979` 组帧，CRC-ITU 校验
//! - **Teltonika FMB**：IMEI 握手 + AVL 数据帧（codec 8 / 8E / 16 / 12）
//!
//! ## 架构设计
//!
//! ```text
//! socket 字节流
//!       │
//!       ▼
//! FrameBuffer（按端口固定的 Framing 组帧）
//!       │
//!       ▼
//! Codec（Gt06Codec / TeltonikaCodec）
//!       │ decode_frame → DecodedPacket
//!       │ encode_ack   → 应答字节
//!       │ encode_command → 下行命令帧
//!       ▼
//! to_device_records → domain::DeviceRecord（出站投影）
//! ```
//!
//! 编解码是纯值运算：不持有 socket，不做 I/O；会话层负责读写与时序。
//! 协议族是封闭集合，按监听端口静态分派（sum type），不走动态分发。

mod crc;
mod error;
mod frame;
pub mod gt06;
pub mod teltonika;
mod types;

pub use crc::{additive_sum, crc16_ibm, crc_itu};
pub use error::ProtocolError;
pub use frame::{FrameBuffer, FrameStatus, Framing, MAX_AVL_DATA_LEN};
pub use gt06::Gt06Codec;
pub use teltonika::TeltonikaCodec;
pub use types::{now_epoch_ms, to_hex_lower, DecodeContext, DecodedPacket, PacketPayload};

use domain::{DeviceRecord, Protocol};

/// 协议编解码器（按监听端口选定）。
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    Gt06(Gt06Codec),
    Teltonika(TeltonikaCodec),
}

impl Codec {
    pub fn protocol(&self) -> Protocol {
        match self {
            Codec::Gt06(_) => Protocol::Gt06,
            Codec::Teltonika(_) => Protocol::Teltonika,
        }
    }

    /// 该协议的组帧方式。
    pub fn framing(&self) -> Framing {
        match self {
            Codec::Gt06(_) => Framing::Gt06,
            Codec::Teltonika(_) => Framing::Teltonika,
        }
    }

    /// 解码一个完整帧。
    pub fn decode_frame(
        &self,
        frame: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        match self {
            Codec::Gt06(codec) => codec.decode_frame(frame, ctx),
            Codec::Teltonika(codec) => codec.decode_frame(frame, ctx),
        }
    }

    /// 构造应答字节；无需应答的帧返回 None。
    pub fn encode_ack(&self, packet: &DecodedPacket) -> Option<Vec<u8>> {
        match self {
            Codec::Gt06(codec) => codec.encode_ack(packet),
            Codec::Teltonika(codec) => codec.encode_ack(packet),
        }
    }

    /// 登录被拒时的否定应答；协议未定义则返回 None（直接关连接）。
    pub fn encode_login_reject(&self) -> Option<Vec<u8>> {
        match self {
            Codec::Gt06(_) => None,
            Codec::Teltonika(codec) => Some(codec.encode_login_reject()),
        }
    }

    /// 编码下行命令。`serial` 仅 GT06 使用（帧序列号），Teltonika 忽略。
    pub fn encode_command(&self, command: &str, serial: u16) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Codec::Gt06(codec) => codec.encode_command(command, serial),
            Codec::Teltonika(codec) => codec.encode_command(command),
        }
    }

    /// 投影为规范化设备记录（可能为空，也可能一帧多条）。
    pub fn to_device_records(&self, packet: &DecodedPacket, imei: &str) -> Vec<DeviceRecord> {
        match self {
            Codec::Gt06(codec) => codec.to_device_records(packet, imei),
            Codec::Teltonika(codec) => codec.to_device_records(packet, imei),
        }
    }
}
