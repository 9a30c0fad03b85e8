//! Teltonika FMB 协议编解码
//!
//! 两种帧：IMEI 握手帧（一次性）与 AVL 数据帧（重复）。
//!
//! AVL 帧：`preamble(4x00) | dataLength(4 BE) | codecId | recordCount |
//! records | recordCount | CRC16(4 BE，低 16 位有效)`。
//!
//! CRC 为 CRC-16/IBM，覆盖 codecId 到尾部 recordCount。默认宽松模式：
//! 校验失败记日志并继续解码、照常应答；`strict_crc` 打开后直接丢帧。
//!
//! Codec：0x08 标准、0x8E 扩展（ID/计数加宽到 2 字节并追加变长组）、
//! 0x10（codec 16，含 generation type）、0x0C（codec 12，下行命令）。

use crate::crc::crc16_ibm;
use crate::error::ProtocolError;
use crate::types::{to_hex_lower, DecodeContext, DecodedPacket, PacketPayload};
use chrono::{DateTime, TimeZone, Utc};
use domain::{DeviceRecord, GpsPosition, PacketType, Protocol};
use std::collections::BTreeMap;
use tracing::warn;

pub const CODEC_8: u8 = 0x08;
pub const CODEC_8E: u8 = 0x8e;
pub const CODEC_16: u8 = 0x10;
pub const CODEC_12: u8 = 0x0c;

const COMMAND_TYPE: u8 = 0x05;
const RESPONSE_TYPE: u8 = 0x06;

/// 单条 AVL 记录。
#[derive(Debug, Clone, PartialEq)]
pub struct AvlRecord {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: i16,
    pub angle_deg: u16,
    pub satellites: u8,
    pub speed_kmh: u16,
    pub event_io_id: u16,
    /// codec 16 专有
    pub generation_type: Option<u8>,
    /// 定长 IO 元素（1/2/4/8 字节，统一放大为 i64）
    pub io: BTreeMap<u16, i64>,
    /// codec 8E 的变长 IO 元素
    pub io_extended: BTreeMap<u16, Vec<u8>>,
}

/// Teltonika 帧载荷。
#[derive(Debug, Clone)]
pub enum TeltonikaPayload {
    Imei(String),
    Avl {
        codec_id: u8,
        record_count: u8,
        records: Vec<AvlRecord>,
        crc_ok: bool,
    },
    /// codec 12 命令应答（ASCII）
    CommandResponse(String),
}

/// Teltonika 编解码器。
#[derive(Debug, Clone, Copy, Default)]
pub struct TeltonikaCodec {
    /// CRC 不匹配时丢帧而非宽松接受
    pub strict_crc: bool,
}

impl TeltonikaCodec {
    /// 解码一个完整帧（IMEI 握手或 AVL 数据帧）。
    pub fn decode_frame(
        &self,
        frame: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        if frame.len() >= 2 && u16::from_be_bytes([frame[0], frame[1]]) == 15 {
            return self.decode_imei(frame, ctx);
        }
        self.decode_avl(frame, ctx)
    }

    fn decode_imei(
        &self,
        frame: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        if frame.len() != 17 {
            return Err(ProtocolError::Truncated(format!(
                "imei frame of {} bytes",
                frame.len()
            )));
        }
        let digits = &frame[2..];
        if !digits.iter().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::DataParse("imei is not numeric".to_string()));
        }
        let imei = String::from_utf8(digits.to_vec())
            .map_err(|err| ProtocolError::DataParse(err.to_string()))?;
        Ok(DecodedPacket {
            protocol: Protocol::Teltonika,
            packet_type: PacketType::Login,
            imei: Some(imei.clone()),
            received_at_ms: ctx.received_at_ms,
            raw: frame.to_vec(),
            requires_ack: true,
            serial: None,
            payload: PacketPayload::Teltonika(TeltonikaPayload::Imei(imei)),
        })
    }

    fn decode_avl(
        &self,
        frame: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        if frame.len() < 12 {
            return Err(ProtocolError::Truncated(format!(
                "avl frame of {} bytes",
                frame.len()
            )));
        }
        if frame[..4] != [0, 0, 0, 0] {
            return Err(ProtocolError::DataParse("missing avl preamble".to_string()));
        }
        let data_len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
        if frame.len() != 8 + data_len + 4 {
            return Err(ProtocolError::Truncated(format!(
                "declared {} bytes, frame has {}",
                data_len,
                frame.len()
            )));
        }
        let data = &frame[8..8 + data_len];
        let crc_given = u32::from_be_bytes([
            frame[frame.len() - 4],
            frame[frame.len() - 3],
            frame[frame.len() - 2],
            frame[frame.len() - 1],
        ]);
        let crc_computed = crc16_ibm(data) as u32;
        let crc_ok = crc_given == crc_computed;
        if !crc_ok {
            if self.strict_crc {
                return Err(ProtocolError::ChecksumMismatch {
                    expected: crc_computed as u16,
                    actual: crc_given as u16,
                });
            }
            warn!(
                target: "tgw.protocol",
                expected = crc_computed,
                actual = crc_given,
                "teltonika crc mismatch, decoding anyway"
            );
        }

        let mut reader = Reader::new(data);
        let codec_id = reader.u8()?;
        let record_count = reader.u8()?;

        if codec_id == CODEC_12 {
            return self.decode_codec12(frame, data, ctx);
        }
        if codec_id != CODEC_8 && codec_id != CODEC_8E && codec_id != CODEC_16 {
            // 未知 codec：不猜记录布局，不应答
            return Ok(DecodedPacket {
                protocol: Protocol::Teltonika,
                packet_type: PacketType::Unknown,
                imei: ctx.bound_imei.clone(),
                received_at_ms: ctx.received_at_ms,
                raw: frame.to_vec(),
                requires_ack: false,
                serial: None,
                payload: PacketPayload::Teltonika(TeltonikaPayload::Avl {
                    codec_id,
                    record_count,
                    records: Vec::new(),
                    crc_ok,
                }),
            });
        }

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            records.push(decode_record(&mut reader, codec_id)?);
        }
        let trailing = reader.u8()?;
        if trailing != record_count {
            return Err(ProtocolError::DataParse(format!(
                "record count mismatch: {} then {}",
                record_count, trailing
            )));
        }

        Ok(DecodedPacket {
            protocol: Protocol::Teltonika,
            packet_type: if records.is_empty() {
                PacketType::Unknown
            } else {
                PacketType::Location
            },
            imei: ctx.bound_imei.clone(),
            received_at_ms: ctx.received_at_ms,
            raw: frame.to_vec(),
            requires_ack: true,
            serial: None,
            payload: PacketPayload::Teltonika(TeltonikaPayload::Avl {
                codec_id,
                record_count,
                records,
                crc_ok,
            }),
        })
    }

    fn decode_codec12(
        &self,
        frame: &[u8],
        data: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        let mut reader = Reader::new(&data[2..]);
        let message_type = reader.u8()?;
        if message_type != COMMAND_TYPE && message_type != RESPONSE_TYPE {
            return Err(ProtocolError::DataParse(format!(
                "unknown codec12 type {:#04x}",
                message_type
            )));
        }
        let size = reader.u32_be()? as usize;
        let text = reader.take(size)?;
        let text = String::from_utf8_lossy(text).into_owned();
        Ok(DecodedPacket {
            protocol: Protocol::Teltonika,
            packet_type: PacketType::Unknown,
            imei: ctx.bound_imei.clone(),
            received_at_ms: ctx.received_at_ms,
            raw: frame.to_vec(),
            requires_ack: true,
            serial: None,
            payload: PacketPayload::Teltonika(TeltonikaPayload::CommandResponse(text)),
        })
    }

    /// 构造应答。
    ///
    /// - IMEI 握手：单字节 `0x01`（接受）
    /// - AVL / codec 12：4 字节 BE 已接受记录数
    pub fn encode_ack(&self, packet: &DecodedPacket) -> Option<Vec<u8>> {
        if !packet.requires_ack {
            return None;
        }
        match &packet.payload {
            PacketPayload::Teltonika(TeltonikaPayload::Imei(_)) => Some(vec![0x01]),
            PacketPayload::Teltonika(TeltonikaPayload::Avl { record_count, .. }) => {
                Some((*record_count as u32).to_be_bytes().to_vec())
            }
            PacketPayload::Teltonika(TeltonikaPayload::CommandResponse(_)) => {
                Some(1u32.to_be_bytes().to_vec())
            }
            _ => None,
        }
    }

    /// IMEI 不在许可名单时的拒绝应答（随后关闭连接）。
    pub fn encode_login_reject(&self) -> Vec<u8> {
        vec![0x00]
    }

    /// 构造 codec 12 下行命令帧。
    pub fn encode_command(&self, command: &str) -> Result<Vec<u8>, ProtocolError> {
        let bytes = command.as_bytes();
        let size = bytes.len() as u32;
        // codecId + quantity + type + size(4) + command + quantity
        let data_len = bytes.len() + 8;
        let mut data = Vec::with_capacity(data_len);
        data.push(CODEC_12);
        data.push(0x01);
        data.push(COMMAND_TYPE);
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(bytes);
        data.push(0x01);

        let mut frame = Vec::with_capacity(12 + data.len());
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&data);
        frame.extend_from_slice(&(crc16_ibm(&data) as u32).to_be_bytes());
        Ok(frame)
    }

    /// 投影为规范化设备记录：每条 AVL 记录一条，IMEI 相同。
    pub fn to_device_records(&self, packet: &DecodedPacket, imei: &str) -> Vec<DeviceRecord> {
        let PacketPayload::Teltonika(TeltonikaPayload::Avl { records, .. }) = &packet.payload
        else {
            return Vec::new();
        };
        let raw_hex = to_hex_lower(&packet.raw);
        records
            .iter()
            .map(|record| {
                let mut sensors: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                sensors.insert("priority".to_string(), record.priority.into());
                sensors.insert("eventIoId".to_string(), record.event_io_id.into());
                if let Some(generation) = record.generation_type {
                    sensors.insert("generationType".to_string(), generation.into());
                }
                for (id, value) in &record.io {
                    sensors.insert(format!("io_{}", id), (*value).into());
                }
                for (id, value) in &record.io_extended {
                    sensors.insert(format!("io_{}", id), to_hex_lower(value).into());
                }
                DeviceRecord {
                    imei: imei.to_string(),
                    protocol: Protocol::Teltonika,
                    packet_type: PacketType::Location,
                    timestamp: record.timestamp,
                    location: Some(GpsPosition {
                        lat: record.lat,
                        lon: record.lon,
                        altitude_meters: record.altitude_m as f64,
                        speed_kmh: record.speed_kmh as f64,
                        course_deg: record.angle_deg as f64,
                        satellites: record.satellites,
                        timestamp: record.timestamp,
                        valid: record_valid(record),
                    }),
                    sensors: Some(sensors),
                    status: None,
                    raw_hex: raw_hex.clone(),
                }
            })
            .collect()
    }
}

fn record_valid(record: &AvlRecord) -> bool {
    record.satellites > 0
        && (-90.0..=90.0).contains(&record.lat)
        && (-180.0..=180.0).contains(&record.lon)
        && !(record.lat == 0.0 && record.lon == 0.0)
}

fn decode_record(reader: &mut Reader<'_>, codec_id: u8) -> Result<AvlRecord, ProtocolError> {
    let ts_ms = reader.u64_be()? as i64;
    let timestamp = Utc
        .timestamp_millis_opt(ts_ms)
        .single()
        .ok_or_else(|| ProtocolError::DataParse(format!("invalid avl timestamp {}", ts_ms)))?;
    let priority = reader.u8()?;
    let lon = reader.i32_be()? as f64 / 1e7;
    let lat = reader.i32_be()? as f64 / 1e7;
    let altitude_m = reader.i16_be()?;
    let angle_deg = reader.u16_be()?;
    let satellites = reader.u8()?;
    let speed_kmh = reader.u16_be()?;

    let wide = codec_id == CODEC_8E || codec_id == CODEC_16;
    let event_io_id = if wide {
        reader.u16_be()?
    } else {
        reader.u8()? as u16
    };
    let generation_type = if codec_id == CODEC_16 {
        Some(reader.u8()?)
    } else {
        None
    };
    // codec 8E 把计数也加宽到 2 字节；codec 16 保持 1 字节
    let wide_counts = codec_id == CODEC_8E;
    let _total = read_count(reader, wide_counts)?;

    let mut io = BTreeMap::new();
    for width in [1usize, 2, 4, 8] {
        let count = read_count(reader, wide_counts)?;
        for _ in 0..count {
            let id = if wide {
                reader.u16_be()?
            } else {
                reader.u8()? as u16
            };
            let value = match width {
                1 => reader.u8()? as i64,
                2 => reader.u16_be()? as i64,
                4 => reader.u32_be()? as i64,
                _ => reader.u64_be()? as i64,
            };
            io.insert(id, value);
        }
    }

    let mut io_extended = BTreeMap::new();
    if codec_id == CODEC_8E {
        let count = reader.u16_be()?;
        for _ in 0..count {
            let id = reader.u16_be()?;
            let len = reader.u16_be()? as usize;
            let value = reader.take(len)?.to_vec();
            io_extended.insert(id, value);
        }
    }

    Ok(AvlRecord {
        timestamp,
        priority,
        lat,
        lon,
        altitude_m,
        angle_deg,
        satellites,
        speed_kmh,
        event_io_id,
        generation_type,
        io,
        io_extended,
    })
}

fn read_count(reader: &mut Reader<'_>, wide: bool) -> Result<u16, ProtocolError> {
    if wide {
        reader.u16_be()
    } else {
        Ok(reader.u8()? as u16)
    }
}

/// 有界游标读取器；越界即 Truncated。
struct Reader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.at + n > self.data.len() {
            return Err(ProtocolError::Truncated(format!(
                "need {} bytes at offset {}, have {}",
                n,
                self.at,
                self.data.len()
            )));
        }
        let slice = &self.data[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn i16_be(&mut self) -> Result<i16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32_be(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32_be(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64_be(&mut self) -> Result<u64, ProtocolError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }
}
