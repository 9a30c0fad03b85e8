//! GT06 / Concox 协议编解码
//!
//! 帧体布局（起始字节与长度字段之后）：
//! `protocol(1) | content(N) | serial(2) | checksum(2) | 0x0D 0x0A`
//!
//! 校验：CRC-ITU，覆盖长度字段（含）到校验和（不含）。部分克隆设备
//! 使用同区间的 16 位累加和，`checksum_fallback` 打开时在主校验失败后
//! 尝试回退校验；两者都失败则丢帧。
//!
//! 识别的协议字节：
//! - `0x01` LOGIN（8 字节打包 IMEI）
//! - `0x13` HEARTBEAT（终端信息/电压/GSM/报警语言）
//! - `0x12` / `0x22` LOCATION
//! - `0x16` / `0x26` 报警（定位 + LBS + 状态块）
//! - `0x1A` STATUS
//! - `0x80` 下行命令封包

use crate::crc::{additive_sum, crc_itu};
use crate::error::ProtocolError;
use crate::types::{to_hex_lower, DecodeContext, DecodedPacket, PacketPayload};
use chrono::{DateTime, TimeZone, Utc};
use domain::{DeviceHealth, DeviceRecord, GpsPosition, PacketType, Protocol};
use std::collections::BTreeMap;

pub const PROTO_LOGIN: u8 = 0x01;
pub const PROTO_LOCATION: u8 = 0x12;
pub const PROTO_HEARTBEAT: u8 = 0x13;
pub const PROTO_ALARM: u8 = 0x16;
pub const PROTO_LOCATION_2: u8 = 0x22;
pub const PROTO_ALARM_2: u8 = 0x26;
pub const PROTO_STATUS: u8 = 0x1a;
pub const PROTO_COMMAND: u8 = 0x80;

/// 终端状态块（心跳与报警帧尾部）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gt06Status {
    pub terminal_info: u8,
    pub voltage_level: u8,
    pub gsm_signal: u8,
    pub alarm: u8,
    pub language: u8,
}

/// LBS 基站块。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbsInfo {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

/// 定位块。
#[derive(Debug, Clone, PartialEq)]
pub struct Gt06Location {
    pub timestamp: DateTime<Utc>,
    pub satellites: u8,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: u8,
    pub course_deg: u16,
    pub gps_fixed: bool,
    pub gps_realtime: bool,
    pub lbs: Option<LbsInfo>,
    pub acc: Option<bool>,
}

/// GT06 帧载荷。
#[derive(Debug, Clone)]
pub enum Gt06Payload {
    Login { imei: String },
    Heartbeat(Gt06Status),
    Location(Gt06Location),
    Alarm {
        location: Gt06Location,
        status: Option<Gt06Status>,
    },
    StatusReport(Option<Gt06Status>),
    /// 0x80 封包（设备侧回显的命令内容）
    CommandEcho(Vec<u8>),
    /// 未识别协议字节，保留原始内容
    Raw(Vec<u8>),
}

/// GT06 编解码器。
#[derive(Debug, Clone, Copy)]
pub struct Gt06Codec {
    /// 主 CRC 失败后是否尝试克隆设备的累加和校验
    pub checksum_fallback: bool,
}

impl Default for Gt06Codec {
    fn default() -> Self {
        Self {
            checksum_fallback: true,
        }
    }
}

impl Gt06Codec {
    /// 解码一个完整 GT06 帧（由帧重组器产出，含起止字节）。
    pub fn decode_frame(
        &self,
        frame: &[u8],
        ctx: &DecodeContext,
    ) -> Result<DecodedPacket, ProtocolError> {
        let (content_start, declared) = match frame {
            [0x78, 0x78, len, ..] => (3usize, *len as usize),
            [0x79, 0x79, hi, lo, ..] => (4usize, u16::from_be_bytes([*hi, *lo]) as usize),
            _ => return Err(ProtocolError::DataParse("bad start bytes".to_string())),
        };
        if frame.len() != content_start + declared + 2 {
            return Err(ProtocolError::Truncated(format!(
                "declared {} bytes, frame has {}",
                declared,
                frame.len()
            )));
        }
        let body = &frame[content_start..content_start + declared];
        if body.len() < 5 {
            return Err(ProtocolError::Truncated("body shorter than envelope".to_string()));
        }
        let check_range = &frame[2..content_start + declared - 2];
        let given = u16::from_be_bytes([body[body.len() - 2], body[body.len() - 1]]);
        let expected = crc_itu(check_range);
        if expected != given && !(self.checksum_fallback && additive_sum(check_range) == given) {
            return Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: given,
            });
        }

        let protocol_byte = body[0];
        let content = &body[1..body.len() - 4];
        let serial = u16::from_be_bytes([body[body.len() - 4], body[body.len() - 3]]);

        // 空内容帧是应答回显（protocol | serial | CRC），不携带业务载荷
        if content.is_empty() {
            return Ok(DecodedPacket {
                protocol: Protocol::Gt06,
                packet_type: PacketType::Unknown,
                imei: ctx.bound_imei.clone(),
                received_at_ms: ctx.received_at_ms,
                raw: frame.to_vec(),
                requires_ack: false,
                serial: Some(serial),
                payload: PacketPayload::Gt06(Gt06Payload::Raw(Vec::new())),
            });
        }

        let (packet_type, requires_ack, imei, payload) = match protocol_byte {
            PROTO_LOGIN => {
                let imei = decode_imei(content)?;
                (
                    PacketType::Login,
                    true,
                    Some(imei.clone()),
                    Gt06Payload::Login { imei },
                )
            }
            PROTO_HEARTBEAT => {
                let status = decode_status(content)?;
                (
                    PacketType::Heartbeat,
                    true,
                    ctx.bound_imei.clone(),
                    Gt06Payload::Heartbeat(status),
                )
            }
            PROTO_LOCATION | PROTO_LOCATION_2 => {
                let location = decode_location(content, ctx.received_at_ms)?;
                (
                    PacketType::Location,
                    true,
                    ctx.bound_imei.clone(),
                    Gt06Payload::Location(location),
                )
            }
            PROTO_ALARM | PROTO_ALARM_2 => {
                let (location, status) = decode_alarm(content, ctx.received_at_ms)?;
                (
                    PacketType::Alarm,
                    true,
                    ctx.bound_imei.clone(),
                    Gt06Payload::Alarm { location, status },
                )
            }
            PROTO_STATUS => {
                let status = decode_status(content).ok();
                (
                    PacketType::Status,
                    true,
                    ctx.bound_imei.clone(),
                    Gt06Payload::StatusReport(status),
                )
            }
            PROTO_COMMAND => (
                PacketType::Unknown,
                false,
                ctx.bound_imei.clone(),
                Gt06Payload::CommandEcho(content.to_vec()),
            ),
            _ => (
                PacketType::Unknown,
                false,
                ctx.bound_imei.clone(),
                Gt06Payload::Raw(content.to_vec()),
            ),
        };

        Ok(DecodedPacket {
            protocol: Protocol::Gt06,
            packet_type,
            imei,
            received_at_ms: ctx.received_at_ms,
            raw: frame.to_vec(),
            requires_ack,
            serial: Some(serial),
            payload: PacketPayload::Gt06(payload),
        })
    }

    /// 构造应答帧：`78 78 05 protocol serial CRC 0D 0A`，serial 原样回显。
    pub fn encode_ack(&self, packet: &DecodedPacket) -> Option<Vec<u8>> {
        if !packet.requires_ack {
            return None;
        }
        let protocol_byte = frame_protocol_byte(&packet.raw)?;
        Some(build_ack(protocol_byte, packet.serial.unwrap_or(0)))
    }

    /// 构造 0x80 下行命令帧。
    ///
    /// `contentLen` 只计命令字节；总长字段覆盖协议字节到 CRC。
    pub fn encode_command(&self, command: &str, serial: u16) -> Result<Vec<u8>, ProtocolError> {
        let bytes = command.as_bytes();
        // protocol(1) + contentLen(2) + command + serial(2) + crc(2)
        let declared = bytes.len() + 7;
        if declared > 0xff {
            return Err(ProtocolError::Encode(format!(
                "command too long: {} bytes",
                bytes.len()
            )));
        }
        let mut frame = Vec::with_capacity(declared + 5);
        frame.extend_from_slice(&[0x78, 0x78, declared as u8, PROTO_COMMAND]);
        frame.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        frame.extend_from_slice(bytes);
        frame.extend_from_slice(&serial.to_be_bytes());
        let crc = crc_itu(&frame[2..]);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0d, 0x0a]);
        Ok(frame)
    }

    /// 投影为规范化设备记录；登录与未知帧不产出记录。
    pub fn to_device_records(&self, packet: &DecodedPacket, imei: &str) -> Vec<DeviceRecord> {
        let PacketPayload::Gt06(payload) = &packet.payload else {
            return Vec::new();
        };
        let raw_hex = to_hex_lower(&packet.raw);
        let received_at = timestamp_from_ms(packet.received_at_ms);
        match payload {
            Gt06Payload::Login { .. } | Gt06Payload::CommandEcho(_) | Gt06Payload::Raw(_) => {
                Vec::new()
            }
            Gt06Payload::Heartbeat(status) => vec![DeviceRecord {
                imei: imei.to_string(),
                protocol: Protocol::Gt06,
                packet_type: PacketType::Heartbeat,
                timestamp: received_at,
                location: None,
                sensors: None,
                status: Some(health(status)),
                raw_hex,
            }],
            Gt06Payload::Location(location) => vec![location_record(
                imei,
                PacketType::Location,
                location,
                packet.serial,
                None,
                raw_hex,
            )],
            Gt06Payload::Alarm { location, status } => vec![location_record(
                imei,
                PacketType::Alarm,
                location,
                packet.serial,
                status.as_ref().map(health),
                raw_hex,
            )],
            Gt06Payload::StatusReport(status) => vec![DeviceRecord {
                imei: imei.to_string(),
                protocol: Protocol::Gt06,
                packet_type: PacketType::Status,
                timestamp: received_at,
                location: None,
                sensors: None,
                status: status.as_ref().map(health),
                raw_hex,
            }],
        }
    }
}

fn health(status: &Gt06Status) -> DeviceHealth {
    DeviceHealth {
        terminal_info: status.terminal_info,
        battery_level: status.voltage_level,
        gsm_signal: status.gsm_signal,
        alarm: status.alarm,
    }
}

fn location_record(
    imei: &str,
    packet_type: PacketType,
    location: &Gt06Location,
    serial: Option<u16>,
    status: Option<DeviceHealth>,
    raw_hex: String,
) -> DeviceRecord {
    let mut sensors: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    sensors.insert("gpsFixed".to_string(), location.gps_fixed.into());
    sensors.insert("gpsRealtime".to_string(), location.gps_realtime.into());
    sensors.insert("satellites".to_string(), location.satellites.into());
    if let Some(lbs) = &location.lbs {
        sensors.insert("mcc".to_string(), lbs.mcc.into());
        sensors.insert("mnc".to_string(), lbs.mnc.into());
        sensors.insert("lac".to_string(), lbs.lac.into());
        sensors.insert("cellId".to_string(), lbs.cell_id.into());
    }
    if let Some(acc) = location.acc {
        sensors.insert("acc".to_string(), acc.into());
    }
    if let Some(serial) = serial {
        sensors.insert("serial".to_string(), serial.into());
    }
    DeviceRecord {
        imei: imei.to_string(),
        protocol: Protocol::Gt06,
        packet_type,
        timestamp: location.timestamp,
        location: Some(GpsPosition {
            lat: location.lat,
            lon: location.lon,
            altitude_meters: 0.0,
            speed_kmh: location.speed_kmh as f64,
            course_deg: location.course_deg as f64,
            satellites: location.satellites,
            timestamp: location.timestamp,
            valid: location_valid(location),
        }),
        sensors: Some(sensors),
        status,
        raw_hex,
    }
}

fn location_valid(location: &Gt06Location) -> bool {
    location.gps_fixed
        && (-90.0..=90.0).contains(&location.lat)
        && (-180.0..=180.0).contains(&location.lon)
        && !(location.lat == 0.0 && location.lon == 0.0)
}

/// 8 字节打包 IMEI：逐字节十六进制拼接后去掉前导零，至少保留一位。
fn decode_imei(content: &[u8]) -> Result<String, ProtocolError> {
    if content.len() < 8 {
        return Err(ProtocolError::DataParse(format!(
            "login content too short: {} bytes",
            content.len()
        )));
    }
    let hex = to_hex_lower(&content[..8]);
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok("0".to_string());
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::DataParse(format!("non-decimal imei: {}", hex)));
    }
    Ok(trimmed.to_string())
}

fn decode_status(content: &[u8]) -> Result<Gt06Status, ProtocolError> {
    if content.len() < 5 {
        return Err(ProtocolError::DataParse(format!(
            "status content too short: {} bytes",
            content.len()
        )));
    }
    Ok(Gt06Status {
        terminal_info: content[0],
        voltage_level: content[1],
        gsm_signal: content[2],
        alarm: content[3],
        language: content[4],
    })
}

/// 定位块固定部分：日期(6) + GPS信息(1) + 纬度(4) + 经度(4) + 速度(1) + 航向状态(2)。
const LOCATION_FIXED_LEN: usize = 18;

fn decode_location(content: &[u8], received_at_ms: i64) -> Result<Gt06Location, ProtocolError> {
    let (location, rest) = decode_location_block(content, received_at_ms)?;
    let mut location = location;
    let mut rest = rest;
    if rest.len() >= 8 {
        location.lbs = Some(decode_lbs(&rest[..8]));
        rest = &rest[8..];
    }
    if !rest.is_empty() {
        location.acc = Some(rest[0] & 0x01 == 0x01);
    }
    Ok(location)
}

fn decode_alarm(
    content: &[u8],
    received_at_ms: i64,
) -> Result<(Gt06Location, Option<Gt06Status>), ProtocolError> {
    let (mut location, mut rest) = decode_location_block(content, received_at_ms)?;
    if rest.len() >= 8 {
        location.lbs = Some(decode_lbs(&rest[..8]));
        rest = &rest[8..];
    }
    let status = decode_status(rest).ok();
    Ok((location, status))
}

fn decode_location_block(
    content: &[u8],
    received_at_ms: i64,
) -> Result<(Gt06Location, &[u8]), ProtocolError> {
    if content.len() < LOCATION_FIXED_LEN {
        return Err(ProtocolError::DataParse(format!(
            "location content too short: {} bytes",
            content.len()
        )));
    }
    let timestamp = decode_datetime(&content[..6], received_at_ms)?;
    let satellites = content[6] & 0x0f;
    let lat_raw = u32::from_be_bytes([content[7], content[8], content[9], content[10]]);
    let lon_raw = u32::from_be_bytes([content[11], content[12], content[13], content[14]]);
    let speed_kmh = content[15];
    let word = u16::from_be_bytes([content[16], content[17]]);

    let course_deg = word & 0x03ff;
    let north = word & (1 << 10) != 0;
    let west = word & (1 << 11) != 0;
    let gps_fixed = word & (1 << 12) != 0;
    let gps_realtime = word & (1 << 13) != 0;

    let lat_mag = lat_raw as f64 / 1_800_000.0;
    let lon_mag = lon_raw as f64 / 1_800_000.0;
    let lat = if north { lat_mag } else { -lat_mag };
    let lon = if west { -lon_mag } else { lon_mag };

    Ok((
        Gt06Location {
            timestamp,
            satellites,
            lat,
            lon,
            speed_kmh,
            course_deg,
            gps_fixed,
            gps_realtime,
            lbs: None,
            acc: None,
        },
        &content[LOCATION_FIXED_LEN..],
    ))
}

/// 6 字节 YY MM DD HH MM SS，按 UTC 解释（年 = 2000 + YY）。
///
/// 无定位时部分设备发全零日期，此时落回接收时间。
fn decode_datetime(raw: &[u8], received_at_ms: i64) -> Result<DateTime<Utc>, ProtocolError> {
    if raw.iter().all(|&b| b == 0) {
        return Ok(timestamp_from_ms(received_at_ms));
    }
    Utc.with_ymd_and_hms(
        2000 + raw[0] as i32,
        raw[1] as u32,
        raw[2] as u32,
        raw[3] as u32,
        raw[4] as u32,
        raw[5] as u32,
    )
    .single()
    .ok_or_else(|| ProtocolError::DataParse(format!("invalid datetime: {:02x?}", raw)))
}

fn decode_lbs(raw: &[u8]) -> LbsInfo {
    LbsInfo {
        mcc: u16::from_be_bytes([raw[0], raw[1]]),
        mnc: raw[2],
        lac: u16::from_be_bytes([raw[3], raw[4]]),
        cell_id: u32::from_be_bytes([0, raw[5], raw[6], raw[7]]),
    }
}

fn timestamp_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn frame_protocol_byte(raw: &[u8]) -> Option<u8> {
    match raw {
        [0x78, 0x78, _, proto, ..] => Some(*proto),
        [0x79, 0x79, _, _, proto, ..] => Some(*proto),
        _ => None,
    }
}

fn build_ack(protocol_byte: u8, serial: u16) -> Vec<u8> {
    let mut frame = vec![0x78, 0x78, 0x05, protocol_byte];
    frame.extend_from_slice(&serial.to_be_bytes());
    let crc = crc_itu(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&[0x0d, 0x0a]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc_itu;

    fn build_frame(protocol_byte: u8, content: &[u8], serial: u16) -> Vec<u8> {
        let declared = content.len() + 5;
        let mut frame = vec![0x78, 0x78, declared as u8, protocol_byte];
        frame.extend_from_slice(content);
        frame.extend_from_slice(&serial.to_be_bytes());
        let crc = crc_itu(&frame[2..]);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.extend_from_slice(&[0x0d, 0x0a]);
        frame
    }

    fn ctx() -> DecodeContext {
        DecodeContext {
            bound_imei: Some("3332210".to_string()),
            received_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn decodes_login_with_clone_checksum() {
        // 克隆设备样本：校验和是累加和而非 CRC-ITU
        let frame: &[u8] = &[
            0x78, 0x78, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x33, 0x22, 0x10, 0x00, 0x01,
            0x00, 0x77, 0x0d, 0x0a,
        ];
        let codec = Gt06Codec::default();
        let packet = codec.decode_frame(frame, &DecodeContext::default()).expect("decode");
        assert_eq!(packet.packet_type, PacketType::Login);
        assert_eq!(packet.imei.as_deref(), Some("3332210"));
        assert_eq!(packet.serial, Some(1));
        assert!(packet.requires_ack);

        // 关闭回退后同一帧必须被拒
        let strict = Gt06Codec {
            checksum_fallback: false,
        };
        assert!(matches!(
            strict.decode_frame(frame, &DecodeContext::default()),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn login_ack_matches_protocol_doc_vector() {
        let frame: &[u8] = &[
            0x78, 0x78, 0x0d, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x33, 0x22, 0x10, 0x00, 0x01,
            0x00, 0x77, 0x0d, 0x0a,
        ];
        let codec = Gt06Codec::default();
        let packet = codec.decode_frame(frame, &DecodeContext::default()).expect("decode");
        let ack = codec.encode_ack(&packet).expect("ack");
        assert_eq!(
            ack,
            vec![0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xd9, 0xdc, 0x0d, 0x0a]
        );
    }

    #[test]
    fn decodes_location_with_hemisphere_bits() {
        let mut content = vec![0x17, 0x08, 0x0a, 0x0a, 0x1e, 0x00];
        content.push(0xcb); // GPS 信息：长度 12，卫星 11
        content.extend_from_slice(&26_820_000u32.to_be_bytes()); // 14.9°
        content.extend_from_slice(&9_360_000u32.to_be_bytes()); // 5.2°
        content.push(0x28); // 40 km/h
        // 航向 10°，北纬（bit10）、东经（bit11 清零）、已定位（bit12）
        let word: u16 = 10 | (1 << 10) | (1 << 12);
        content.extend_from_slice(&word.to_be_bytes());

        let frame = build_frame(PROTO_LOCATION, &content, 0x0042);
        let codec = Gt06Codec::default();
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        let PacketPayload::Gt06(Gt06Payload::Location(location)) = &packet.payload else {
            panic!("expected location payload");
        };
        assert!((location.lat - 14.9).abs() < 1e-9);
        assert!((location.lon - 5.2).abs() < 1e-9);
        assert_eq!(location.course_deg, 10);
        assert!(location.gps_fixed);
        assert_eq!(location.satellites, 11);

        let records = codec.to_device_records(&packet, "3332210");
        assert_eq!(records.len(), 1);
        let gps = records[0].location.as_ref().expect("location");
        assert!(gps.valid);
        assert!((gps.lat - 14.9).abs() < 1e-9);

        // 南纬西经：bit10 清零、bit11 置位
        let word: u16 = 10 | (1 << 11) | (1 << 12);
        content.truncate(content.len() - 2);
        content.extend_from_slice(&word.to_be_bytes());
        let frame = build_frame(PROTO_LOCATION, &content, 0x0043);
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        let PacketPayload::Gt06(Gt06Payload::Location(location)) = &packet.payload else {
            panic!("expected location payload");
        };
        assert!(location.lat < 0.0);
        assert!(location.lon < 0.0);
    }

    #[test]
    fn location_without_fix_is_invalid() {
        let mut content = vec![0x17, 0x08, 0x0a, 0x0a, 0x1e, 0x00, 0xc7];
        content.extend_from_slice(&26_820_000u32.to_be_bytes());
        content.extend_from_slice(&9_360_000u32.to_be_bytes());
        content.push(0x00);
        let word: u16 = 10 | (1 << 10); // 未定位
        content.extend_from_slice(&word.to_be_bytes());

        let codec = Gt06Codec::default();
        let frame = build_frame(PROTO_LOCATION, &content, 1);
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        let records = codec.to_device_records(&packet, "3332210");
        assert!(!records[0].location.as_ref().expect("location").valid);
    }

    #[test]
    fn decodes_location_with_lbs_and_acc() {
        let mut content = vec![0x17, 0x08, 0x0a, 0x0a, 0x1e, 0x00, 0xcb];
        content.extend_from_slice(&26_820_000u32.to_be_bytes());
        content.extend_from_slice(&9_360_000u32.to_be_bytes());
        content.push(0x28);
        let word: u16 = 90 | (1 << 10) | (1 << 12) | (1 << 13);
        content.extend_from_slice(&word.to_be_bytes());
        // LBS: MCC 460, MNC 0, LAC 0x1234, CellID 0x00aabbcc
        content.extend_from_slice(&[0x01, 0xcc, 0x00, 0x12, 0x34, 0xaa, 0xbb, 0xcc]);
        content.push(0x01); // ACC on

        let codec = Gt06Codec::default();
        let frame = build_frame(PROTO_LOCATION_2, &content, 7);
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        let PacketPayload::Gt06(Gt06Payload::Location(location)) = &packet.payload else {
            panic!("expected location payload");
        };
        let lbs = location.lbs.expect("lbs");
        assert_eq!(lbs.mcc, 460);
        assert_eq!(lbs.lac, 0x1234);
        assert_eq!(lbs.cell_id, 0x00aa_bbcc);
        assert_eq!(location.acc, Some(true));

        let records = codec.to_device_records(&packet, "3332210");
        let sensors = records[0].sensors.as_ref().expect("sensors");
        assert_eq!(sensors["mcc"], 460);
        assert_eq!(sensors["acc"], true);
        assert_eq!(sensors["serial"], 7);
        assert_eq!(sensors["gpsRealtime"], true);
    }

    #[test]
    fn decodes_heartbeat() {
        let content = [0x40, 0x04, 0x03, 0x00, 0x01];
        let frame = build_frame(PROTO_HEARTBEAT, &content, 0x0019);
        let codec = Gt06Codec::default();
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        assert_eq!(packet.packet_type, PacketType::Heartbeat);
        assert_eq!(packet.imei.as_deref(), Some("3332210"));
        let PacketPayload::Gt06(Gt06Payload::Heartbeat(status)) = &packet.payload else {
            panic!("expected heartbeat payload");
        };
        assert_eq!(status.voltage_level, 4);
        assert_eq!(status.gsm_signal, 3);

        let records = codec.to_device_records(&packet, "3332210");
        assert_eq!(records[0].packet_type, PacketType::Heartbeat);
        assert_eq!(records[0].status.expect("status").battery_level, 4);
    }

    #[test]
    fn command_frame_round_trips() {
        let codec = Gt06Codec::default();
        let frame = codec.encode_command("DYD,000000#", 0x0102).expect("encode");
        assert_eq!(frame[..2], [0x78, 0x78]);
        assert_eq!(frame[3], PROTO_COMMAND);
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode own frame");
        assert_eq!(packet.serial, Some(0x0102));
        assert!(!packet.requires_ack);
        let PacketPayload::Gt06(Gt06Payload::CommandEcho(content)) = &packet.payload else {
            panic!("expected command echo");
        };
        // contentLen(2) + 命令字节
        assert_eq!(&content[2..], b"DYD,000000#");
    }

    #[test]
    fn ack_round_trips_through_decoder() {
        let codec = Gt06Codec::default();
        let ack = build_ack(PROTO_HEARTBEAT, 0xbeef);
        let packet = codec.decode_frame(&ack, &ctx()).expect("decode ack");
        assert_eq!(packet.serial, Some(0xbeef));
    }

    #[test]
    fn unknown_protocol_byte_is_unknown_packet() {
        let frame = build_frame(0x99, &[0x01, 0x02], 3);
        let codec = Gt06Codec::default();
        let packet = codec.decode_frame(&frame, &ctx()).expect("decode");
        assert_eq!(packet.packet_type, PacketType::Unknown);
        assert!(!packet.requires_ack);
        assert!(codec.encode_ack(&packet).is_none());
        assert!(codec.to_device_records(&packet, "3332210").is_empty());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut frame = build_frame(PROTO_HEARTBEAT, &[0x40, 0x04, 0x03, 0x00, 0x01], 1);
        let crc_at = frame.len() - 4;
        frame[crc_at] ^= 0xff;
        let codec = Gt06Codec {
            checksum_fallback: false,
        };
        assert!(codec.decode_frame(&frame, &ctx()).is_err());
    }
}
