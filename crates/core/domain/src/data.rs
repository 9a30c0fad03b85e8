//! 设备侧共享数据模型。
//!
//! - DeviceRecord：解码后对外转发的规范化记录（webhook 载荷）
//! - StatusUpdate / DeviceStatusRecord：设备在线状态的增量更新与合并结果
//! - CommandEntry：下行命令队列单元

use crate::{PacketType, Protocol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GPS 定位块。
///
/// `valid` 仅在协议侧的"已定位"标志置位且坐标落在合法区间内为 true。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsPosition {
    pub lat: f64,
    pub lon: f64,
    pub altitude_meters: f64,
    pub speed_kmh: f64,
    pub course_deg: f64,
    pub satellites: u8,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
}

/// 终端健康块（心跳/报警帧附带）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealth {
    pub terminal_info: u8,
    pub battery_level: u8,
    pub gsm_signal: u8,
    pub alarm: u8,
}

/// 规范化设备记录：解码结果到下游 webhook 的唯一出站形态。
///
/// 时间戳序列化为 ISO-8601，`raw_hex` 为原始帧的小写十六进制。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub imei: String,
    pub protocol: Protocol,
    pub packet_type: PacketType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GpsPosition>,
    /// IO / LBS 等标量字段（键按协议语义命名，如 `satellites`、`io_239`）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceHealth>,
    pub raw_hex: String,
}

/// 设备链路状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Connected => "CONNECTED",
            LinkStatus::Disconnected => "DISCONNECTED",
        }
    }
}

/// 在线状态增量更新。
///
/// None 字段不参与合并（不覆盖既有值）；`updated_at_ms` 恒定写入，
/// 同一 IMEI 的并发更新按字段合并、updated_at 以后写为准。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(skip)]
    pub imei: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LinkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u8>,
    pub updated_at_ms: i64,
}

impl StatusUpdate {
    /// 仅携带链路状态的最小更新。
    pub fn link(imei: impl Into<String>, status: LinkStatus, updated_at_ms: i64) -> Self {
        Self {
            imei: imei.into(),
            status: Some(status),
            lat: None,
            lon: None,
            speed_kmh: None,
            course_deg: None,
            acc: None,
            satellites: None,
            updated_at_ms,
        }
    }
}

/// 合并后的设备在线状态记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    #[serde(skip)]
    pub imei: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LinkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u8>,
    pub updated_at_ms: i64,
}

impl DeviceStatusRecord {
    /// 将增量更新合并进当前记录（None 字段保持不变）。
    pub fn merge(&mut self, update: &StatusUpdate) {
        if let Some(status) = update.status {
            self.status = Some(status);
        }
        if let Some(lat) = update.lat {
            self.lat = Some(lat);
        }
        if let Some(lon) = update.lon {
            self.lon = Some(lon);
        }
        if let Some(speed) = update.speed_kmh {
            self.speed_kmh = Some(speed);
        }
        if let Some(course) = update.course_deg {
            self.course_deg = Some(course);
        }
        if let Some(acc) = update.acc {
            self.acc = Some(acc);
        }
        if let Some(satellites) = update.satellites {
            self.satellites = Some(satellites);
        }
        self.updated_at_ms = update.updated_at_ms;
    }

    /// 由一条增量更新生成初始记录。
    pub fn from_update(update: &StatusUpdate) -> Self {
        let mut record = Self {
            imei: update.imei.clone(),
            status: None,
            lat: None,
            lon: None,
            speed_kmh: None,
            course_deg: None,
            acc: None,
            satellites: None,
            updated_at_ms: update.updated_at_ms,
        };
        record.merge(update);
        record
    }
}

/// 下行命令队列单元。
///
/// SQL 行为权威存储，Redis 列表镜像携带同一 JSON 形态；
/// 只有 socket 写成功且 SQL 行删除后才视为送达。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub id: i64,
    pub command: String,
    #[serde(rename = "createdAt")]
    pub created_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_merge_keeps_absent_fields() {
        let mut record = DeviceStatusRecord::from_update(&StatusUpdate {
            imei: "1234".to_string(),
            status: Some(LinkStatus::Connected),
            lat: Some(14.9),
            lon: Some(5.2),
            speed_kmh: Some(40.0),
            course_deg: Some(10.0),
            acc: Some(true),
            satellites: Some(7),
            updated_at_ms: 1_000,
        });
        record.merge(&StatusUpdate::link("1234", LinkStatus::Disconnected, 2_000));
        assert_eq!(record.status, Some(LinkStatus::Disconnected));
        assert_eq!(record.lat, Some(14.9));
        assert_eq!(record.satellites, Some(7));
        assert_eq!(record.updated_at_ms, 2_000);
    }

    #[test]
    fn command_entry_json_shape() {
        let entry = CommandEntry {
            id: 7,
            command: "RESET#".to_string(),
            created_at_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"createdAt\":1700000000000"));
        let back: CommandEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }

    #[test]
    fn device_record_serialises_camel_case() {
        let record = DeviceRecord {
            imei: "3332210".to_string(),
            protocol: Protocol::Gt06,
            packet_type: PacketType::Location,
            timestamp: chrono::TimeZone::timestamp_millis_opt(&Utc, 1_700_000_000_000).unwrap(),
            location: None,
            sensors: None,
            status: None,
            raw_hex: "7878".to_string(),
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["protocol"], "GT06");
        assert_eq!(json["packetType"], "LOCATION");
        assert_eq!(json["rawHex"], "7878");
    }
}
