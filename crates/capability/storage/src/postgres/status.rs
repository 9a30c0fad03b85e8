//! Postgres 在线状态落库实现
//!
//! Redis HASH 是热数据，后台同步周期性把快照 upsert 回 `device_status` 表。

use crate::error::StorageError;
use domain::{DeviceStatusRecord, LinkStatus};
use sqlx::PgPool;

pub struct PgStatusStore {
    pub pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按 IMEI upsert 一条状态。
    pub async fn upsert(&self, record: &DeviceStatusRecord) -> Result<(), StorageError> {
        sqlx::query(
            "insert into device_status \
             (imei, status, lat, lon, speed, course, acc, satellites, updated_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, to_timestamp($9 / 1000.0)) \
             on conflict (imei) do update set \
             status = excluded.status, lat = excluded.lat, lon = excluded.lon, \
             speed = excluded.speed, course = excluded.course, acc = excluded.acc, \
             satellites = excluded.satellites, updated_at = excluded.updated_at",
        )
        .bind(&record.imei)
        .bind(record.status.unwrap_or(LinkStatus::Disconnected).as_str())
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.speed_kmh)
        .bind(record.course_deg)
        .bind(record.acc)
        .bind(record.satellites.map(|value| value as i16))
        .bind(record.updated_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 批量刷写（后台同步用）。
    pub async fn upsert_many(&self, records: &[DeviceStatusRecord]) -> Result<usize, StorageError> {
        let mut written = 0;
        for record in records {
            self.upsert(record).await?;
            written += 1;
        }
        Ok(written)
    }
}
