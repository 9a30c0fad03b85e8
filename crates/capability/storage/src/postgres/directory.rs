//! Postgres 设备名录实现
//!
//! `devices` 表是许可名单的权威来源，后台同步据此重建 Redis 集合。

use crate::error::StorageError;
use sqlx::{PgPool, Row};

pub struct PgDeviceDirectory {
    pub pool: PgPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 全部许可 IMEI。
    pub async fn list_imeis(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("select imei from devices")
            .fetch_all(&self.pool)
            .await?;
        let mut imeis = Vec::with_capacity(rows.len());
        for row in rows {
            imeis.push(row.try_get("imei")?);
        }
        Ok(imeis)
    }
}
