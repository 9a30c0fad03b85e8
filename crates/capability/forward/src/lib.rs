//! 事件外发能力模块
//!
//! 把规范化设备记录以 fire-and-forget 方式 POST 到配置的 webhook。
//! 失败只计数不重试，不反压接入链路：外部下游再慢也不能拖住 GPS 采集。
//! `forward_with_retry` 留给运维标记的关键事件，不在热路径使用。

use async_trait::async_trait;
use domain::DeviceRecord;
use std::time::Duration;
use tgw_telemetry::{record_forward_failure, record_record_forwarded};
use tracing::{debug, warn};

/// 外发错误。
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("http client error: {0}")]
    Client(String),
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// 记录外发接口。
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// 单次投递；任何 2xx 视为成功，响应体忽略。
    async fn forward(&self, record: &DeviceRecord) -> Result<(), ForwardError>;
}

/// 空实现（测试与演示用）。
#[derive(Debug, Default)]
pub struct NoopForwarder;

#[async_trait]
impl Forwarder for NoopForwarder {
    async fn forward(&self, _record: &DeviceRecord) -> Result<(), ForwardError> {
        Ok(())
    }
}

/// Webhook 外发实现。
///
/// 共享一个 reqwest Client（内部连接池），超时由构造时固定。
#[derive(Clone)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    secret_key: String,
}

impl WebhookForwarder {
    pub fn new(
        url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ForwardError::Client(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            secret_key: secret_key.into(),
        })
    }

    async fn post_once(&self, record: &DeviceRecord) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .bearer_auth(&self.secret_key)
            .json(record)
            .send()
            .await
            .map_err(|err| ForwardError::Client(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ForwardError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// 关键事件用的重试投递：指数退避，基准 100ms、倍率 2。
    pub async fn forward_with_retry(
        &self,
        record: &DeviceRecord,
        max_attempts: u32,
    ) -> Result<(), ForwardError> {
        let mut backoff = Duration::from_millis(100);
        let mut last_err = ForwardError::Client("no attempt made".to_string());
        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.post_once(record).await {
                Ok(()) => {
                    record_record_forwarded();
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        target: "tgw.forward",
                        imei = %record.imei,
                        attempt = attempt + 1,
                        error = %err,
                        "webhook retry attempt failed"
                    );
                    last_err = err;
                }
            }
        }
        record_forward_failure();
        Err(last_err)
    }
}

#[async_trait]
impl Forwarder for WebhookForwarder {
    async fn forward(&self, record: &DeviceRecord) -> Result<(), ForwardError> {
        match self.post_once(record).await {
            Ok(()) => {
                record_record_forwarded();
                debug!(target: "tgw.forward", imei = %record.imei, "record forwarded");
                Ok(())
            }
            Err(err) => {
                record_forward_failure();
                warn!(target: "tgw.forward", imei = %record.imei, error = %err, "webhook forward failed");
                Err(err)
            }
        }
    }
}
