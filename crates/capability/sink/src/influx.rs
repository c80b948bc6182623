//! InfluxDB v2 `/api/v2/write` HTTP 写入端。

use crate::line::render_line;
use crate::{RecordSink, SinkError};
use async_trait::async_trait;
use domain::NormalizedRecord;
use std::time::Duration;
use tracing::debug;

/// InfluxDB 连接配置。
#[derive(Debug, Clone)]
pub struct InfluxSinkConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub timeout_ms: u64,
}

/// InfluxDB v2 写入端。
pub struct InfluxSink {
    http: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxSink {
    pub fn new(config: InfluxSinkConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| SinkError::Permanent(format!("http client init failed: {}", err)))?;
        let write_url = format!("{}/api/v2/write", config.url.trim_end_matches('/'));
        Ok(Self {
            http,
            write_url,
            org: config.org,
            bucket: config.bucket,
            token: config.token,
        })
    }
}

#[async_trait]
impl RecordSink for InfluxSink {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let body = records.iter().map(render_line).collect::<Vec<_>>().join("\n");
        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            // 超时、连接被拒等传输层错误都属于瞬时失败。
            .map_err(|err| SinkError::Transient(format!("write request failed: {}", err)))?;

        let status = response.status();
        if status.is_success() {
            debug!(target: "bridge.sink", lines = records.len(), "influx_write_ok");
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &detail))
    }
}

/// HTTP 状态分类：429 与 5xx 为瞬时失败，其余 4xx（鉴权失败、写请求
/// 格式错误等）为永久失败。
pub fn classify_status(status: u16, detail: &str) -> SinkError {
    if status == 429 || status >= 500 {
        SinkError::Transient(format!("influx returned {}: {}", status, detail))
    } else {
        SinkError::Permanent(format!("influx returned {}: {}", status, detail))
    }
}
