//! 时序写入端：行协议渲染与 InfluxDB v2 HTTP 写入。
//!
//! 核心只依赖"提交记录、得到 成功/瞬时失败/永久失败"这一窄接口；
//! 具体传输是 `/api/v2/write` 行协议 HTTP 请求。

pub mod influx;
pub mod line;

pub use influx::{InfluxSink, InfluxSinkConfig};
pub use line::render_line;

use async_trait::async_trait;
use domain::NormalizedRecord;

/// 写入失败分类。瞬时失败预期重试最终成功；永久失败重试不会改变结果。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transient sink failure: {0}")]
    Transient(String),
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

/// 记录写入抽象。
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<(), SinkError>;
}

/// 空写入端（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl RecordSink for NoopSink {
    async fn write(&self, _records: &[NormalizedRecord]) -> Result<(), SinkError> {
        Ok(())
    }
}
