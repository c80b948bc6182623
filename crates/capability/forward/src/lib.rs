//! 转发：缓冲规范化记录，批量写入时序端，瞬时失败指数退避重试。
//!
//! 交付语义是至少一次：确认丢失后的重试可能产生重复写入。永久失败
//! 或重试见顶的批次被丢弃并计数，错误上浮给调用方但不终止流水线。
//!
//! 同一时刻只有一个批次在写（写闸门串行化），保证记录按到达顺序
//! 落盘；在写批次期间新记录在有界缓冲里累积，缓冲满即返回背压错误，
//! 由调用方暂停消费并刷新，而不是无界增长。

use bridge_sink::{RecordSink, SinkError};
use bridge_telemetry::{
    record_backpressure, record_records_dropped, record_records_written, record_write_retry,
};
use domain::NormalizedRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 转发错误。
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("sink rejected batch: {0}")]
    Sink(String),
    #[error("retry ceiling exceeded: {0}")]
    RetryCeiling(String),
    #[error("backpressure: {0}")]
    Backpressure(String),
}

/// 转发参数。
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub max_retries: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_buffer_size: 1000,
            max_retries: 3,
            backoff_initial_ms: 200,
            backoff_max_ms: 5000,
        }
    }
}

impl ForwarderConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.max_buffer_size < self.batch_size {
            self.max_buffer_size = self.batch_size;
        }
        self
    }
}

/// 单条记录的转发结果。
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub device_id: String,
    pub written: bool,
    pub reason: Option<String>,
}

struct ForwarderInner {
    sink: Arc<dyn RecordSink>,
    config: ForwarderConfig,
    buffer: Mutex<Vec<NormalizedRecord>>,
    /// 写闸门：串行化批量写，保持记录的到达顺序。
    write_gate: Mutex<()>,
}

/// 转发入口。
#[derive(Clone)]
pub struct Forwarder {
    inner: Arc<ForwarderInner>,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self::with_config(sink, ForwarderConfig::default())
    }

    pub fn with_config(sink: Arc<dyn RecordSink>, config: ForwarderConfig) -> Self {
        let inner = ForwarderInner {
            sink,
            config: config.sanitized(),
            buffer: Mutex::new(Vec::new()),
            write_gate: Mutex::new(()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// 接收一条规范化记录：入缓冲，攒满一批且没有在写批次时写出。
    pub async fn handle(&self, record: NormalizedRecord) -> Result<ForwardResult, ForwardError> {
        let device_id = record.device_id.clone();

        {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.len() >= self.inner.config.max_buffer_size {
                record_backpressure();
                return Err(ForwardError::Backpressure("buffer full".to_string()));
            }
            buffer.push(record);
            if buffer.len() < self.inner.config.batch_size {
                return Ok(ForwardResult {
                    device_id,
                    written: false,
                    reason: Some("queued".to_string()),
                });
            }
        }

        match self.inner.write_gate.try_lock() {
            Ok(_gate) => {
                self.drain().await?;
                Ok(ForwardResult {
                    device_id,
                    written: true,
                    reason: None,
                })
            }
            // 有批次在写：记录留在缓冲里，等在写批次完成后的下一次
            // 触发或定时刷新写出。
            Err(_) => Ok(ForwardResult {
                device_id,
                written: false,
                reason: Some("queued".to_string()),
            }),
        }
    }

    /// 等待在写批次完成后清空缓冲，返回写出的记录条数。
    pub async fn flush(&self) -> Result<usize, ForwardError> {
        let _gate = self.inner.write_gate.lock().await;
        self.drain().await
    }

    /// 当前缓冲的记录条数。
    pub async fn pending(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    /// 按批取出缓冲内容并写出。调用方必须持有写闸门。
    async fn drain(&self) -> Result<usize, ForwardError> {
        let mut written = 0usize;
        loop {
            let batch = {
                let mut buffer = self.inner.buffer.lock().await;
                if buffer.is_empty() {
                    break;
                }
                let take = buffer.len().min(self.inner.config.batch_size);
                buffer.drain(..take).collect::<Vec<_>>()
            };
            let count = batch.len();
            self.write_with_retry(batch).await?;
            written += count;
        }
        Ok(written)
    }

    async fn write_with_retry(&self, batch: Vec<NormalizedRecord>) -> Result<(), ForwardError> {
        let mut attempt = 0usize;
        let mut delay_ms = self.inner.config.backoff_initial_ms;
        loop {
            match self.inner.sink.write(&batch).await {
                Ok(()) => {
                    record_records_written(batch.len() as u64);
                    return Ok(());
                }
                Err(SinkError::Permanent(message)) => {
                    record_records_dropped(batch.len() as u64);
                    warn!(
                        target: "bridge.forward",
                        dropped = batch.len(),
                        first_device_id = %batch.first().map(|r| r.device_id.as_str()).unwrap_or(""),
                        error = %message,
                        "sink_permanent_failure"
                    );
                    return Err(ForwardError::Sink(message));
                }
                Err(SinkError::Transient(message)) => {
                    attempt += 1;
                    if attempt > self.inner.config.max_retries {
                        // 重试见顶后按永久失败处理：丢弃本批，计数上浮。
                        record_records_dropped(batch.len() as u64);
                        warn!(
                            target: "bridge.forward",
                            dropped = batch.len(),
                            attempts = attempt,
                            error = %message,
                            "retry_ceiling_exceeded"
                        );
                        return Err(ForwardError::RetryCeiling(message));
                    }
                    record_write_retry();
                    info!(
                        target: "bridge.forward",
                        attempt = attempt,
                        delay_ms = delay_ms,
                        error = %message,
                        "sink_transient_retry"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = delay_ms.saturating_mul(2).min(self.inner.config.backoff_max_ms);
                }
            }
        }
    }
}
