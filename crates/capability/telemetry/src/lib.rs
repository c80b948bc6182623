//! 日志初始化与运行计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 运行计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub raw_messages: u64,
    pub retained_skipped: u64,
    pub decode_failures: u64,
    pub unresolved_device_ids: u64,
    pub normalized_records: u64,
    pub records_written: u64,
    pub write_retries: u64,
    pub records_dropped: u64,
    pub backpressure: u64,
    pub broker_reconnects: u64,
    pub unflushed_records: u64,
}

/// 运行计数器。
pub struct TelemetryMetrics {
    raw_messages: AtomicU64,
    retained_skipped: AtomicU64,
    decode_failures: AtomicU64,
    unresolved_device_ids: AtomicU64,
    normalized_records: AtomicU64,
    records_written: AtomicU64,
    write_retries: AtomicU64,
    records_dropped: AtomicU64,
    backpressure: AtomicU64,
    broker_reconnects: AtomicU64,
    unflushed_records: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            raw_messages: AtomicU64::new(0),
            retained_skipped: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            unresolved_device_ids: AtomicU64::new(0),
            normalized_records: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
            broker_reconnects: AtomicU64::new(0),
            unflushed_records: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            raw_messages: self.raw_messages.load(Ordering::Relaxed),
            retained_skipped: self.retained_skipped.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unresolved_device_ids: self.unresolved_device_ids.load(Ordering::Relaxed),
            normalized_records: self.normalized_records.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            broker_reconnects: self.broker_reconnects.load(Ordering::Relaxed),
            unflushed_records: self.unflushed_records.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录入站消息次数。
pub fn record_raw_message() {
    metrics().raw_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录跳过的 retained 消息次数。
pub fn record_retained_skipped() {
    metrics().retained_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码/路由失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备标识无法解析次数。
pub fn record_unresolved_device_id() {
    metrics()
        .unresolved_device_ids
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录规范化输出次数。
pub fn record_normalized_record() {
    metrics().normalized_records.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入成功的记录条数。
pub fn record_records_written(count: u64) {
    metrics().records_written.fetch_add(count, Ordering::Relaxed);
}

/// 记录一次瞬时失败重试。
pub fn record_write_retry() {
    metrics().write_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录被丢弃的记录条数（永久失败或重试见顶）。
pub fn record_records_dropped(count: u64) {
    metrics().records_dropped.fetch_add(count, Ordering::Relaxed);
}

/// 记录背压次数。
pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 重连尝试次数。
pub fn record_broker_reconnect() {
    metrics().broker_reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录停机时未能落盘的记录条数。
pub fn record_unflushed_records(count: u64) {
    metrics().unflushed_records.fetch_add(count, Ordering::Relaxed);
}
