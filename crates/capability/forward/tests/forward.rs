use async_trait::async_trait;
use bridge_forward::{ForwardError, Forwarder, ForwarderConfig};
use bridge_sink::{RecordSink, SinkError};
use domain::NormalizedRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

fn sample_record(device_id: &str) -> NormalizedRecord {
    let mut fields = BTreeMap::new();
    fields.insert("temperature".to_string(), 21.5);
    NormalizedRecord {
        measurement: "sensors".to_string(),
        device_id: device_id.to_string(),
        ts_ms: 1_700_000_000_000,
        fields,
        tags: BTreeMap::new(),
    }
}

fn config(batch_size: usize, max_buffer_size: usize, max_retries: usize) -> ForwarderConfig {
    ForwarderConfig {
        batch_size,
        max_buffer_size,
        max_retries,
        backoff_initial_ms: 1,
        backoff_max_ms: 4,
    }
}

#[derive(Default)]
struct CountingSink {
    batches: Mutex<Vec<usize>>,
}

#[async_trait]
impl RecordSink for CountingSink {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        self.batches.lock().await.push(records.len());
        Ok(())
    }
}

/// 先瞬时失败 N 次，之后一直成功。
struct FlakySink {
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakySink {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordSink for FlakySink {
    async fn write(&self, _records: &[NormalizedRecord]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Transient("busy".to_string()));
        }
        Ok(())
    }
}

struct PermanentSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl RecordSink for PermanentSink {
    async fn write(&self, _records: &[NormalizedRecord]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Permanent("unauthorized".to_string()))
    }
}

/// 每次写都要先拿到一个许可，用于在测试里卡住在写批次。
struct BlockingSink {
    permits: Arc<Semaphore>,
    batches: Mutex<Vec<usize>>,
}

#[async_trait]
impl RecordSink for BlockingSink {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| SinkError::Permanent(err.to_string()))?;
        permit.forget();
        self.batches.lock().await.push(records.len());
        Ok(())
    }
}

#[tokio::test]
async fn forwarder_batches_records() {
    let sink = Arc::new(CountingSink::default());
    let forwarder = Forwarder::with_config(sink.clone(), config(2, 10, 1));

    let first = forwarder.handle(sample_record("dev-1")).await.expect("queued");
    assert!(!first.written);
    assert_eq!(first.reason.as_deref(), Some("queued"));

    let second = forwarder.handle(sample_record("dev-2")).await.expect("written");
    assert!(second.written);

    let batches = sink.batches.lock().await;
    assert_eq!(batches.as_slice(), &[2]);
}

#[tokio::test]
async fn flush_writes_partial_batch() {
    let sink = Arc::new(CountingSink::default());
    let forwarder = Forwarder::with_config(sink.clone(), config(100, 1000, 1));

    forwarder.handle(sample_record("dev-1")).await.expect("queued");
    forwarder.handle(sample_record("dev-2")).await.expect("queued");
    assert_eq!(forwarder.pending().await, 2);

    let flushed = forwarder.flush().await.expect("flushed");
    assert_eq!(flushed, 2);
    assert_eq!(forwarder.pending().await, 0);

    let batches = sink.batches.lock().await;
    assert_eq!(batches.as_slice(), &[2]);
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let sink = Arc::new(FlakySink::new(2));
    let forwarder = Forwarder::with_config(sink.clone(), config(1, 10, 3));

    let result = forwarder.handle(sample_record("dev-1")).await.expect("written");
    assert!(result.written);
    // 失败 2 次后第 3 次成功：尝试次数 K+1。
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_ceiling_drops_batch() {
    let sink = Arc::new(FlakySink::new(usize::MAX));
    let forwarder = Forwarder::with_config(sink.clone(), config(1, 10, 2));

    let err = forwarder.handle(sample_record("dev-1")).await.expect_err("ceiling");
    assert!(matches!(err, ForwardError::RetryCeiling(_)));
    // 首次尝试 + 2 次重试，之后批次被丢弃。
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(forwarder.pending().await, 0);
    assert_eq!(forwarder.flush().await.expect("empty"), 0);
}

#[tokio::test]
async fn permanent_failure_drops_without_retry() {
    let sink = Arc::new(PermanentSink {
        attempts: AtomicUsize::new(0),
    });
    let forwarder = Forwarder::with_config(sink.clone(), config(1, 10, 5));

    let err = forwarder.handle(sample_record("dev-1")).await.expect_err("dropped");
    assert!(matches!(err, ForwardError::Sink(_)));
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(forwarder.pending().await, 0);
}

#[tokio::test]
async fn full_buffer_reports_backpressure_while_write_in_flight() {
    let permits = Arc::new(Semaphore::new(0));
    let sink = Arc::new(BlockingSink {
        permits: permits.clone(),
        batches: Mutex::new(Vec::new()),
    });
    let forwarder = Forwarder::with_config(sink.clone(), config(1, 3, 1));

    // 第一条记录进入在写批次并卡在写入端。
    let in_flight = {
        let forwarder = forwarder.clone();
        tokio::spawn(async move { forwarder.handle(sample_record("dev-0")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // 在写期间记录在缓冲里累积，直到顶到缓冲上限。
    for index in 0..3 {
        let result = forwarder
            .handle(sample_record(&format!("dev-{}", index + 1)))
            .await
            .expect("queued");
        assert!(!result.written);
    }
    let err = forwarder.handle(sample_record("dev-4")).await.expect_err("full");
    assert!(matches!(err, ForwardError::Backpressure(_)));

    // 放行写入端：在写任务的排空循环把累积的记录一并写出。
    permits.add_permits(16);
    in_flight.await.expect("join").expect("written");
    assert_eq!(forwarder.pending().await, 0);
    assert_eq!(forwarder.flush().await.expect("empty"), 0);
    assert_eq!(sink.batches.lock().await.len(), 4);
}
