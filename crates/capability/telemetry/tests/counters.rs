use bridge_telemetry::{
    metrics, record_raw_message, record_records_dropped, record_records_written,
    record_write_retry,
};

#[test]
fn counters_accumulate_into_snapshot() {
    // 计数器是全局的，断言用差值以免受其它用例影响。
    let before = metrics().snapshot();
    record_raw_message();
    record_records_written(3);
    record_records_dropped(2);
    record_write_retry();
    let after = metrics().snapshot();
    assert_eq!(after.raw_messages - before.raw_messages, 1);
    assert_eq!(after.records_written - before.records_written, 3);
    assert_eq!(after.records_dropped - before.records_dropped, 2);
    assert_eq!(after.write_retries - before.write_retries, 1);
}
