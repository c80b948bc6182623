//! 桥接守护进程：装配 订阅 → 规范化 → 转发 → 写入 链路，
//! 并暴露 /health 与 /metrics 两个观测端点。

use axum::{Json, Router, response::IntoResponse, routing::get};
use bridge_config::AppConfig;
use bridge_forward::{Forwarder, ForwarderConfig};
use bridge_ingest::{BridgeHandler, BridgeSupervisor, MqttSourceConfig};
use bridge_route::Normalizer;
use bridge_sink::{InfluxSink, InfluxSinkConfig};
use bridge_telemetry::{init_tracing, metrics, record_unflushed_records};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 写入端与转发器
    let sink = Arc::new(InfluxSink::new(InfluxSinkConfig {
        url: config.influx_url.clone(),
        org: config.influx_org.clone(),
        bucket: config.influx_bucket.clone(),
        token: config.influx_token.clone(),
        timeout_ms: config.influx_timeout_ms,
    })?);
    let forwarder = Forwarder::with_config(
        sink,
        ForwarderConfig {
            batch_size: config.batch_size,
            max_buffer_size: config.max_buffer_size,
            max_retries: config.max_retries,
            backoff_initial_ms: config.backoff_initial_ms,
            backoff_max_ms: config.backoff_max_ms,
        },
    );

    // 规范化器：解码模式与测量名在启动时固定
    let normalizer = Normalizer::new(config.decode_mode, config.measurement.clone());
    let handler = Arc::new(BridgeHandler::new(normalizer, forwarder.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 定时刷新：不足一批的记录也按期写出
    let flush_forwarder = forwarder.clone();
    let mut flush_shutdown = shutdown_rx.clone();
    let flush_interval_ms = config.flush_interval_ms;
    let flusher = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(flush_interval_ms)) => {
                    match flush_forwarder.flush().await {
                        Ok(0) => {}
                        Ok(count) => {
                            info!(target: "bridge.forward", flushed = count, "buffer_flushed");
                        }
                        Err(err) => {
                            warn!(target: "bridge.forward", error = %err, "flush_failed");
                        }
                    }
                }
                _ = flush_shutdown.changed() => break,
            }
        }
    });

    info!(
        mode = %config.decode_mode,
        topic = %config.mqtt_topic,
        host = %config.mqtt_host,
        port = config.mqtt_port,
        "bridge_starting"
    );
    let supervisor = BridgeSupervisor::new(
        MqttSourceConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            topic: config.mqtt_topic.clone(),
            reconnect_initial_ms: config.mqtt_reconnect_initial_ms,
            reconnect_max_ms: config.mqtt_reconnect_max_ms,
        },
        handler,
        shutdown_rx.clone(),
    );
    let bridge = tokio::spawn(async move { supervisor.run().await });

    // 观测端点：健康检查与计数器快照
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot));
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "observability_listening");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "http_server_stopped");
        }
    });

    // 停机次序：停止消费 → 等在途重试收尾 → 终刷缓冲 → 退出
    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);
    if let Err(err) = bridge.await? {
        warn!(error = %err, "bridge_stopped_with_error");
    }
    let _ = flusher.await;

    let pending = forwarder.pending().await;
    if pending > 0 {
        match forwarder.flush().await {
            Ok(count) => info!(flushed = count, "shutdown_flush_complete"),
            Err(err) => {
                // 终刷失败的记录不能无痕消失：计数并留日志。
                record_unflushed_records(pending as u64);
                warn!(unflushed = pending, error = %err, "shutdown_flush_failed");
            }
        }
    }
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics_snapshot() -> impl IntoResponse {
    let snapshot = metrics().snapshot();
    Json(serde_json::json!({
        "raw_messages": snapshot.raw_messages,
        "retained_skipped": snapshot.retained_skipped,
        "decode_failures": snapshot.decode_failures,
        "unresolved_device_ids": snapshot.unresolved_device_ids,
        "normalized_records": snapshot.normalized_records,
        "records_written": snapshot.records_written,
        "write_retries": snapshot.write_retries,
        "records_dropped": snapshot.records_dropped,
        "backpressure": snapshot.backpressure,
        "broker_reconnects": snapshot.broker_reconnects,
        "unflushed_records": snapshot.unflushed_records,
    }))
}
