//! 订阅生命周期与坏消息隔离
//!
//! 本模块把桥接的各个环节（MQTT 订阅、路由规范化、转发）串成完整的
//! 处理链路。监督器负责订阅生命周期：连接确认后订阅主题过滤器，断连
//! 后按封顶指数退避无限重连；每条入站消息在到达时打点，经
//! 路由 → 规范化 → 转发 处理。
//!
//! 最重要的不变量是逐条消息隔离：任何解码、路由、规范化错误只影响
//! 当前这一条消息（记录日志、计数、丢弃），订阅循环继续运行。一条
//! 畸形广播永远不会终止桥接。

use async_trait::async_trait;
use bridge_forward::{ForwardError, Forwarder};
use bridge_route::{Normalizer, RouteError};
use bridge_telemetry::{
    record_broker_reconnect, record_decode_failure, record_normalized_record, record_raw_message,
    record_retained_skipped, record_unresolved_device_id,
};
use domain::RawMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
}

/// RawMessage 处理器。
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn handle(&self, msg: RawMessage) -> Result<(), IngestError>;
}

/// 桥接处理器：路由 → 规范化 → 转发，并承担逐条消息隔离。
pub struct BridgeHandler {
    normalizer: Normalizer,
    forwarder: Forwarder,
}

impl BridgeHandler {
    pub fn new(normalizer: Normalizer, forwarder: Forwarder) -> Self {
        Self {
            normalizer,
            forwarder,
        }
    }
}

#[async_trait]
impl RawMessageHandler for BridgeHandler {
    async fn handle(&self, msg: RawMessage) -> Result<(), IngestError> {
        let record = match self.normalizer.normalize(&msg) {
            Ok(record) => record,
            Err(err) => {
                // 消息级错误：记录主题与截断的载荷预览后丢弃，循环继续。
                match &err {
                    RouteError::UnresolvedDeviceId(_) => record_unresolved_device_id(),
                    _ => record_decode_failure(),
                }
                warn!(
                    target: "bridge.ingest",
                    topic = %msg.topic,
                    payload = %payload_preview(&msg.payload),
                    error = %err,
                    "message_dropped"
                );
                return Ok(());
            }
        };
        record_normalized_record();

        let retry = record.clone();
        match self.forwarder.handle(record).await {
            Ok(_) => Ok(()),
            Err(ForwardError::Backpressure(reason)) => {
                // 背压：暂停消费，先清空缓冲再重新入队本条记录。
                warn!(target: "bridge.ingest", reason = %reason, "backpressure_pause");
                if let Err(err) = self.forwarder.flush().await {
                    warn!(target: "bridge.ingest", error = %err, "backpressure_flush_failed");
                }
                if let Err(err) = self.forwarder.handle(retry).await {
                    warn!(
                        target: "bridge.ingest",
                        topic = %msg.topic,
                        error = %err,
                        "forward_failed"
                    );
                }
                Ok(())
            }
            Err(err) => {
                // 永久失败或重试见顶只影响该批记录，不终止循环。
                warn!(
                    target: "bridge.ingest",
                    topic = %msg.topic,
                    error = %err,
                    "forward_failed"
                );
                Ok(())
            }
        }
    }
}

/// MQTT 订阅配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

/// 桥接监督器：持有订阅生命周期，把入站消息交给处理器。
pub struct BridgeSupervisor {
    config: MqttSourceConfig,
    handler: Arc<dyn RawMessageHandler>,
    shutdown: watch::Receiver<bool>,
}

impl BridgeSupervisor {
    pub fn new(
        config: MqttSourceConfig,
        handler: Arc<dyn RawMessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            handler,
            shutdown,
        }
    }

    /// 运行订阅循环，直到收到停机信号才返回。
    pub async fn run(self) -> Result<(), IngestError> {
        let BridgeSupervisor {
            config,
            handler,
            mut shutdown,
        } = self;

        let client_id = format!("bridge-{}", uuid::Uuid::new_v4().simple());
        let mut options = rumqttc::MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 10);
        let mut reconnect_delay_ms = config.reconnect_initial_ms;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(target: "bridge.ingest", "shutdown_release_subscription");
                        let _ = client.disconnect().await;
                        return Ok(());
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        // 在 ConnAck 时订阅：断线重连后订阅随之恢复。
                        info!(
                            target: "bridge.ingest",
                            topic = %config.topic,
                            "broker_connected"
                        );
                        reconnect_delay_ms = config.reconnect_initial_ms;
                        if let Err(err) = client
                            .subscribe(config.topic.clone(), rumqttc::QoS::AtMostOnce)
                            .await
                        {
                            warn!(target: "bridge.ingest", error = %err, "subscribe_failed");
                        }
                    }
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                        if publish.retain {
                            record_retained_skipped();
                            info!(
                                target: "bridge.ingest",
                                topic = %publish.topic,
                                "retained_message_skipped"
                            );
                            continue;
                        }
                        record_raw_message();
                        // 到达时间由这里打点，不取 broker 时间。
                        let msg = RawMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                            received_at_ms: now_epoch_ms(),
                        };
                        if let Err(err) = handler.handle(msg).await {
                            warn!(
                                target: "bridge.ingest",
                                topic = %publish.topic,
                                error = %err,
                                "handler_failed"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        // broker 断连是唯一的无上限重试：退避封顶后一直重连。
                        record_broker_reconnect();
                        warn!(
                            target: "bridge.ingest",
                            error = %err,
                            delay_ms = reconnect_delay_ms,
                            "broker_reconnect"
                        );
                        tokio::time::sleep(Duration::from_millis(reconnect_delay_ms)).await;
                        reconnect_delay_ms = reconnect_delay_ms
                            .saturating_mul(2)
                            .min(config.reconnect_max_ms);
                    }
                }
            }
        }
    }
}

/// 载荷预览：按字符截断，畸形字节做 lossy 转换。
fn payload_preview(payload: &[u8]) -> String {
    const PREVIEW_CHARS: usize = 64;
    let text = String::from_utf8_lossy(payload);
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
