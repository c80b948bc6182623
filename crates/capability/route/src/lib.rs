//! 主题路由与规范化。
//!
//! 路由器按构造时选定的解码模式拆开载荷并调用对应解码器；规范化器把
//! 解码输出、主题兜底标识与到达时间合成 `NormalizedRecord`。设备标识
//! 解析次序固定：载荷内嵌标识优先于主题推导标识。

use bridge_codec::{DecodeError, decode_envelope, decode_frame};
use domain::{DecodeMode, DecodedReading, NormalizedRecord, RawMessage};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::warn;

/// 路由与规范化错误。
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("unresolved device id for topic: {0}")]
    UnresolvedDeviceId(String),
}

/// 主题路由器：解码模式在构造时固定。
#[derive(Debug, Clone, Copy)]
pub struct TopicRouter {
    mode: DecodeMode,
}

impl TopicRouter {
    pub fn new(mode: DecodeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// 按模式解码载荷。
    pub fn decode(&self, msg: &RawMessage) -> Result<DecodedReading, RouteError> {
        match self.mode {
            DecodeMode::JsonSensor => Ok(decode_envelope(&msg.payload)?),
            DecodeMode::Ruuvi => {
                let text = std::str::from_utf8(&msg.payload)
                    .map_err(|err| RouteError::Payload(format!("payload is not utf-8: {}", err)))?;
                // 线格式 "<unix-ts>:<hex 帧>"。epoch 仅校验格式；
                // 时间戳取消息到达时间。
                let (epoch, raw) = text
                    .split_once(':')
                    .ok_or_else(|| RouteError::Payload("missing ':' separator".to_string()))?;
                epoch
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| RouteError::Payload(format!("invalid epoch: {}", epoch)))?;
                let frame = hex::decode(raw.trim())
                    .map_err(|err| RouteError::Payload(format!("invalid hex frame: {}", err)))?;
                Ok(decode_frame(&frame)?)
            }
        }
    }

    /// 主题兜底设备标识：`prefix/<deviceId>/sensorType/...` 的第二段，
    /// 去掉冒号。段数不足三段时没有兜底标识。
    pub fn fallback_device_id(topic: &str) -> Option<String> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() < 3 {
            return None;
        }
        let device_id = segments[1].replace(':', "");
        if device_id.is_empty() {
            return None;
        }
        Some(device_id)
    }
}

/// 规范化器：解码输出 + 兜底标识 + 到达时间 -> NormalizedRecord。
#[derive(Debug, Clone)]
pub struct Normalizer {
    router: TopicRouter,
    measurement: String,
}

impl Normalizer {
    pub fn new(mode: DecodeMode, measurement: impl Into<String>) -> Self {
        Self {
            router: TopicRouter::new(mode),
            measurement: measurement.into(),
        }
    }

    pub fn normalize(&self, msg: &RawMessage) -> Result<NormalizedRecord, RouteError> {
        let reading = self.router.decode(msg)?;
        let fallback = TopicRouter::fallback_device_id(&msg.topic);
        // 解析次序固定：载荷内嵌标识优先于主题推导标识。
        let device_id = reading
            .device_id
            .or(fallback)
            .ok_or_else(|| RouteError::UnresolvedDeviceId(msg.topic.clone()))?;

        let mut fields = reading.fields;
        if let DecodeMode::Ruuvi = self.router.mode() {
            if let Some(format) = reading.format {
                merge_reserved_field(&mut fields, "data_format", f64::from(format), &msg.topic);
            }
        }

        Ok(NormalizedRecord {
            measurement: self.measurement.clone(),
            device_id,
            ts_ms: msg.received_at_ms,
            fields,
            tags: reading.tags,
        })
    }
}

/// 合并来源字段。解码器输出与保留字段同名时保留解码器的值，并记录
/// 一次冲突，不做无痕覆盖。
fn merge_reserved_field(fields: &mut BTreeMap<String, f64>, name: &str, value: f64, topic: &str) {
    match fields.entry(name.to_string()) {
        Entry::Occupied(_) => {
            warn!(
                target: "bridge.route",
                field = name,
                topic = %topic,
                "reserved_field_collision_decoder_value_kept"
            );
        }
        Entry::Vacant(entry) => {
            entry.insert(value);
        }
    }
}
