//! JSON 传感器信封解码。
//!
//! 信封必须携带 `mac`（设备标识）、`sensor`（传感器种类）与 `data`
//! （测量名到数值的扁平映射）三个键；可选的顶层 `sn`、`id` 字符串键
//! 作为附加标签保留。类型不符直接拒绝，不做隐式转换。

use crate::DecodeError;
use domain::DecodedReading;
use std::collections::BTreeMap;

/// 解码一条 JSON 传感器信封。
pub fn decode_envelope(payload: &[u8]) -> Result<DecodedReading, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::InvalidFieldType(format!("payload is not valid json: {}", err)))?;
    let root = value
        .as_object()
        .ok_or_else(|| DecodeError::InvalidFieldType("top level is not an object".to_string()))?;

    let mac = required_string(root, "mac")?;
    let sensor = required_string(root, "sensor")?;

    let data = root
        .get("data")
        .ok_or_else(|| DecodeError::MissingField("data".to_string()))?;
    let data = data
        .as_object()
        .ok_or_else(|| DecodeError::InvalidFieldType("data is not an object".to_string()))?;
    if data.is_empty() {
        return Err(DecodeError::InvalidFieldType("data is empty".to_string()));
    }

    let mut fields = BTreeMap::new();
    for (name, entry) in data {
        let number = entry
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                DecodeError::InvalidFieldType(format!("data.{} is not a finite number", name))
            })?;
        fields.insert(name.clone(), number);
    }

    let mut tags = BTreeMap::new();
    tags.insert("sensor".to_string(), sensor);
    for key in ["sn", "id"] {
        if let Some(entry) = root.get(key) {
            let tag = entry.as_str().ok_or_else(|| {
                DecodeError::InvalidFieldType(format!("{} is not a string", key))
            })?;
            tags.insert(key.to_string(), tag.to_string());
        }
    }

    Ok(DecodedReading {
        device_id: Some(mac),
        format: None,
        fields,
        tags,
    })
}

fn required_string(
    root: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<String, DecodeError> {
    let value = root
        .get(key)
        .ok_or_else(|| DecodeError::MissingField(key.to_string()))?;
    value
        .as_str()
        .map(|v| v.to_string())
        .ok_or_else(|| DecodeError::InvalidFieldType(format!("{} is not a string", key)))
}
