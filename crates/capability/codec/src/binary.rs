//! 信标广播帧解码。
//!
//! 帧首字节为格式版本号，版本集合封闭为 {3, 5}：
//!
//! - 格式 3（14 字节）：湿度（半百分比）、温度（符号位 + 整数 + 百分数小数）、
//!   气压（u16 偏移 +50000 Pa）、三轴加速度（i16，mg）、电池电压（u16，mV）。
//! - 格式 5（24 字节）：温度（i16，0.005 °C）、湿度（u16，0.0025 %）、
//!   气压（同偏移）、三轴加速度、11 位电池电压（偏移 +1600 mV）与
//!   5 位发射功率（−40 起步、步长 2 dBm）的打包字段、运动计数器、
//!   测量序号、48 位设备标识。
//!
//! 格式 5 每个字段有各自的"不可用"哨兵编码，命中哨兵的字段按缺失处理，
//! 不产出伪极值。

use crate::DecodeError;
use domain::DecodedReading;
use std::collections::BTreeMap;

/// 二进制帧格式版本（封闭枚举）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V3,
    V5,
}

impl FormatVersion {
    /// 依据帧首字节识别版本。
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(FormatVersion::V3),
            5 => Some(FormatVersion::V5),
            _ => None,
        }
    }

    /// 该版本定长布局所需的最小字节数（含版本字节）。
    pub fn frame_len(self) -> usize {
        match self {
            FormatVersion::V3 => 14,
            FormatVersion::V5 => 24,
        }
    }
}

/// 解码一条信标广播帧。
///
/// 仅在结构性违规（截断、未知版本）时失败；可解码但超出常理的数值
/// 原样通过。
pub fn decode_frame(frame: &[u8]) -> Result<DecodedReading, DecodeError> {
    let tag = *frame.first().ok_or(DecodeError::TruncatedFrame {
        expected: 1,
        actual: 0,
    })?;
    let version = FormatVersion::from_tag(tag).ok_or(DecodeError::UnsupportedFormat(tag))?;
    if frame.len() < version.frame_len() {
        return Err(DecodeError::TruncatedFrame {
            expected: version.frame_len(),
            actual: frame.len(),
        });
    }
    match version {
        FormatVersion::V3 => Ok(decode_v3(frame)),
        FormatVersion::V5 => Ok(decode_v5(frame)),
    }
}

fn decode_v3(frame: &[u8]) -> DecodedReading {
    let mut fields = BTreeMap::new();

    fields.insert("humidity".to_string(), round2(f64::from(frame[1]) / 2.0));

    // 温度：首字节最高位为符号位，次字节为百分数小数部分。
    let sign = if frame[2] & 0x80 != 0 { -1.0 } else { 1.0 };
    let temperature = sign * (f64::from(frame[2] & 0x7F) + f64::from(frame[3]) / 100.0);
    fields.insert("temperature".to_string(), round2(temperature));

    let pressure_raw = u16::from_be_bytes([frame[4], frame[5]]);
    fields.insert(
        "pressure".to_string(),
        round2((f64::from(pressure_raw) + 50_000.0) / 100.0),
    );

    let ax = f64::from(i16::from_be_bytes([frame[6], frame[7]]));
    let ay = f64::from(i16::from_be_bytes([frame[8], frame[9]]));
    let az = f64::from(i16::from_be_bytes([frame[10], frame[11]]));
    fields.insert("acceleration_x".to_string(), ax);
    fields.insert("acceleration_y".to_string(), ay);
    fields.insert("acceleration_z".to_string(), az);
    // 合加速度是派生字段：三轴的欧几里得范数。
    fields.insert(
        "acceleration".to_string(),
        (ax * ax + ay * ay + az * az).sqrt(),
    );

    let battery = u16::from_be_bytes([frame[12], frame[13]]);
    fields.insert("battery".to_string(), f64::from(battery));

    DecodedReading {
        device_id: None,
        format: Some(3),
        fields,
        tags: BTreeMap::new(),
    }
}

fn decode_v5(frame: &[u8]) -> DecodedReading {
    let mut fields = BTreeMap::new();

    let temperature_raw = i16::from_be_bytes([frame[1], frame[2]]);
    if temperature_raw != i16::MIN {
        fields.insert(
            "temperature".to_string(),
            round2(f64::from(temperature_raw) * 0.005),
        );
    }

    let humidity_raw = u16::from_be_bytes([frame[3], frame[4]]);
    if humidity_raw != u16::MAX {
        fields.insert(
            "humidity".to_string(),
            round2(f64::from(humidity_raw) * 0.0025),
        );
    }

    let pressure_raw = u16::from_be_bytes([frame[5], frame[6]]);
    if pressure_raw != u16::MAX {
        fields.insert(
            "pressure".to_string(),
            round2((f64::from(pressure_raw) + 50_000.0) / 100.0),
        );
    }

    let axes = [
        ("acceleration_x", i16::from_be_bytes([frame[7], frame[8]])),
        ("acceleration_y", i16::from_be_bytes([frame[9], frame[10]])),
        ("acceleration_z", i16::from_be_bytes([frame[11], frame[12]])),
    ];
    let mut all_axes_present = true;
    for (name, raw) in axes {
        if raw == i16::MIN {
            all_axes_present = false;
        } else {
            fields.insert(name.to_string(), f64::from(raw));
        }
    }
    // 任一轴缺失时合加速度不可派生。
    if all_axes_present {
        let norm = axes
            .iter()
            .map(|(_, raw)| {
                let v = f64::from(*raw);
                v * v
            })
            .sum::<f64>()
            .sqrt();
        fields.insert("acceleration".to_string(), norm);
    }

    // 电源信息打包字段：高 11 位电池电压，低 5 位发射功率。
    let power = u16::from_be_bytes([frame[13], frame[14]]);
    let battery_raw = power >> 5;
    if battery_raw != 0x07FF {
        fields.insert("battery".to_string(), f64::from(battery_raw) + 1_600.0);
    }
    let tx_power_raw = power & 0x1F;
    if tx_power_raw != 0x1F {
        fields.insert(
            "tx_power".to_string(),
            f64::from(tx_power_raw) * 2.0 - 40.0,
        );
    }

    if frame[15] != u8::MAX {
        fields.insert("movement_counter".to_string(), f64::from(frame[15]));
    }

    let sequence = u16::from_be_bytes([frame[16], frame[17]]);
    if sequence != u16::MAX {
        fields.insert(
            "measurement_sequence_number".to_string(),
            f64::from(sequence),
        );
    }

    // 设备标识：48 位，渲染为无分隔符的小写十六进制。
    let mac = hex::encode(&frame[18..24]);
    let device_id = if mac == "ffffffffffff" { None } else { Some(mac) };

    DecodedReading {
        device_id,
        format: Some(5),
        fields,
        tags: BTreeMap::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
