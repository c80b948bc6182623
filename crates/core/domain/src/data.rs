use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 解码模式：桥接实例构造时固定，不随消息切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// JSON 信封（mac/sensor/data 三键结构）。
    JsonSensor,
    /// 信标二进制帧（`"<unix-ts>:<hex 帧>"` 线格式）。
    Ruuvi,
}

impl FromStr for DecodeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "jsonsensor" => Ok(DecodeMode::JsonSensor),
            "ruuvi" => Ok(DecodeMode::Ruuvi),
            other => Err(format!("unknown decode mode: {}", other)),
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::JsonSensor => write!(f, "jsonsensor"),
            DecodeMode::Ruuvi => write!(f, "ruuvi"),
        }
    }
}

/// 入站原始消息。`received_at_ms` 由订阅端在到达时打点，不取 broker 时间。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 解码输出：字段名到有限浮点值的映射，外加线格式自带的设备标识与来源信息。
#[derive(Debug, Clone, Default)]
pub struct DecodedReading {
    /// 载荷内嵌的设备标识（格式 5 帧与 JSON 信封携带，格式 3 帧没有）。
    pub device_id: Option<String>,
    /// 二进制帧的格式版本号（JSON 信封为 None）。
    pub format: Option<u8>,
    pub fields: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}

/// 规范化记录：交给写入端的最小单元，构造后不再修改。
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// 测量名来自配置，不取消息内容。
    pub measurement: String,
    pub device_id: String,
    /// 消息到达时间（两种线格式都不保证内嵌时间戳）。
    pub ts_ms: i64,
    pub fields: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}
