//! 报文解码：信标二进制帧与 JSON 传感器信封。
//!
//! 两个解码器都是纯函数，输出统一的 `DecodedReading`。结构性错误
//! （截断、未知版本、缺键、类型不符）返回错误；数值超出物理合理范围
//! 但可解码时原样通过，由下游自行判断。

pub mod binary;
pub mod envelope;

pub use binary::{FormatVersion, decode_frame};
pub use envelope::decode_envelope;

/// 解码错误。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(u8),
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid field type: {0}")]
    InvalidFieldType(String),
}
