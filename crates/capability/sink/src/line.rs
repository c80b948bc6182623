//! InfluxDB v2 行协议渲染。
//!
//! 行格式：
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//! 时间戳为毫秒精度，写入请求需带 `precision=ms`。

use domain::NormalizedRecord;

/// 把一条规范化记录渲染为一行行协议文本。
///
/// 标签与字段按键名排序输出；历史约定的主标识标签名为 `dev-id`。
pub fn render_line(record: &NormalizedRecord) -> String {
    let mut tags = record.tags.clone();
    tags.insert("dev-id".to_string(), record.device_id.clone());

    let mut line = escape_measurement(&record.measurement);
    for (key, value) in &tags {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }

    line.push(' ');
    for (index, (key, value)) in record.fields.iter().enumerate() {
        if index > 0 {
            line.push(',');
        }
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&format!("{}", value));
    }

    line.push(' ');
    line.push_str(&record.ts_ms.to_string());
    line
}

/// 测量名转义：逗号与空格。
fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

/// 标签键/标签值/字段键转义：逗号、等号与空格。
fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
