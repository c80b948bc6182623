use bridge_config::{AppConfig, ConfigError};
use domain::DecodeMode;

// 环境变量是进程级状态，放在同一个用例里顺序执行，避免并发测试互相干扰。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("BRIDGE_FORMAT", "ruuvi");
        std::env::set_var("BRIDGE_MEASUREMENT", "ruuvitag");
        std::env::set_var("BRIDGE_MQTT_TOPIC", "home/+/RuuviTag/RAW");
        std::env::set_var("BRIDGE_INFLUX_URL", "http://localhost:8086");
        std::env::set_var("BRIDGE_INFLUX_ORG", "fvh");
        std::env::set_var("BRIDGE_INFLUX_BUCKET", "sensors");
        std::env::set_var("BRIDGE_INFLUX_TOKEN", "token-1");
        std::env::set_var("BRIDGE_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("BRIDGE_MQTT_PORT", "1884");
        std::env::set_var("BRIDGE_BATCH_SIZE", "50");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.decode_mode, DecodeMode::Ruuvi);
    assert_eq!(config.measurement, "ruuvitag");
    assert_eq!(config.mqtt_topic, "home/+/RuuviTag/RAW");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.mqtt_port, 1884);
    assert_eq!(config.batch_size, 50);
    // 未设置的键落到默认值。
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.backoff_initial_ms, 200);
    assert_eq!(config.flush_interval_ms, 5000);

    // 未知解码模式被拒绝。
    unsafe {
        std::env::set_var("BRIDGE_FORMAT", "sensornode");
    }
    let err = AppConfig::from_env().expect_err("invalid mode");
    assert!(matches!(err, ConfigError::Invalid(ref key, _) if key == "BRIDGE_FORMAT"));

    // 缺少必填键直接报缺失。
    unsafe {
        std::env::set_var("BRIDGE_FORMAT", "jsonsensor");
        std::env::remove_var("BRIDGE_INFLUX_TOKEN");
    }
    let err = AppConfig::from_env().expect_err("missing token");
    assert!(matches!(err, ConfigError::Missing(ref key) if key == "BRIDGE_INFLUX_TOKEN"));
}
