use inverter_bridge::prelude::*;

use std::collections::HashMap;
use std::time::Duration;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults() -> Result<()> {
    let config = Config::from_yaml("")?;

    assert_eq!(config.device().path(), None);
    assert_eq!(config.device().vendor_id(), 0x0665);
    assert_eq!(config.device().product_id(), 0x5161);
    assert_eq!(config.device().read_timeout(), Duration::from_millis(3000));
    assert_eq!(config.device().poll_interval(), Duration::from_millis(20));

    assert!(config.mqtt().enabled());
    assert_eq!(config.mqtt().host(), "localhost");
    assert_eq!(config.mqtt().port(), 1883);
    assert_eq!(config.mqtt().keepalive(), Duration::from_secs(60));
    assert_eq!(config.mqtt().namespace(), "homeassistant/inverter");
    assert!(!config.mqtt().publish_json());

    assert_eq!(config.poll().interval(), Duration::from_secs(1));
    assert_eq!(config.poll().failure_threshold(), 10);
    assert_eq!(config.loglevel(), "info");

    config.validate()?;
    Ok(())
}

#[test]
fn partial_yaml() -> Result<()> {
    let config = Config::from_yaml(
        r#"
device:
  path: /dev/hidraw3
  read_timeout_ms: 1500
mqtt:
  host: broker.lan
  username: solar
  password: secret
poll:
  failure_threshold: 4
"#,
    )?;

    assert_eq!(config.device().path(), Some("/dev/hidraw3"));
    assert_eq!(config.device().read_timeout(), Duration::from_millis(1500));
    assert_eq!(config.device().vendor_id(), 0x0665);
    assert_eq!(config.mqtt().host(), "broker.lan");
    assert_eq!(config.mqtt().port(), 1883);
    assert_eq!(config.mqtt().username(), &Some("solar".to_string()));
    assert_eq!(config.poll().failure_threshold(), 4);
    assert_eq!(config.poll().interval(), Duration::from_secs(1));

    Ok(())
}

#[test]
fn env_overrides() -> Result<()> {
    let mut config = Config::from_yaml("mqtt:\n  host: from-file\n")?;

    config.apply_env(&env(&[
        ("MQTT_BROKER", "from-env"),
        ("MQTT_PORT", "8883"),
        ("MQTT_KEEPALIVE", "30"),
        ("MQTT_NAMESPACE", "solar/axpert"),
        ("POLL_INTERVAL", "5"),
        ("FAILURE_THRESHOLD", "3"),
        ("DEVICE_FILE", "/dev/hidraw1"),
        ("LOG_LEVEL", "debug"),
        ("MQTT_USERNAME", ""),
    ]))?;

    assert_eq!(config.mqtt().host(), "from-env");
    assert_eq!(config.mqtt().port(), 8883);
    assert_eq!(config.mqtt().keepalive(), Duration::from_secs(30));
    assert_eq!(config.mqtt().namespace(), "solar/axpert");
    assert_eq!(config.mqtt().username(), &None);
    assert_eq!(config.poll().interval(), Duration::from_secs(5));
    assert_eq!(config.poll().failure_threshold(), 3);
    assert_eq!(config.device().path(), Some("/dev/hidraw1"));
    assert_eq!(config.loglevel(), "debug");

    Ok(())
}

#[test]
fn bad_env_value() {
    let mut config = Config::default();

    let err = config.apply_env(&env(&[("MQTT_PORT", "lots")])).unwrap_err();
    assert!(err.to_string().contains("MQTT_PORT"));
}

#[test]
fn validation() {
    let mut config = Config::default();
    config.mqtt.port = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.mqtt.namespace = "homeassistant/inverter/".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.poll.failure_threshold = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.device.read_timeout_ms = Some(0);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.device.poll_interval_ms = Some(0);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("poll_interval_ms"));

    let mut config = Config::default();
    config.device.read_timeout_ms = Some(10);
    config.device.poll_interval_ms = Some(50);
    assert!(config.validate().is_err());

    // mqtt settings don't matter when it is off
    let mut config = Config::default();
    config.mqtt.enabled = false;
    config.mqtt.host = String::new();
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_yaml_is_an_error() {
    assert!(Config::from_yaml("mqtt: 7").is_err());
}
