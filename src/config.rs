use crate::prelude::*;

use crate::voltronic::channel::ReadSettings;
use crate::voltronic::discovery::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_device")]
    pub device: Device,

    #[serde(default = "Config::default_mqtt")]
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_poll")]
    pub poll: Poll,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Device {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub path: Option<String>,

    #[serde(default = "Config::default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "Config::default_product_id")]
    pub product_id: u16,

    pub read_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}
impl Device {
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(3000))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(20))
    }

    pub fn read_settings(&self) -> ReadSettings {
        ReadSettings {
            timeout: self.read_timeout(),
            poll_interval: self.poll_interval(),
        }
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_host")]
    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    #[serde(default = "Config::default_mqtt_keepalive")]
    pub keepalive: u64,
    #[serde(default = "Config::default_mqtt_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    pub publish_json: Option<bool>,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn publish_json(&self) -> bool {
        self.publish_json == Some(true)
    }
} // }}}

// Poll {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Poll {
    #[serde(default = "Config::default_poll_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "Config::default_failure_threshold")]
    pub failure_threshold: u32,
}
impl Poll {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
} // }}}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            mqtt: Self::default_mqtt(),
            poll: Self::default_poll(),
            loglevel: Self::default_loglevel(),
        }
    }
}

impl Config {
    /// Reads `file` if it exists, falls back to defaults otherwise, then
    /// applies environment overrides.
    pub fn new(file: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(file).exists() {
            let content = std::fs::read_to_string(file)
                .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        let env: HashMap<String, String> = std::env::vars().collect();
        config.apply_env(&env)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // an empty file deserializes as unit, not as an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("MQTT_BROKER") {
            self.mqtt.host = v.to_string();
        }
        if let Some(v) = get("MQTT_PORT") {
            self.mqtt.port = v.parse().map_err(|e| anyhow!("MQTT_PORT={}: {}", v, e))?;
        }
        if let Some(v) = get("MQTT_KEEPALIVE") {
            self.mqtt.keepalive = v.parse().map_err(|e| anyhow!("MQTT_KEEPALIVE={}: {}", v, e))?;
        }
        if let Some(v) = get("MQTT_USERNAME") {
            self.mqtt.username = Some(v.to_string());
        }
        if let Some(v) = get("MQTT_PASSWORD") {
            self.mqtt.password = Some(v.to_string());
        }
        if let Some(v) = get("MQTT_NAMESPACE") {
            self.mqtt.namespace = v.to_string();
        }
        if let Some(v) = get("POLL_INTERVAL") {
            self.poll.interval_secs = v.parse().map_err(|e| anyhow!("POLL_INTERVAL={}: {}", v, e))?;
        }
        if let Some(v) = get("FAILURE_THRESHOLD") {
            self.poll.failure_threshold =
                v.parse().map_err(|e| anyhow!("FAILURE_THRESHOLD={}: {}", v, e))?;
        }
        if let Some(v) = get("DEVICE_FILE") {
            self.device.path = Some(v.to_string());
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.loglevel = v.to_string();
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
            if self.mqtt.namespace.ends_with('/') {
                bail!("mqtt.namespace must not end with '/'");
            }
        }

        if self.device.read_timeout().is_zero() {
            bail!("device.read_timeout_ms must be greater than 0");
        }
        if self.device.poll_interval().is_zero() {
            bail!("device.poll_interval_ms must be greater than 0");
        }
        if self.device.poll_interval() > self.device.read_timeout() {
            bail!("device.poll_interval_ms must not exceed device.read_timeout_ms");
        }
        if self.poll.failure_threshold == 0 {
            bail!("poll.failure_threshold must be greater than 0");
        }

        Ok(())
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        match self.device.path() {
            Some(path) => info!("  Device: {}", path),
            None => info!(
                "  Device: auto-detect {:04x}:{:04x}",
                self.device.vendor_id, self.device.product_id
            ),
        }
        info!("    Read Timeout: {:?}", self.device.read_timeout());
        info!("    Poll Interval: {:?}", self.device.poll_interval());
        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Keepalive: {}s", self.mqtt.keepalive);
            info!("    Namespace: {}", self.mqtt.namespace);
        }
        info!("  Poll Interval: {}s", self.poll.interval_secs);
        info!("  Failure Threshold: {}", self.poll.failure_threshold);
        info!("  Log Level: {}", self.loglevel);
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn mqtt(&self) -> &Mqtt {
        &self.mqtt
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    fn default_device() -> Device {
        Device {
            path: None,
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            read_timeout_ms: None,
            poll_interval_ms: None,
        }
    }

    fn default_vendor_id() -> u16 {
        DEFAULT_VENDOR_ID
    }

    fn default_product_id() -> u16 {
        DEFAULT_PRODUCT_ID
    }

    fn default_mqtt() -> Mqtt {
        Mqtt {
            enabled: Self::default_enabled(),
            host: Self::default_mqtt_host(),
            port: Self::default_mqtt_port(),
            keepalive: Self::default_mqtt_keepalive(),
            client_id: Self::default_mqtt_client_id(),
            username: None,
            password: None,
            namespace: Self::default_mqtt_namespace(),
            publish_json: None,
        }
    }

    fn default_mqtt_host() -> String {
        "localhost".to_string()
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_keepalive() -> u64 {
        60
    }

    fn default_mqtt_client_id() -> String {
        "inverter-bridge".to_string()
    }

    fn default_mqtt_namespace() -> String {
        "homeassistant/inverter".to_string()
    }

    fn default_poll() -> Poll {
        Poll {
            interval_secs: Self::default_poll_interval_secs(),
            failure_threshold: Self::default_failure_threshold(),
        }
    }

    fn default_poll_interval_secs() -> u64 {
        1
    }

    fn default_failure_threshold() -> u32 {
        10
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
