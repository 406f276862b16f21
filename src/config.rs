use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
///
/// Must be called before any other thread is started, in particular before
/// the tokio runtime is built.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: only called from `main` before the runtime starts its workers
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }
    pairs
}

/// Default period of the motion push timer.
pub const DEFAULT_PUSH_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub accessory: AccessoryConfig,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
}

/// Options read once when the accessory is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessoryConfig {
    /// Route operational messages to info instead of debug.
    pub logging: bool,
    /// Timer period in milliseconds.
    #[serde(rename = "pushInterval")]
    pub push_interval_ms: u64,
    /// Reset the switch after signalling detection once.
    pub auto_reset: bool,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            logging: false,
            push_interval_ms: DEFAULT_PUSH_INTERVAL_MS,
            auto_reset: true,
        }
    }
}

impl AccessoryConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.push_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "pushInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Display name shown by controllers.
    pub name: String,
    /// Stable identifier; falls back to `name` when absent.
    pub id: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Switch2Sensor".to_string(),
            id: None,
        }
    }
}

impl DeviceConfig {
    pub fn identifier(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "switch2sensor".to_string(),
            username: None,
            password: None,
            topic_prefix: "switch2sensor".to_string(),
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/switch2sensor/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("switch2sensor").join("config.json"))
    }

    /// Build the configuration: defaults, then the JSON file, then environment.
    ///
    /// An explicit `path` must exist; the default path is only read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Accessory configuration
        if let Some(logging) = var("S2S_LOGGING")
            && let Some(l) = parse_flag(&logging)
        {
            self.accessory.logging = l;
        }
        if let Some(interval) = var("S2S_PUSH_INTERVAL_MS")
            && let Ok(i) = interval.parse()
        {
            self.accessory.push_interval_ms = i;
        }
        if let Some(auto_reset) = var("S2S_AUTO_RESET")
            && let Some(a) = parse_flag(&auto_reset)
        {
            self.accessory.auto_reset = a;
        }

        // Device identity
        if let Some(name) = var("DEVICE_NAME") {
            self.device.name = name;
        }
        if let Some(id) = var("DEVICE_ID") {
            self.device.id = Some(id);
        }

        // MQTT configuration
        if let Some(host) = var("MQTT_BROKER_HOST") {
            self.mqtt.broker_host = host;
        }
        if let Some(port) = var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            self.mqtt.broker_port = p;
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(username) = var("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(prefix) = var("MQTT_TOPIC_PREFIX") {
            self.mqtt.topic_prefix = prefix;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.accessory.validate()?;
        if self.device.identifier().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "device name or id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
