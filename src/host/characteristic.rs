//! Service and characteristic vocabulary shared by the accessory and hosts.
//!
//! Names follow the HomeKit service/characteristic definitions so they can be
//! used verbatim as topic segments or log labels.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Typed capability group attached to an accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum ServiceKind {
    AccessoryInformation,
    Switch,
    MotionSensor,
}

/// A single named value within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Characteristic {
    On,
    MotionDetected,
    Manufacturer,
    Model,
    SerialNumber,
    Name,
}

/// Value carried by a characteristic.
///
/// Serialized untagged, so `true` and `"Navision.guru"` are valid payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Text(String),
}

impl CharacteristicValue {
    /// Interpret the value as a boolean for `characteristic`.
    pub fn as_bool(&self, characteristic: Characteristic) -> Result<bool> {
        match self {
            Self::Bool(value) => Ok(*value),
            Self::Text(_) => Err(BridgeError::InvalidValue {
                characteristic,
                expected: "bool",
            }),
        }
    }

    /// Parse a payload received from a controller.
    ///
    /// JSON is tried first; bare `ON`/`OFF`/`1`/`0` are accepted as booleans and
    /// anything else becomes text.
    pub fn from_payload(payload: &str) -> Self {
        let payload = payload.trim();
        if let Ok(value) = serde_json::from_str::<CharacteristicValue>(payload) {
            return value;
        }
        match payload.to_ascii_uppercase().as_str() {
            "ON" | "TRUE" | "1" => Self::Bool(true),
            "OFF" | "FALSE" | "0" => Self::Bool(false),
            _ => Self::Text(payload.to_string()),
        }
    }

    /// Encode the value as a JSON payload.
    pub fn to_payload(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Text(text) => serde_json::Value::String(text.clone()).to_string(),
        }
    }
}

impl From<bool> for CharacteristicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CharacteristicValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}
