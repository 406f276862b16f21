//! Host accessory/service object model.
//!
//! The bridge framework owns the real services and characteristics. The
//! accessory only talks to them through the traits in this module, so it can
//! run against the MQTT host, the in-memory host, or anything else that
//! implements [`AccessoryHost`].
//!
//! - `memory`: in-process host used by tests and console mode
//! - `mqtt`: standalone host publishing characteristics over MQTT

pub mod characteristic;
pub mod memory;
pub mod mqtt;

pub use characteristic::{Characteristic, CharacteristicValue, ServiceKind};
pub use memory::MemoryHost;
pub use mqtt::MqttHost;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Unique key of a service on an accessory.
///
/// `subtype` distinguishes several services of the same kind; accessories
/// derive it from their identifier so services never collide on a shared host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub kind: ServiceKind,
    pub subtype: Option<String>,
}

impl ServiceKey {
    /// Key for the single service of `kind` (no subtype).
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            subtype: None,
        }
    }

    /// Key for a service of `kind` distinguished by `subtype`.
    pub fn with_subtype(kind: ServiceKind, subtype: impl Into<String>) -> Self {
        Self {
            kind,
            subtype: Some(subtype.into()),
        }
    }

    /// Path segment identifying this service (`Switch` or `Switch.<subtype>`).
    pub fn segment(&self) -> String {
        match &self.subtype {
            Some(subtype) => format!("{}.{}", self.kind, subtype),
            None => self.kind.to_string(),
        }
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segment())
    }
}

/// Receives controller get/set requests for a bound characteristic.
///
/// # Example
/// ```ignore
/// struct Relay(AtomicBool);
///
/// #[async_trait]
/// impl CharacteristicHandler for Relay {
///     async fn handle_set(&self, value: CharacteristicValue) -> Result<()> {
///         self.0.store(value.as_bool(Characteristic::On)?, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn handle_get(&self) -> Result<CharacteristicValue> {
///         Ok(self.0.load(Ordering::SeqCst).into())
///     }
/// }
/// ```
#[async_trait]
pub trait CharacteristicHandler: Send + Sync + 'static {
    /// Called when a controller writes the characteristic.
    async fn handle_set(&self, value: CharacteristicValue) -> Result<()>;

    /// Called when a controller reads the characteristic.
    async fn handle_get(&self) -> Result<CharacteristicValue>;
}

/// A service owned by the host.
pub trait ServiceHandle: Send + Sync {
    fn key(&self) -> &ServiceKey;

    /// Store a static value (accessory information, names).
    fn set_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue);

    /// Push a new value to everyone observing the characteristic.
    fn update_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue);

    /// Last value set or pushed, if any.
    fn get_characteristic(&self, characteristic: Characteristic) -> Option<CharacteristicValue>;

    /// Route controller get/set requests for `characteristic` to `handler`.
    fn bind(&self, characteristic: Characteristic, handler: Arc<dyn CharacteristicHandler>);
}

/// The accessory object provided by the host.
pub trait AccessoryHost: Send + Sync {
    /// Return the service registered under `key`, creating it if absent.
    ///
    /// `display_name` is only used when the service is created.
    fn get_or_create_service(&self, key: &ServiceKey, display_name: &str) -> Arc<dyn ServiceHandle>;
}
