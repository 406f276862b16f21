//! Switch linked to a motion sensor.
//!
//! Turning the switch on arms the accessory. At the next timer tick the motion
//! sensor reports "detected" once and the switch falls back to off, so every
//! switch-on produces exactly one detection pulse. With `auto_reset` disabled
//! the motion sensor simply mirrors the switch on every tick.

use super::info::ACCESSORY_INFO;
use super::state::{AccessoryPhase, AccessoryState};
use super::timer::PushTimer;
use crate::config::AccessoryConfig;
use crate::error::Result;
use crate::host::{
    AccessoryHost, Characteristic, CharacteristicHandler, CharacteristicValue, ServiceHandle,
    ServiceKey, ServiceKind,
};
use async_trait::async_trait;
use log::{Level, debug, log};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Identity of the accessory as handed out by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryContext {
    pub display_name: String,
    pub identifier: String,
}

impl AccessoryContext {
    pub fn new(display_name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            identifier: identifier.into(),
        }
    }
}

/// Level for operational messages: info when logging is enabled, else debug.
pub fn operational_level(logging: bool) -> Level {
    if logging { Level::Info } else { Level::Debug }
}

/// Service key of the switch belonging to `identifier`.
pub fn switch_key(identifier: &str) -> ServiceKey {
    ServiceKey::with_subtype(ServiceKind::Switch, subtype(identifier, "switch"))
}

/// Service key of the motion sensor belonging to `identifier`.
pub fn motion_key(identifier: &str) -> ServiceKey {
    ServiceKey::with_subtype(ServiceKind::MotionSensor, subtype(identifier, "motion"))
}

fn subtype(identifier: &str, role: &str) -> String {
    let name = format!("switch2sensor:{}:{}", identifier, role);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Accessory exposing a Switch and a MotionSensor linked by the push timer.
pub struct SwitchMotionAccessory {
    context: AccessoryContext,
    config: AccessoryConfig,
    state: AccessoryState,
    switch_service: Arc<dyn ServiceHandle>,
    motion_service: Arc<dyn ServiceHandle>,
    timer: Mutex<Option<PushTimer>>,
}

impl SwitchMotionAccessory {
    /// Register the services on `host`, bind the switch and start the timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        host: &dyn AccessoryHost,
        context: AccessoryContext,
        config: AccessoryConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let information = host.get_or_create_service(
            &ServiceKey::new(ServiceKind::AccessoryInformation),
            &context.display_name,
        );
        information.set_characteristic(
            Characteristic::Manufacturer,
            ACCESSORY_INFO.manufacturer.into(),
        );
        information.set_characteristic(Characteristic::Model, ACCESSORY_INFO.model.into());
        information.set_characteristic(
            Characteristic::SerialNumber,
            ACCESSORY_INFO.serial_number.into(),
        );
        information.set_characteristic(
            Characteristic::Name,
            context.display_name.clone().into(),
        );

        let switch_service =
            host.get_or_create_service(&switch_key(&context.identifier), &context.display_name);
        switch_service.set_characteristic(
            Characteristic::Name,
            context.display_name.clone().into(),
        );
        switch_service.set_characteristic(Characteristic::On, false.into());

        let motion_name = format!("{} Motion", context.display_name);
        let motion_service =
            host.get_or_create_service(&motion_key(&context.identifier), &motion_name);
        motion_service.set_characteristic(Characteristic::Name, motion_name.into());
        motion_service.set_characteristic(Characteristic::MotionDetected, false.into());

        let accessory = Arc::new(Self {
            context,
            config,
            state: AccessoryState::new(),
            switch_service,
            motion_service,
            timer: Mutex::new(None),
        });

        accessory.switch_service.bind(
            Characteristic::On,
            Arc::new(SwitchOnHandler {
                accessory: Arc::downgrade(&accessory),
            }),
        );

        let weak = Arc::downgrade(&accessory);
        let timer = PushTimer::spawn(accessory.config.push_interval(), move || {
            match weak.upgrade() {
                Some(accessory) => {
                    accessory.tick();
                    true
                }
                None => false,
            }
        });
        *accessory.timer.lock() = Some(timer);

        log!(
            accessory.level(),
            "[Accessory] {} ready (push interval {} ms, auto reset {})",
            accessory.context.display_name,
            accessory.config.push_interval_ms,
            accessory.config.auto_reset
        );

        Ok(accessory)
    }

    pub fn switch_key(&self) -> &ServiceKey {
        self.switch_service.key()
    }

    pub fn motion_key(&self) -> &ServiceKey {
        self.motion_service.key()
    }

    /// Handle a controller write to the switch.
    pub async fn set_on(&self, value: bool) {
        self.state.set(value);
        log!(self.level(), "[Accessory] Set Characteristic On -> {}", value);
    }

    /// Handle a controller read of the switch.
    pub async fn get_on(&self) -> bool {
        let is_on = self.state.get();
        log!(self.level(), "[Accessory] Get Characteristic On -> {}", is_on);
        is_on
    }

    pub fn phase(&self) -> AccessoryPhase {
        self.state.phase()
    }

    /// One timer period: push the switch state to the motion sensor and, in
    /// pulse mode, reset an armed switch.
    pub fn tick(&self) {
        let on = if self.config.auto_reset {
            self.state.take()
        } else {
            self.state.get()
        };

        self.motion_service
            .update_characteristic(Characteristic::MotionDetected, on.into());
        debug!(
            "[Accessory] {}: MotionDetected -> {}",
            self.context.display_name, on
        );

        if !on || !self.config.auto_reset {
            return;
        }

        log!(
            self.level(),
            "[Accessory] {}: motion detected",
            self.context.display_name
        );
        self.switch_service
            .update_characteristic(Characteristic::On, false.into());
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| timer.is_running())
    }

    /// Stop the push timer and wait for it to finish.
    pub async fn shutdown(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.shutdown().await;
            log!(
                self.level(),
                "[Accessory] {} stopped",
                self.context.display_name
            );
        }
    }

    fn level(&self) -> Level {
        operational_level(self.config.logging)
    }
}

impl Drop for SwitchMotionAccessory {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().as_ref() {
            timer.cancel();
        }
    }
}

/// Routes controller requests on the switch `On` characteristic.
///
/// Holds a weak reference so the binding does not keep the accessory alive.
struct SwitchOnHandler {
    accessory: Weak<SwitchMotionAccessory>,
}

#[async_trait]
impl CharacteristicHandler for SwitchOnHandler {
    async fn handle_set(&self, value: CharacteristicValue) -> Result<()> {
        let on = value.as_bool(Characteristic::On)?;
        if let Some(accessory) = self.accessory.upgrade() {
            accessory.set_on(on).await;
        }
        Ok(())
    }

    async fn handle_get(&self) -> Result<CharacteristicValue> {
        let on = match self.accessory.upgrade() {
            Some(accessory) => accessory.get_on().await,
            None => false,
        };
        Ok(on.into())
    }
}
