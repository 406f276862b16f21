//! In-process accessory host.
//!
//! Keeps every service in memory and records each pushed value, so the
//! accessory logic can be driven and observed without a bridge framework.
//! The binary also uses it in console mode, where every push is logged.

use super::{
    AccessoryHost, Characteristic, CharacteristicHandler, CharacteristicValue, ServiceHandle,
    ServiceKey,
};
use crate::error::{BridgeError, Result};
use log::info;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Pushes kept per characteristic; older ones are discarded.
pub const PUSH_HISTORY_LIMIT: usize = 256;

/// A service held by [`MemoryHost`].
pub struct MemoryService {
    key: ServiceKey,
    name: String,
    echo: bool,
    values: RwLock<HashMap<Characteristic, CharacteristicValue>>,
    pushes: RwLock<HashMap<Characteristic, VecDeque<CharacteristicValue>>>,
    handlers: RwLock<HashMap<Characteristic, Arc<dyn CharacteristicHandler>>>,
}

impl MemoryService {
    fn new(key: ServiceKey, name: &str, echo: bool) -> Self {
        Self {
            key,
            name: name.to_string(),
            echo,
            values: RwLock::new(HashMap::new()),
            pushes: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Display name given when the service was created.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values pushed to `characteristic`, oldest first.
    ///
    /// Only the last [`PUSH_HISTORY_LIMIT`] pushes are kept.
    pub fn pushes(&self, characteristic: Characteristic) -> Vec<CharacteristicValue> {
        self.pushes
            .read()
            .get(&characteristic)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Simulate a controller write through the bound handler.
    pub async fn write(
        &self,
        characteristic: Characteristic,
        value: impl Into<CharacteristicValue>,
    ) -> Result<()> {
        let handler = self.handler(characteristic)?;
        handler.handle_set(value.into()).await
    }

    /// Simulate a controller read through the bound handler.
    pub async fn read(&self, characteristic: Characteristic) -> Result<CharacteristicValue> {
        let handler = self.handler(characteristic)?;
        handler.handle_get().await
    }

    fn handler(&self, characteristic: Characteristic) -> Result<Arc<dyn CharacteristicHandler>> {
        self.handlers
            .read()
            .get(&characteristic)
            .cloned()
            .ok_or(BridgeError::HandlerNotBound(characteristic))
    }
}

impl ServiceHandle for MemoryService {
    fn key(&self) -> &ServiceKey {
        &self.key
    }

    fn set_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue) {
        self.values.write().insert(characteristic, value);
    }

    fn update_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue) {
        if self.echo {
            info!("[Host] {} {} -> {}", self.name, characteristic, value);
        }
        self.values.write().insert(characteristic, value.clone());

        let mut pushes = self.pushes.write();
        let history = pushes.entry(characteristic).or_default();
        if history.len() == PUSH_HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(value);
    }

    fn get_characteristic(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.values.read().get(&characteristic).cloned()
    }

    fn bind(&self, characteristic: Characteristic, handler: Arc<dyn CharacteristicHandler>) {
        self.handlers.write().insert(characteristic, handler);
    }
}

/// Accessory host keeping services in memory.
#[derive(Default)]
pub struct MemoryHost {
    echo: bool,
    services: RwLock<HashMap<ServiceKey, Arc<MemoryService>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that logs every pushed value at info level.
    pub fn console() -> Self {
        Self {
            echo: true,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a service by key.
    pub fn service(&self, key: &ServiceKey) -> Option<Arc<MemoryService>> {
        self.services.read().get(key).cloned()
    }

    /// Number of services created so far.
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }
}

impl AccessoryHost for MemoryHost {
    fn get_or_create_service(
        &self,
        key: &ServiceKey,
        display_name: &str,
    ) -> Arc<dyn ServiceHandle> {
        let mut services = self.services.write();
        services
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MemoryService::new(key.clone(), display_name, self.echo)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ServiceKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Relay(AtomicBool);

    #[async_trait]
    impl CharacteristicHandler for Relay {
        async fn handle_set(&self, value: CharacteristicValue) -> Result<()> {
            self.0.store(value.as_bool(Characteristic::On)?, Ordering::SeqCst);
            Ok(())
        }

        async fn handle_get(&self) -> Result<CharacteristicValue> {
            Ok(self.0.load(Ordering::SeqCst).into())
        }
    }

    #[test]
    fn test_get_or_create_reuses_service() {
        let host = MemoryHost::new();
        let key = ServiceKey::with_subtype(ServiceKind::Switch, "a");

        let first = host.get_or_create_service(&key, "First");
        let second = host.get_or_create_service(&key, "Second");

        assert_eq!(host.service_count(), 1);
        assert_eq!(first.key(), second.key());
        assert_eq!(host.service(&key).unwrap().name(), "First");

        host.get_or_create_service(&ServiceKey::with_subtype(ServiceKind::Switch, "b"), "Other");
        assert_eq!(host.service_count(), 2);
    }

    #[test]
    fn test_update_records_history() {
        let host = MemoryHost::new();
        let key = ServiceKey::new(ServiceKind::MotionSensor);
        let service = host.get_or_create_service(&key, "Motion");

        service.update_characteristic(Characteristic::MotionDetected, true.into());
        service.update_characteristic(Characteristic::MotionDetected, false.into());
        service.set_characteristic(Characteristic::Name, "Motion".into());

        let stored = host.service(&key).unwrap();
        assert_eq!(
            stored.pushes(Characteristic::MotionDetected),
            vec![CharacteristicValue::Bool(true), CharacteristicValue::Bool(false)]
        );
        // set_characteristic is not a push
        assert!(stored.pushes(Characteristic::Name).is_empty());
        assert_eq!(
            service.get_characteristic(Characteristic::MotionDetected),
            Some(CharacteristicValue::Bool(false))
        );
    }

    #[test]
    fn test_history_keeps_latest_pushes() {
        let host = MemoryHost::console();
        let key = ServiceKey::new(ServiceKind::MotionSensor);
        let service = host.get_or_create_service(&key, "Motion");

        let total = PUSH_HISTORY_LIMIT + 44;
        for i in 0..total {
            service.update_characteristic(Characteristic::Name, i.to_string().into());
        }

        let pushes = host.service(&key).unwrap().pushes(Characteristic::Name);
        assert_eq!(pushes.len(), PUSH_HISTORY_LIMIT);
        assert_eq!(pushes[0], CharacteristicValue::from("44"));
        assert_eq!(
            pushes[PUSH_HISTORY_LIMIT - 1],
            CharacteristicValue::from((total - 1).to_string())
        );
    }

    #[tokio::test]
    async fn test_write_and_read_go_through_handler() {
        let host = MemoryHost::new();
        let key = ServiceKey::new(ServiceKind::Switch);
        let service = host.get_or_create_service(&key, "Switch");
        service.bind(Characteristic::On, Arc::new(Relay(AtomicBool::new(false))));

        let stored = host.service(&key).unwrap();
        stored.write(Characteristic::On, true).await.unwrap();
        assert_eq!(
            stored.read(Characteristic::On).await.unwrap(),
            CharacteristicValue::Bool(true)
        );

        assert!(matches!(
            stored.write(Characteristic::On, "maybe").await,
            Err(BridgeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unbound_characteristic_fails() {
        let host = MemoryHost::new();
        let key = ServiceKey::new(ServiceKind::Switch);
        host.get_or_create_service(&key, "Switch");

        let service = host.service(&key).unwrap();
        let result = tokio_test::block_on(service.read(Characteristic::On));
        assert!(matches!(
            result,
            Err(BridgeError::HandlerNotBound(Characteristic::On))
        ));
    }
}
