//! Standalone MQTT host.
//!
//! Exposes the accessory's services as MQTT topics so it can be driven
//! without a bridge framework. Characteristic values are published retained;
//! controllers write through `/set` topics and request reads through `/get`.
//! See [`topics`] for the layout.

mod client;
pub mod topics;

pub use client::{MqttClient, MqttEvent, MqttMessage};
pub use topics::{TopicAction, TopicCommand, Topics};

use super::{
    AccessoryHost, Characteristic, CharacteristicHandler, CharacteristicValue, ServiceHandle,
    ServiceKey,
};
use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use rumqttc::{AsyncClient, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A service published by [`MqttHost`].
pub struct MqttService {
    key: ServiceKey,
    name: String,
    topics: Topics,
    client: AsyncClient,
    values: RwLock<HashMap<Characteristic, CharacteristicValue>>,
    handlers: RwLock<HashMap<Characteristic, Arc<dyn CharacteristicHandler>>>,
}

impl MqttService {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn handler(&self, characteristic: Characteristic) -> Option<Arc<dyn CharacteristicHandler>> {
        self.handlers.read().get(&characteristic).cloned()
    }

    /// Enqueue a retained publish. Never waits on the broker.
    fn publish(&self, characteristic: Characteristic, value: &CharacteristicValue) {
        let topic = self.topics.value(&self.key, characteristic);
        let payload = value.to_payload();
        debug!("[MQTT] Publishing to {}: {}", topic, payload);
        if let Err(e) = self
            .client
            .try_publish(topic.clone(), QoS::AtLeastOnce, true, payload)
        {
            warn!("[MQTT] Failed to publish {}: {}", topic, e);
        }
    }

    /// Publish every known value again (after a reconnect).
    fn republish(&self) {
        let values: Vec<_> = self
            .values
            .read()
            .iter()
            .map(|(c, v)| (*c, v.clone()))
            .collect();
        for (characteristic, value) in values {
            self.publish(characteristic, &value);
        }
    }

    fn store(&self, characteristic: Characteristic, value: CharacteristicValue) {
        self.publish(characteristic, &value);
        self.values.write().insert(characteristic, value);
    }
}

impl ServiceHandle for MqttService {
    fn key(&self) -> &ServiceKey {
        &self.key
    }

    fn set_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue) {
        self.store(characteristic, value);
    }

    fn update_characteristic(&self, characteristic: Characteristic, value: CharacteristicValue) {
        self.store(characteristic, value);
    }

    fn get_characteristic(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.values.read().get(&characteristic).cloned()
    }

    fn bind(&self, characteristic: Characteristic, handler: Arc<dyn CharacteristicHandler>) {
        self.handlers.write().insert(characteristic, handler);
    }
}

/// Accessory host backed by an MQTT broker.
pub struct MqttHost {
    topics: Topics,
    client: AsyncClient,
    services: RwLock<HashMap<ServiceKey, Arc<MqttService>>>,
}

impl MqttHost {
    /// Create the host and its (not yet running) connection.
    ///
    /// Services can be registered right away; publishes are queued until
    /// [`MqttHost::start`] runs the connection.
    pub fn new(config: &MqttConfig, accessory_id: &str) -> (Arc<Self>, MqttClient) {
        let connection = MqttClient::new(config);
        let host = Arc::new(Self {
            topics: Topics::new(&config.topic_prefix, accessory_id),
            client: connection.client(),
            services: RwLock::new(HashMap::new()),
        });
        (host, connection)
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn service(&self, key: &ServiceKey) -> Option<Arc<MqttService>> {
        self.services.read().get(key).cloned()
    }

    /// Run the connection and route incoming commands to bound handlers.
    ///
    /// Returns a JoinHandle that can be used to abort the host on shutdown.
    pub fn start(self: Arc<Self>, connection: MqttClient) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[MQTT] Serving accessory topics under {}", self.topics.base());

            let (tx, mut rx) = mpsc::channel::<MqttEvent>(64);
            let event_loop = tokio::spawn(connection.run(tx));

            while let Some(event) = rx.recv().await {
                match event {
                    MqttEvent::Connected => self.on_connected().await,
                    MqttEvent::Message(msg) => {
                        if let Err(e) = self.dispatch(&msg).await {
                            warn!("[MQTT] Ignoring message on {}: {}", msg.topic, e);
                        }
                    }
                }
            }

            event_loop.abort();
        })
    }

    async fn on_connected(&self) {
        for topic in self.topics.subscriptions() {
            if let Err(e) = self.client.subscribe(&topic, QoS::AtLeastOnce).await {
                warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
            }
        }

        let services: Vec<_> = self.services.read().values().cloned().collect();
        for service in services {
            service.republish();
        }
    }

    /// Route one command message to the bound handler.
    ///
    /// A set publishes the written value before the handler sees it, so any
    /// push the accessory makes in reaction (a tick resetting the switch)
    /// lands after it on the retained topic. A rejected set restores the
    /// previous value. A get publishes the handler's answer.
    pub async fn dispatch(&self, msg: &MqttMessage) -> Result<()> {
        let command = self.topics.parse(&msg.topic)?;
        let service = self
            .service(&command.service)
            .ok_or_else(|| BridgeError::UnknownTopic(msg.topic.clone()))?;
        let handler = service
            .handler(command.characteristic)
            .ok_or(BridgeError::HandlerNotBound(command.characteristic))?;
        let characteristic = command.characteristic;

        match command.action {
            TopicAction::Set => {
                let value = CharacteristicValue::from_payload(&msg.payload);
                let previous = service.get_characteristic(characteristic);
                service.update_characteristic(characteristic, value.clone());
                if let Err(e) = handler.handle_set(value).await {
                    if let Some(previous) = previous {
                        service.update_characteristic(characteristic, previous);
                    }
                    return Err(e);
                }
            }
            TopicAction::Get => {
                let value = handler.handle_get().await?;
                service.update_characteristic(characteristic, value);
            }
        }
        Ok(())
    }
}

impl AccessoryHost for MqttHost {
    fn get_or_create_service(
        &self,
        key: &ServiceKey,
        display_name: &str,
    ) -> Arc<dyn ServiceHandle> {
        let mut services = self.services.write();
        services
            .entry(key.clone())
            .or_insert_with(|| {
                info!("[MQTT] Registering service {} ({})", key, display_name);
                Arc::new(MqttService {
                    key: key.clone(),
                    name: display_name.to_string(),
                    topics: self.topics.clone(),
                    client: self.client.clone(),
                    values: RwLock::new(HashMap::new()),
                    handlers: RwLock::new(HashMap::new()),
                })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{AccessoryContext, SwitchMotionAccessory};
    use crate::config::AccessoryConfig;
    use crate::host::ServiceKind;
    use async_trait::async_trait;

    fn host() -> (Arc<MqttHost>, MqttClient) {
        MqttHost::new(&MqttConfig::default(), "hall-1")
    }

    fn message(topic: String, payload: &str) -> MqttMessage {
        MqttMessage {
            topic,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_services_are_reused() {
        // Keep the connection alive so queued publishes are accepted
        let (host, _connection) = host();
        let key = ServiceKey::new(ServiceKind::Switch);

        host.get_or_create_service(&key, "Hallway");
        host.get_or_create_service(&key, "Other");

        assert_eq!(host.service(&key).unwrap().name(), "Hallway");
    }

    #[tokio::test]
    async fn test_set_and_get_drive_accessory() {
        let (host, _connection) = host();
        let accessory = SwitchMotionAccessory::new(
            host.as_ref(),
            AccessoryContext::new("Hallway", "hall-1"),
            AccessoryConfig::default(),
        )
        .unwrap();
        let switch_key = accessory.switch_key().clone();
        let set_topic = format!("{}/set", host.topics().value(&switch_key, Characteristic::On));
        let get_topic = format!("{}/get", host.topics().value(&switch_key, Characteristic::On));

        host.dispatch(&message(set_topic, "ON")).await.unwrap();
        assert!(accessory.get_on().await);
        let switch = host.service(&switch_key).unwrap();
        assert_eq!(
            switch.get_characteristic(Characteristic::On),
            Some(CharacteristicValue::Bool(true))
        );

        accessory.tick();
        assert_eq!(
            switch.get_characteristic(Characteristic::On),
            Some(CharacteristicValue::Bool(false))
        );
        let motion = host.service(accessory.motion_key()).unwrap();
        assert_eq!(
            motion.get_characteristic(Characteristic::MotionDetected),
            Some(CharacteristicValue::Bool(true))
        );

        host.dispatch(&message(get_topic, "")).await.unwrap();
        assert_eq!(
            switch.get_characteristic(Characteristic::On),
            Some(CharacteristicValue::Bool(false))
        );
    }

    /// Applies the write and then runs a tick, as if the timer fired right
    /// after the handler returned.
    struct SetThenTick {
        accessory: Arc<SwitchMotionAccessory>,
    }

    #[async_trait]
    impl CharacteristicHandler for SetThenTick {
        async fn handle_set(&self, value: CharacteristicValue) -> Result<()> {
            self.accessory
                .set_on(value.as_bool(Characteristic::On)?)
                .await;
            self.accessory.tick();
            Ok(())
        }

        async fn handle_get(&self) -> Result<CharacteristicValue> {
            Ok(self.accessory.get_on().await.into())
        }
    }

    #[tokio::test]
    async fn test_tick_during_set_leaves_switch_off() {
        let (host, _connection) = host();
        let accessory = SwitchMotionAccessory::new(
            host.as_ref(),
            AccessoryContext::new("Hallway", "hall-1"),
            AccessoryConfig::default(),
        )
        .unwrap();
        let switch = host.service(accessory.switch_key()).unwrap();
        switch.bind(
            Characteristic::On,
            Arc::new(SetThenTick {
                accessory: accessory.clone(),
            }),
        );
        let topic = format!(
            "{}/set",
            host.topics().value(accessory.switch_key(), Characteristic::On)
        );

        host.dispatch(&message(topic, "ON")).await.unwrap();

        // The reset pushed by the tick must win over the echoed write
        assert!(!accessory.get_on().await);
        assert_eq!(
            switch.get_characteristic(Characteristic::On),
            Some(CharacteristicValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_invalid_value_leaves_state_untouched() {
        let (host, _connection) = host();
        let accessory = SwitchMotionAccessory::new(
            host.as_ref(),
            AccessoryContext::new("Hallway", "hall-1"),
            AccessoryConfig::default(),
        )
        .unwrap();
        let topic = format!(
            "{}/set",
            host.topics().value(accessory.switch_key(), Characteristic::On)
        );

        let result = host.dispatch(&message(topic, "sometimes")).await;

        assert!(matches!(result, Err(BridgeError::InvalidValue { .. })));
        assert!(!accessory.get_on().await);
        let switch = host.service(accessory.switch_key()).unwrap();
        assert_eq!(
            switch.get_characteristic(Characteristic::On),
            Some(CharacteristicValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_unknown_service_and_unbound_characteristic() {
        let (host, _connection) = host();
        let key = ServiceKey::new(ServiceKind::MotionSensor);

        let topic = format!("{}/get", host.topics().value(&key, Characteristic::MotionDetected));
        assert!(matches!(
            host.dispatch(&message(topic.clone(), "")).await,
            Err(BridgeError::UnknownTopic(_))
        ));

        host.get_or_create_service(&key, "Motion");
        assert!(matches!(
            host.dispatch(&message(topic, "")).await,
            Err(BridgeError::HandlerNotBound(Characteristic::MotionDetected))
        ));
    }
}
