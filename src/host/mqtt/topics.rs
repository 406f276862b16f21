//! Topic layout of the MQTT host.
//!
//! ```text
//! {prefix}/{accessory}/{service}/{characteristic}        current value (retained)
//! {prefix}/{accessory}/{service}/{characteristic}/set    controller write
//! {prefix}/{accessory}/{service}/{characteristic}/get    controller read request
//! ```
//!
//! `{service}` is the service kind, followed by `.{subtype}` when present.

use crate::error::{BridgeError, Result};
use crate::host::{Characteristic, ServiceKey, ServiceKind};
use std::str::FromStr;

/// Request carried by a `/set` or `/get` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    Set,
    Get,
}

/// A parsed command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCommand {
    pub service: ServiceKey,
    pub characteristic: Characteristic,
    pub action: TopicAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(prefix: &str, accessory_id: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            base: format!("{}/{}", prefix, sanitize(accessory_id)),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn value(&self, service: &ServiceKey, characteristic: Characteristic) -> String {
        format!("{}/{}/{}", self.base, service.segment(), characteristic)
    }

    /// Wildcard subscriptions for every command topic of the accessory.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}/+/+/set", self.base),
            format!("{}/+/+/get", self.base),
        ]
    }

    pub fn parse(&self, topic: &str) -> Result<TopicCommand> {
        let unknown = || BridgeError::UnknownTopic(topic.to_string());

        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(unknown)?;

        let parts: Vec<&str> = rest.split('/').collect();
        let [service, characteristic, action] = parts.as_slice() else {
            return Err(unknown());
        };

        let service = match service.split_once('.') {
            Some((kind, subtype)) => {
                let kind = ServiceKind::from_str(kind).map_err(|_| unknown())?;
                ServiceKey::with_subtype(kind, subtype)
            }
            None => ServiceKey::new(ServiceKind::from_str(service).map_err(|_| unknown())?),
        };
        let characteristic = Characteristic::from_str(characteristic).map_err(|_| unknown())?;
        let action = match *action {
            "set" => TopicAction::Set,
            "get" => TopicAction::Get,
            _ => return Err(unknown()),
        };

        Ok(TopicCommand {
            service,
            characteristic,
            action,
        })
    }
}

/// Replace characters that would break the topic hierarchy or act as wildcards.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '+' | '#' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_topic() {
        let topics = Topics::new("switch2sensor/", "hall-1");
        let key = ServiceKey::with_subtype(ServiceKind::Switch, "abc");
        assert_eq!(
            topics.value(&key, Characteristic::On),
            "switch2sensor/hall-1/Switch.abc/On"
        );
        assert_eq!(
            topics.subscriptions(),
            vec!["switch2sensor/hall-1/+/+/set", "switch2sensor/hall-1/+/+/get"]
        );
    }

    #[test]
    fn test_accessory_id_is_sanitized() {
        let topics = Topics::new("s2s", "living/room#1");
        assert_eq!(topics.base(), "s2s/living_room_1");
    }

    #[test]
    fn test_parse_set_and_get() {
        let topics = Topics::new("s2s", "hall");

        let command = topics.parse("s2s/hall/Switch.abc/On/set").unwrap();
        assert_eq!(command.service, ServiceKey::with_subtype(ServiceKind::Switch, "abc"));
        assert_eq!(command.characteristic, Characteristic::On);
        assert_eq!(command.action, TopicAction::Set);

        let command = topics.parse("s2s/hall/AccessoryInformation/Model/get").unwrap();
        assert_eq!(command.service, ServiceKey::new(ServiceKind::AccessoryInformation));
        assert_eq!(command.action, TopicAction::Get);
    }

    #[test]
    fn test_parse_rejects_foreign_topics() {
        let topics = Topics::new("s2s", "hall");
        for topic in [
            "s2s/porch/Switch/On/set",
            "s2s/hall/Switch/On",
            "s2s/hall/Switch/On/toggle",
            "s2s/hall/Lightbulb/On/set",
            "s2s/hall/Switch/Brightness/set",
            "s2s/hallway/Switch/On/set",
        ] {
            assert!(
                matches!(topics.parse(topic), Err(BridgeError::UnknownTopic(_))),
                "{} should be rejected",
                topic
            );
        }
    }
}
