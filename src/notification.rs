//! vCloud notifications as seen by an in-process listener.
//!
//! The message broker itself is external. A consumer bound to the notification exchange with
//! [`routing_key`] hands each decoded payload to [`NotificationListener::process_notification`],
//! which turns the recognized ones into [`VcdEvent`]s and publishes them to every subscriber.

use crate::client::VcdClient;
use crate::constants::{media_type, rel};
use crate::model::Resource;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

const NOTIFICATION_EXCHANGE_ROOT: &str = "notifications20";

/// Routing key selecting all notifications about one entity type, e.g. `vc`.
pub fn routing_key(entity_type: &str) -> String {
    format!("#.#.com.vmware.vcloud.event.{entity_type}.*")
}

/// The fields the listener reads from a notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_type: String,
    pub entity: String,
    pub operation_success: bool,
}

impl Notification {
    /// Reads `type`, `entity` and `operationSuccess`. Returns `None` when `type` or `entity` is
    /// missing.
    pub fn from_payload(payload: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            event_type: payload.get("type")?.clone(),
            entity: payload.get("entity")?.clone(),
            operation_success: payload
                .get("operationSuccess")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

/// A recognized vCenter notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcdEvent {
    VcCreate { entity: String, operation_success: bool },
    /// Also published for `refresh`.
    VcModify { entity: String, operation_success: bool },
    VcDelete { entity: String, operation_success: bool },
}

impl VcdEvent {
    pub fn from_notification(notification: Notification) -> Option<Self> {
        let Notification {
            event_type,
            entity,
            operation_success,
        } = notification;
        match event_type.as_str() {
            "com/vmware/vcloud/event/vc/create" => Some(VcdEvent::VcCreate {
                entity,
                operation_success,
            }),
            "com/vmware/vcloud/event/vc/modify" | "com/vmware/vcloud/event/vc/refresh" => {
                Some(VcdEvent::VcModify {
                    entity,
                    operation_success,
                })
            }
            "com/vmware/vcloud/event/vc/delete" => Some(VcdEvent::VcDelete {
                entity,
                operation_success,
            }),
            _ => None,
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            VcdEvent::VcCreate { entity, .. }
            | VcdEvent::VcModify { entity, .. }
            | VcdEvent::VcDelete { entity, .. } => entity,
        }
    }
}

/// Fans decoded notifications out to subscribers.
#[derive(Debug, Clone)]
pub struct NotificationListener {
    sender: broadcast::Sender<VcdEvent>,
}

impl NotificationListener {
    /// `capacity` bounds how far a slow subscriber may lag before it misses events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VcdEvent> {
        self.sender.subscribe()
    }

    /// Handles one payload. Returns the published event, if the payload was recognized.
    pub fn process_notification(&self, payload: &HashMap<String, String>) -> Option<VcdEvent> {
        tracing::trace!(payload = ?payload, "Received notification");
        let Some(notification) = Notification::from_payload(payload) else {
            tracing::warn!(payload = ?payload, "Ignoring notification without type or entity");
            return None;
        };
        let event_type = notification.event_type.clone();
        let Some(event) = VcdEvent::from_notification(notification) else {
            tracing::warn!(event_type = %event_type, "Ignoring unrecognized notification type");
            return None;
        };
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(event_type = %event_type, "No subscribers for notification");
        }
        Some(event)
    }
}

impl Default for NotificationListener {
    fn default() -> Self {
        Self::new(64)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AmqpSettings {
    #[serde(default)]
    amqp_host: String,
    #[serde(default)]
    amqp_port: u16,
    #[serde(default, rename = "amqpUseSSL")]
    amqp_use_ssl: bool,
    #[serde(default, rename = "amqpSslAcceptAll")]
    amqp_ssl_accept_all: bool,
    #[serde(default)]
    amqp_prefix: String,
}

/// Where and how to connect a notification consumer for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConnectionInfo {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub accept_all_certificates: bool,
    /// `<prefix>.notifications20`.
    pub exchange: String,
}

impl VcdClient {
    /// Reads the broker settings through `extension → systemSettings → amqpSettings`.
    ///
    /// Requires system administrator rights.
    pub async fn broker_connection_info(&self) -> Result<BrokerConnectionInfo> {
        let extension = self.extension().await?;
        let settings: Resource = self
            .get_linked(&extension.data, rel::DOWN, media_type::SYSTEM_SETTINGS)
            .await?
            .data;
        let amqp: AmqpSettings = self
            .get_linked(&settings, rel::DOWN, media_type::AMQP_SETTINGS)
            .await?
            .data;
        Ok(BrokerConnectionInfo {
            exchange: format!("{}.{}", amqp.amqp_prefix, NOTIFICATION_EXCHANGE_ROOT),
            host: amqp.amqp_host,
            port: amqp.amqp_port,
            use_tls: amqp.amqp_use_ssl,
            accept_all_certificates: amqp.amqp_ssl_accept_all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event_type: &str) -> HashMap<String, String> {
        HashMap::from([
            ("type".to_string(), event_type.to_string()),
            ("entity".to_string(), "urn:vcloud:vimserver:1".to_string()),
            ("operationSuccess".to_string(), "true".to_string()),
        ])
    }

    #[test]
    fn test_routing_key() {
        assert_eq!(routing_key("vc"), "#.#.com.vmware.vcloud.event.vc.*");
    }

    #[test]
    fn test_refresh_maps_to_modify() {
        let event = VcdEvent::from_notification(
            Notification::from_payload(&payload("com/vmware/vcloud/event/vc/refresh")).unwrap(),
        );
        assert_eq!(
            event,
            Some(VcdEvent::VcModify {
                entity: "urn:vcloud:vimserver:1".into(),
                operation_success: true
            })
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_recognized_events_only() {
        let listener = NotificationListener::default();
        let mut events = listener.subscribe();

        assert!(listener
            .process_notification(&payload("com/vmware/vcloud/event/vm/create"))
            .is_none());
        listener.process_notification(&payload("com/vmware/vcloud/event/vc/delete"));

        let event = events.recv().await.unwrap();
        assert!(matches!(event, VcdEvent::VcDelete { .. }));
        assert_eq!(event.entity(), "urn:vcloud:vimserver:1");
    }

    #[test]
    fn test_operation_success_defaults_to_false() {
        let mut p = payload("com/vmware/vcloud/event/vc/create");
        p.remove("operationSuccess");
        assert!(!Notification::from_payload(&p).unwrap().operation_success);
        p.remove("entity");
        assert!(Notification::from_payload(&p).is_none());
    }
}
