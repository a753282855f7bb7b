//! Classification of push notifications.
//!
//! The bus publishes channel headers on partner channels and messages on
//! channel channels; anonymous sessions (bare uuid) carry both. The router
//! decodes the payload into the typed model and tells the client which
//! handler applies. Anything it cannot make sense of is dropped.

use serde_json::Value;
use tracing::debug;

use causerie_shared::protocol::{ChannelHeader, FormattedMessage, PushNotification};
use causerie_shared::types::{Channel, ChannelId, Message};

/// Destination of a push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// New or updated channel header.
    Header(Channel),
    /// The user left the channel (possibly from another client).
    Unsubscribed(ChannelId),
    /// Message to fan out to every channel it belongs to.
    Message(Message),
    Dropped,
}

/// Counters kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub headers: u64,
    pub messages: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct NotificationRouter {
    stats: RouterStats,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, notification: &PushNotification) -> Routed {
        let routed = classify(notification);
        match &routed {
            Routed::Header(_) | Routed::Unsubscribed(_) => self.stats.headers += 1,
            Routed::Message(_) => self.stats.messages += 1,
            Routed::Dropped => self.stats.dropped += 1,
        }
        routed
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

fn classify(notification: &PushNotification) -> Routed {
    let identity = &notification.identity;
    let payload = &notification.payload;

    if identity.carries_headers() {
        if has_key(payload, "uuid") {
            return match ChannelHeader::from_value(payload).and_then(Channel::try_from) {
                Ok(channel) => Routed::Header(channel),
                Err(e) => drop_payload(notification, &e.to_string()),
            };
        }
        if payload.get("info").and_then(Value::as_str) == Some("unsubscribe") {
            return match payload.get("id").and_then(Value::as_i64) {
                Some(id) => Routed::Unsubscribed(ChannelId::Record(id)),
                None => drop_payload(notification, "unsubscribe without channel id"),
            };
        }
    }

    if identity.carries_messages() && has_key(payload, "message_type") {
        return match FormattedMessage::from_value(payload).and_then(Message::try_from) {
            Ok(message) => Routed::Message(message),
            Err(e) => drop_payload(notification, &e.to_string()),
        };
    }

    drop_payload(notification, "unrecognised payload")
}

fn has_key(payload: &Value, key: &str) -> bool {
    payload.get(key).is_some_and(|v| !v.is_null())
}

fn drop_payload(notification: &PushNotification, reason: &str) -> Routed {
    debug!(identity = ?notification.identity, reason, "Dropping push notification");
    Routed::Dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::protocol::ChannelIdentity;
    use causerie_shared::types::{ChannelKind, MessageId, PartnerId};
    use serde_json::json;

    const UUID: &str = "0b7f5c9e-3c4a-4c1e-9a4b-2f5d8e6a1c3b";

    fn partner_bus() -> ChannelIdentity {
        ChannelIdentity::Partner { db: "db".into(), partner_id: 1 }
    }

    fn channel_bus(id: i64) -> ChannelIdentity {
        ChannelIdentity::Channel { db: "db".into(), channel_id: id }
    }

    fn header_payload() -> Value {
        json!({
            "id": 42,
            "uuid": UUID,
            "channel_name": "bob",
            "channel_type": "chat",
            "direct_partner": [{"id": 7, "name": "bob"}],
        })
    }

    fn message_payload() -> Value {
        json!({
            "id": 5,
            "body": "hi",
            "author_id": [7, "bob"],
            "date": "2016-01-12 10:30:00",
            "message_type": "comment",
            "channel_ids": [10],
        })
    }

    #[test]
    fn test_header_on_partner_bus() {
        let mut router = NotificationRouter::new();
        let routed = router.route(&PushNotification::new(partner_bus(), header_payload()));
        match routed {
            Routed::Header(channel) => {
                assert_eq!(channel.id, ChannelId::Record(42));
                assert_eq!(channel.kind, ChannelKind::DirectMessage);
                assert_eq!(channel.counterpart_id(), Some(PartnerId(7)));
            }
            other => panic!("expected header, got {other:?}"),
        }
        assert_eq!(router.stats().headers, 1);
    }

    #[test]
    fn test_message_on_channel_bus() {
        let mut router = NotificationRouter::new();
        let routed = router.route(&PushNotification::new(channel_bus(10), message_payload()));
        assert!(matches!(routed, Routed::Message(ref m) if m.id == MessageId(5)));
    }

    #[test]
    fn test_session_bus_carries_both() {
        let mut router = NotificationRouter::new();
        let session = ChannelIdentity::Session(UUID.parse().unwrap());
        assert!(matches!(
            router.route(&PushNotification::new(session.clone(), header_payload())),
            Routed::Header(_)
        ));
        assert!(matches!(
            router.route(&PushNotification::new(session, message_payload())),
            Routed::Message(_)
        ));
    }

    #[test]
    fn test_wrong_bus_is_dropped() {
        let mut router = NotificationRouter::new();
        // A header on a channel bus and a message on a partner bus.
        assert_eq!(router.route(&PushNotification::new(channel_bus(10), header_payload())), Routed::Dropped);
        assert_eq!(router.route(&PushNotification::new(partner_bus(), message_payload())), Routed::Dropped);
        assert_eq!(router.stats().dropped, 2);
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let mut router = NotificationRouter::new();
        let mut bad_date = message_payload();
        bad_date["date"] = json!("not a date");
        assert_eq!(router.route(&PushNotification::new(channel_bus(10), bad_date)), Routed::Dropped);
        assert_eq!(
            router.route(&PushNotification::new(partner_bus(), json!({"uuid": "nope"}))),
            Routed::Dropped
        );
        assert_eq!(
            router.route(&PushNotification::new(ChannelIdentity::Other("x".into()), message_payload())),
            Routed::Dropped
        );
        assert_eq!(router.route(&PushNotification::new(partner_bus(), json!(42))), Routed::Dropped);
    }

    #[test]
    fn test_unsubscribe_notice() {
        let mut router = NotificationRouter::new();
        let routed = router.route(&PushNotification::new(
            partner_bus(),
            json!({"info": "unsubscribe", "id": 12, "name": "sales"}),
        ));
        assert_eq!(routed, Routed::Unsubscribed(ChannelId::Record(12)));
    }
}
