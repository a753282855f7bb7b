//! Wire formats exchanged with the server: push notification tuples, channel
//! headers and formatted messages, plus their conversion into the typed
//! domain model of [`crate::types`].

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{MODEL_CHANNEL, MODEL_PARTNER, SERVER_DATETIME_FORMAT};
use crate::error::ProtocolError;
use crate::types::{
    Author, Channel, ChannelId, ChannelKind, FoldState, Message, MessageKind, Partner, PartnerId,
};

// ---------------------------------------------------------------------------
// Push notifications
// ---------------------------------------------------------------------------

/// Bus channel a push notification was published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelIdentity {
    /// `[db, "res.partner", id]`: headers addressed to one partner.
    Partner { db: String, partner_id: i64 },
    /// `[db, "mail.channel", id]`: messages of one channel.
    Channel { db: String, channel_id: i64 },
    /// Bare uuid: anonymous livechat session, carries both kinds.
    Session(Uuid),
    Other(String),
}

impl ChannelIdentity {
    /// Decode the bus channel part of a notification tuple. Never fails:
    /// anything unrecognised becomes [`ChannelIdentity::Other`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => match Uuid::parse_str(s) {
                Ok(uuid) => Self::Session(uuid),
                Err(_) => Self::Other(s.clone()),
            },
            Value::Array(parts) if parts.len() == 3 => {
                let db = parts[0].as_str().unwrap_or_default().to_string();
                match (parts[1].as_str(), parts[2].as_i64()) {
                    (Some(MODEL_PARTNER), Some(partner_id)) => Self::Partner { db, partner_id },
                    (Some(MODEL_CHANNEL), Some(channel_id)) => Self::Channel { db, channel_id },
                    _ => Self::Other(value.to_string()),
                }
            }
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether channel headers may be published on this bus channel.
    pub fn carries_headers(&self) -> bool {
        matches!(self, Self::Partner { .. } | Self::Session(_))
    }

    /// Whether channel messages may be published on this bus channel.
    pub fn carries_messages(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Session(_))
    }
}

/// A server-initiated `(channel, payload)` tuple delivered by the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub identity: ChannelIdentity,
    pub payload: Value,
}

impl PushNotification {
    pub fn new(identity: ChannelIdentity, payload: Value) -> Self {
        Self { identity, payload }
    }

    /// Decode a raw `[channel, payload]` pair as sent by the long-polling bus.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(pair) if pair.len() == 2 => Some(Self {
                identity: ChannelIdentity::from_json(&pair[0]),
                payload: pair[1].clone(),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel headers
// ---------------------------------------------------------------------------

/// Channel header as formatted by the server (`channel_info`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub id: i64,
    pub uuid: Uuid,
    #[serde(default)]
    pub channel_name: String,
    pub channel_type: String,
    #[serde(default)]
    pub public: Option<String>,
    #[serde(default)]
    pub state: Option<FoldState>,
    #[serde(default)]
    pub is_minimized: bool,
    #[serde(default)]
    pub direct_partner: Vec<Partner>,
}

impl ChannelHeader {
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(value)?)
    }

    fn kind(&self) -> Result<ChannelKind, ProtocolError> {
        match (self.channel_type.as_str(), self.public.as_deref()) {
            ("chat", _) => Ok(ChannelKind::DirectMessage),
            ("channel", Some("private")) => Ok(ChannelKind::Private),
            ("channel", _) => Ok(ChannelKind::Public),
            (other, _) => Err(self.invalid(format!("unknown channel type {other:?}"))),
        }
    }

    fn invalid(&self, reason: String) -> ProtocolError {
        ProtocolError::InvalidHeader {
            id: self.id.to_string(),
            reason,
        }
    }
}

impl TryFrom<ChannelHeader> for Channel {
    type Error = ProtocolError;

    fn try_from(header: ChannelHeader) -> Result<Self, Self::Error> {
        let kind = header.kind()?;

        let counterpart = match kind {
            ChannelKind::DirectMessage => {
                if header.direct_partner.len() != 1 {
                    return Err(header.invalid(format!(
                        "direct message needs exactly one partner, got {}",
                        header.direct_partner.len()
                    )));
                }
                header.direct_partner.first().cloned()
            }
            _ => None,
        };

        Ok(Channel {
            id: ChannelId::Record(header.id),
            uuid: header.uuid,
            kind,
            display_name: header.channel_name,
            counterpart,
            fold_state: header.state.unwrap_or_default(),
            is_minimized: header.is_minimized,
        })
    }
}

/// Result of the initial bulk load (`channel_fetch_slot`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSlotPayload {
    #[serde(default)]
    pub channel_channel: Vec<ChannelHeader>,
    #[serde(default)]
    pub channel_private_group: Vec<ChannelHeader>,
    #[serde(default)]
    pub channel_direct_message: Vec<ChannelHeader>,
    #[serde(default)]
    pub partners: Vec<Partner>,
    /// Partner id (as a JSON object key) to direct channel id.
    #[serde(default)]
    pub mapping: HashMap<String, i64>,
}

/// Typed form of [`ChannelSlotPayload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSlot {
    pub channels: Vec<Channel>,
    pub partners: Vec<Partner>,
    pub mapping: Vec<(PartnerId, ChannelId)>,
}

impl TryFrom<ChannelSlotPayload> for ChannelSlot {
    type Error = ProtocolError;

    fn try_from(payload: ChannelSlotPayload) -> Result<Self, Self::Error> {
        let channels = payload
            .channel_channel
            .into_iter()
            .chain(payload.channel_private_group)
            .chain(payload.channel_direct_message)
            .map(Channel::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut mapping = Vec::with_capacity(payload.mapping.len());
        for (partner, channel) in payload.mapping {
            let partner = partner
                .trim()
                .parse::<i64>()
                .map_err(|_| ProtocolError::InvalidHeader {
                    id: channel.to_string(),
                    reason: format!("mapping key {partner:?} is not a partner id"),
                })?;
            mapping.push((PartnerId(partner), ChannelId::Record(channel)));
        }
        mapping.sort();

        Ok(Self {
            channels,
            partners: payload.partners,
            mapping,
        })
    }
}

/// Result of `chat_init`: the current user's partner and the notifications
/// queued before the bus started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInitPayload {
    #[serde(default)]
    pub partner_id: Option<i64>,
    #[serde(default)]
    pub notifications: Vec<Value>,
}

/// Typed form of [`ChatInitPayload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatInit {
    pub partner_id: Option<PartnerId>,
    pub notifications: Vec<PushNotification>,
}

impl From<ChatInitPayload> for ChatInit {
    /// Malformed notification entries are skipped.
    fn from(payload: ChatInitPayload) -> Self {
        Self {
            partner_id: payload.partner_id.map(PartnerId),
            notifications: payload
                .notifications
                .iter()
                .filter_map(PushNotification::from_json)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Many2one reference: `[id, display_name]` or `false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Many2One {
    Set(i64, String),
    Unset(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttachmentRef {
    Id(i64),
    Record { id: i64 },
}

impl AttachmentRef {
    pub fn id(&self) -> i64 {
        match self {
            Self::Id(id) | Self::Record { id } => *id,
        }
    }
}

/// Message as formatted by the server (`message_format`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedMessage {
    pub id: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default = "unset")]
    pub author_id: Many2One,
    pub date: String,
    pub message_type: String,
    #[serde(default)]
    pub channel_ids: Vec<ChannelId>,
    #[serde(default)]
    pub needaction_partner_ids: Vec<PartnerId>,
    #[serde(default)]
    pub starred_partner_ids: Vec<PartnerId>,
    #[serde(default)]
    pub attachment_ids: Vec<AttachmentRef>,
}

fn unset() -> Many2One {
    Many2One::Unset(false)
}

impl FormattedMessage {
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(value)?)
    }
}

/// Parse a server timestamp (`YYYY-MM-DD HH:MM:SS`, UTC). RFC 3339 is
/// accepted as well.
pub fn parse_server_datetime(s: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let s = s.trim();
    match NaiveDateTime::parse_from_str(s, SERVER_DATETIME_FORMAT) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(e) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ProtocolError::InvalidTimestamp(e)),
    }
}

impl TryFrom<FormattedMessage> for Message {
    type Error = ProtocolError;

    fn try_from(m: FormattedMessage) -> Result<Self, Self::Error> {
        let created_at = parse_server_datetime(&m.date)?;
        let author = match m.author_id {
            Many2One::Set(id, name) => Some(Author {
                id: PartnerId(id),
                name,
            }),
            Many2One::Unset(_) => None,
        };
        let kind = if m.message_type == "comment" {
            MessageKind::Comment
        } else {
            MessageKind::Notification
        };

        Ok(Message {
            id: crate::types::MessageId(m.id),
            channel_ids: m.channel_ids,
            body: m.body,
            author,
            created_at,
            kind,
            needaction_partner_ids: m.needaction_partner_ids,
            starred_partner_ids: m.starred_partner_ids,
            attachment_ids: m.attachment_ids.iter().map(AttachmentRef::id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dm_header(id: i64, partner: i64) -> Value {
        json!({
            "id": id,
            "uuid": "0b7f5c9e-3c4a-4c1e-9a4b-2f5d8e6a1c3b",
            "channel_name": "Bob",
            "channel_type": "chat",
            "state": "folded",
            "is_minimized": true,
            "direct_partner": [{"id": partner, "name": "Bob", "im_status": "online"}],
        })
    }

    #[test]
    fn test_identity_forms() {
        assert_eq!(
            ChannelIdentity::from_json(&json!(["db", "res.partner", 3])),
            ChannelIdentity::Partner { db: "db".into(), partner_id: 3 }
        );
        assert_eq!(
            ChannelIdentity::from_json(&json!(["db", "mail.channel", 10])),
            ChannelIdentity::Channel { db: "db".into(), channel_id: 10 }
        );
        assert!(matches!(
            ChannelIdentity::from_json(&json!("0b7f5c9e-3c4a-4c1e-9a4b-2f5d8e6a1c3b")),
            ChannelIdentity::Session(_)
        ));
        assert!(matches!(
            ChannelIdentity::from_json(&json!(["db", "res.users", 1])),
            ChannelIdentity::Other(_)
        ));
    }

    #[test]
    fn test_direct_header_to_channel() {
        let header = ChannelHeader::from_value(&dm_header(42, 7)).unwrap();
        let channel = Channel::try_from(header).unwrap();
        assert_eq!(channel.id, ChannelId::Record(42));
        assert_eq!(channel.kind, ChannelKind::DirectMessage);
        assert_eq!(channel.counterpart_id(), Some(PartnerId(7)));
        assert_eq!(channel.fold_state, FoldState::Folded);
        assert!(channel.is_minimized);
    }

    #[test]
    fn test_direct_header_without_partner_is_rejected() {
        let mut value = dm_header(42, 7);
        value["direct_partner"] = json!([]);
        let header = ChannelHeader::from_value(&value).unwrap();
        assert!(Channel::try_from(header).is_err());
    }

    #[test]
    fn test_private_group_kind() {
        let value = json!({
            "id": 5,
            "uuid": "6a1e2c3d-1111-4222-8333-944455556666",
            "channel_name": "board",
            "channel_type": "channel",
            "public": "private",
        });
        let channel = Channel::try_from(ChannelHeader::from_value(&value).unwrap()).unwrap();
        assert_eq!(channel.kind, ChannelKind::Private);
        assert_eq!(channel.fold_state, FoldState::Open);
        assert_eq!(channel.counterpart, None);
    }

    #[test]
    fn test_formatted_message() {
        let value = json!({
            "id": 12,
            "body": "<p>hello</p>",
            "author_id": [3, "Bob"],
            "date": "2016-01-12 10:30:00",
            "message_type": "comment",
            "channel_ids": [10, 11],
            "needaction_partner_ids": [1],
            "attachment_ids": [{"id": 4, "name": "a.pdf"}],
        });
        let msg = Message::try_from(FormattedMessage::from_value(&value).unwrap()).unwrap();
        assert_eq!(msg.kind, MessageKind::Comment);
        assert_eq!(msg.author_name("Visitor"), "Bob");
        assert!(msg.is_needaction(PartnerId(1)));
        assert!(!msg.is_starred(PartnerId(1)));
        assert_eq!(msg.attachment_ids, vec![4]);
        assert_eq!(msg.created_at.to_rfc3339(), "2016-01-12T10:30:00+00:00");
    }

    #[test]
    fn test_anonymous_author() {
        let value = json!({
            "id": 1,
            "author_id": false,
            "date": "2016-01-12 10:30:00",
            "message_type": "notification",
        });
        let msg = Message::try_from(FormattedMessage::from_value(&value).unwrap()).unwrap();
        assert_eq!(msg.author, None);
        assert_eq!(msg.author_name("Visitor"), "Visitor");
        assert_eq!(msg.kind, MessageKind::Notification);
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(parse_server_datetime("yesterday").is_err());
        assert!(parse_server_datetime("2016-01-12T10:30:00Z").is_ok());
    }

    #[test]
    fn test_slot_mapping_keys_are_typed() {
        let payload: ChannelSlotPayload = serde_json::from_value(json!({
            "channel_direct_message": [dm_header(42, 7)],
            "partners": [{"id": 7, "name": "Bob"}],
            "mapping": {"7": 42},
        }))
        .unwrap();
        let slot = ChannelSlot::try_from(payload).unwrap();
        assert_eq!(slot.channels.len(), 1);
        assert_eq!(slot.mapping, vec![(PartnerId(7), ChannelId::Record(42))]);
    }

    #[test]
    fn test_chat_init_skips_malformed() {
        let payload: ChatInitPayload = serde_json::from_value(json!({
            "partner_id": 3,
            "notifications": [[["db", "mail.channel", 1], {"message_type": "comment"}], "junk"],
        }))
        .unwrap();
        let init = ChatInit::from(payload);
        assert_eq!(init.partner_id, Some(PartnerId(3)));
        assert_eq!(init.notifications.len(), 1);
    }
}
