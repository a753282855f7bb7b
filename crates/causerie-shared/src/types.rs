use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::{VIRTUAL_INBOX, VIRTUAL_STARRED};
use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a channel.
///
/// Real channels carry the server record id. The inbox and starred boxes are
/// virtual channels addressed by reserved strings that can never collide with
/// a record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelId {
    Record(i64),
    Inbox,
    Starred,
}

impl ChannelId {
    pub fn is_virtual(&self) -> bool {
        !matches!(self, Self::Record(_))
    }

    /// Server record id, `None` for virtual channels.
    pub fn record(&self) -> Option<i64> {
        match self {
            Self::Record(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(id) => write!(f, "{id}"),
            Self::Inbox => f.write_str(VIRTUAL_INBOX),
            Self::Starred => f.write_str(VIRTUAL_STARRED),
        }
    }
}

impl FromStr for ChannelId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            VIRTUAL_INBOX => Ok(Self::Inbox),
            VIRTUAL_STARRED => Ok(Self::Starred),
            other => other
                .parse::<i64>()
                .map(Self::Record)
                .map_err(|_| ProtocolError::InvalidChannelId(s.to_string())),
        }
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self::Record(id)
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Record(id) => serializer.serialize_i64(*id),
            Self::Inbox => serializer.serialize_str(VIRTUAL_INBOX),
            Self::Starred => serializer.serialize_str(VIRTUAL_STARRED),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChannelIdVisitor;

        impl<'de> Visitor<'de> for ChannelIdVisitor {
            type Value = ChannelId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer channel id or a reserved virtual channel name")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ChannelId, E> {
                Ok(ChannelId::Record(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ChannelId, E> {
                i64::try_from(v)
                    .map(ChannelId::Record)
                    .map_err(|_| E::custom("channel id out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ChannelId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ChannelIdVisitor)
    }
}

/// Identity of a conversation counterpart (a partner record id).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PartnerId(pub i64);

impl fmt::Display for PartnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message id. Monotonically increasing server-side, so it doubles as the
/// sort key of every feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Broadcast channel anyone can join.
    Public,
    /// Broadcast channel restricted to invited members.
    Private,
    /// One-to-one conversation.
    DirectMessage,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Public, Self::Private, Self::DirectMessage];
}

/// Privacy requested when creating a broadcast channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FoldState {
    #[default]
    Open,
    Folded,
    Closed,
}

impl FoldState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Folded => "folded",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    #[default]
    #[serde(other)]
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    #[serde(default)]
    pub im_status: PresenceStatus,
}

/// Channel header as cached by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    /// Session marker used by fold and pin calls.
    pub uuid: Uuid,
    pub kind: ChannelKind,
    pub display_name: String,
    /// Present only for direct messages.
    pub counterpart: Option<Partner>,
    pub fold_state: FoldState,
    /// The server wants a minimized conversation popup for this channel.
    pub is_minimized: bool,
}

impl Channel {
    pub fn counterpart_id(&self) -> Option<PartnerId> {
        self.counterpart.as_ref().map(|p| p.id)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Comment,
    /// System or meta message (joins, notifications, ...).
    Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: PartnerId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_ids: Vec<ChannelId>,
    pub body: String,
    /// `None` for anonymous visitors.
    pub author: Option<Author>,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub needaction_partner_ids: Vec<PartnerId>,
    pub starred_partner_ids: Vec<PartnerId>,
    pub attachment_ids: Vec<i64>,
}

impl Message {
    pub fn targets(&self, channel: &ChannelId) -> bool {
        self.channel_ids.contains(channel)
    }

    pub fn is_needaction(&self, partner: PartnerId) -> bool {
        self.needaction_partner_ids.contains(&partner)
    }

    pub fn is_starred(&self, partner: PartnerId) -> bool {
        self.starred_partner_ids.contains(&partner)
    }

    /// Author name, falling back to `anonymous` for visitor messages.
    pub fn author_name<'a>(&'a self, anonymous: &'a str) -> &'a str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or(anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_parse() {
        assert_eq!("42".parse::<ChannelId>().unwrap(), ChannelId::Record(42));
        assert_eq!("channel_inbox".parse::<ChannelId>().unwrap(), ChannelId::Inbox);
        assert_eq!("channel_starred".parse::<ChannelId>().unwrap(), ChannelId::Starred);
        assert!("general".parse::<ChannelId>().is_err());
    }

    #[test]
    fn test_channel_id_json_forms() {
        let ids: Vec<ChannelId> = serde_json::from_str(r#"[7, "7", "channel_inbox"]"#).unwrap();
        assert_eq!(ids, vec![ChannelId::Record(7), ChannelId::Record(7), ChannelId::Inbox]);

        let out = serde_json::to_string(&[ChannelId::Record(3), ChannelId::Starred]).unwrap();
        assert_eq!(out, r#"[3,"channel_starred"]"#);
    }

    #[test]
    fn test_virtual_ids() {
        assert!(ChannelId::Inbox.is_virtual());
        assert_eq!(ChannelId::Starred.record(), None);
        assert_eq!(ChannelId::Record(9).record(), Some(9));
    }

    #[test]
    fn test_unknown_presence_is_offline() {
        let p: Partner = serde_json::from_str(r#"{"id": 3, "name": "Bob", "im_status": "busy"}"#).unwrap();
        assert_eq!(p.im_status, PresenceStatus::Offline);
    }
}
