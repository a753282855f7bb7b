//! Scripted in-memory server for the client tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;
use serde_json::{json, Value};
use uuid::Uuid;

use causerie_shared::protocol::{ChannelSlot, ChatInit};
use causerie_shared::types::{
    Channel, ChannelId, ChannelKind, FoldState, Message, MessageId, MessageKind, Partner, PartnerId,
    PresenceStatus, Privacy,
};

use crate::transport::{MessageQuery, MessageScope, Transport};

/// Partner of the logged-in user.
pub const ME: PartnerId = PartnerId(3);

#[derive(Debug, Default)]
pub struct ServerState {
    pub init: ChatInit,
    pub slot: ChannelSlot,
    /// Channels known to `channel_info` and `join_channel`.
    pub joinable: Vec<Channel>,
    pub messages: Vec<Message>,
    pub next_id: i64,
    pub failing_posts: u32,
    pub fail_mark_seen: bool,
    pub fail_pin: bool,
    /// When set, `mark_seen` waits for a notification before answering.
    pub mark_seen_gate: Option<Arc<Notify>>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<ServerState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let state = ServerState {
            init: ChatInit {
                partner_id: Some(ME),
                notifications: Vec::new(),
            },
            next_id: 1000,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self, method: &str) -> usize {
        self.with(|s| s.calls.get(method).copied().unwrap_or(0))
    }

    fn record(&self, method: &'static str) -> std::sync::MutexGuard<'_, ServerState> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_default() += 1;
        state
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn chat_init(&self) -> anyhow::Result<ChatInit> {
        Ok(self.record("chat_init").init.clone())
    }

    async fn fetch_channel_slot(&self) -> anyhow::Result<ChannelSlot> {
        Ok(self.record("fetch_channel_slot").slot.clone())
    }

    async fn channel_info(&self, ids: &[i64]) -> anyhow::Result<Vec<Channel>> {
        let state = self.record("channel_info");
        Ok(state
            .joinable
            .iter()
            .filter(|c| c.id.record().is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn get_or_create_direct_channel(&self, partners: &[PartnerId]) -> anyhow::Result<Channel> {
        let mut state = self.record("get_or_create_direct_channel");
        let partner = *partners.first().ok_or_else(|| anyhow!("no partner"))?;
        state.next_id += 1;
        let mut channel = direct(state.next_id, partner.0, &format!("partner {partner}"));
        channel.is_minimized = true;
        Ok(channel)
    }

    async fn create_channel(&self, name: &str, privacy: Privacy) -> anyhow::Result<Channel> {
        let mut state = self.record("create_channel");
        state.next_id += 1;
        let mut channel = public(state.next_id, name);
        if privacy == Privacy::Private {
            channel.kind = ChannelKind::Private;
        }
        Ok(channel)
    }

    async fn join_channel(&self, id: i64) -> anyhow::Result<Channel> {
        let state = self.record("join_channel");
        state
            .joinable
            .iter()
            .find(|c| c.id == ChannelId::Record(id))
            .cloned()
            .ok_or_else(|| anyhow!("channel {id} does not exist"))
    }

    async fn pin_channel(&self, _uuid: Uuid, _pinned: bool) -> anyhow::Result<()> {
        if self.record("pin_channel").fail_pin {
            bail!("access denied");
        }
        Ok(())
    }

    async fn invite_to_channel(&self, _id: i64, _partners: &[PartnerId]) -> anyhow::Result<()> {
        self.record("invite_to_channel");
        Ok(())
    }

    async fn set_fold_state(&self, _uuid: Uuid, _state: FoldState) -> anyhow::Result<()> {
        self.record("set_fold_state");
        Ok(())
    }

    async fn fetch_messages(&self, query: MessageQuery, limit: usize) -> anyhow::Result<Vec<Message>> {
        let state = self.record("fetch_messages");
        let mut found: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| match query.scope {
                MessageScope::Channel(id) => m.targets(&ChannelId::Record(id)),
                MessageScope::Needaction => m.is_needaction(ME),
                MessageScope::Starred => m.is_starred(ME),
            })
            .filter(|m| query.before.map_or(true, |before| m.id < before))
            .filter(|m| query.matches_search(m))
            .cloned()
            .collect();
        found.sort_by_key(|m| std::cmp::Reverse(m.id));
        found.truncate(limit);
        Ok(found)
    }

    async fn post_message(&self, channel: i64, body: &str, _attachments: &[i64]) -> anyhow::Result<MessageId> {
        let mut state = self.record("post_message");
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            bail!("server unavailable");
        }
        state.next_id += 1;
        let mut posted = message(state.next_id, &[channel]);
        posted.body = body.to_string();
        let id = posted.id;
        state.messages.push(posted);
        Ok(id)
    }

    async fn mark_seen(&self, _channel: ChannelId, _last_seen: Option<MessageId>) -> anyhow::Result<()> {
        let (fail, gate) = {
            let state = self.record("mark_seen");
            (state.fail_mark_seen, state.mark_seen_gate.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if fail {
            bail!("server unavailable");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn partner(id: i64, name: &str) -> Partner {
    Partner {
        id: PartnerId(id),
        name: name.to_string(),
        im_status: PresenceStatus::Online,
    }
}

pub fn public(id: i64, name: &str) -> Channel {
    Channel {
        id: ChannelId::Record(id),
        uuid: Uuid::from_u128(id as u128),
        kind: ChannelKind::Public,
        display_name: name.to_string(),
        counterpart: None,
        fold_state: FoldState::Open,
        is_minimized: false,
    }
}

pub fn direct(id: i64, partner_id: i64, name: &str) -> Channel {
    Channel {
        kind: ChannelKind::DirectMessage,
        counterpart: Some(partner(partner_id, name)),
        ..public(id, name)
    }
}

pub fn message(id: i64, channels: &[i64]) -> Message {
    Message {
        id: MessageId(id),
        channel_ids: channels.iter().copied().map(ChannelId::Record).collect(),
        body: format!("message {id}"),
        author: None,
        created_at: Utc.with_ymd_and_hms(2016, 1, 12, 10, 30, 0).unwrap(),
        kind: MessageKind::Comment,
        needaction_partner_ids: Vec::new(),
        starred_partner_ids: Vec::new(),
        attachment_ids: Vec::new(),
    }
}

/// Direct-message header as pushed on a partner bus.
pub fn header_json(id: i64, partner_id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "uuid": Uuid::from_u128(id as u128).to_string(),
        "channel_name": name,
        "channel_type": "chat",
        "direct_partner": [{"id": partner_id, "name": name, "im_status": "online"}],
    })
}

/// Formatted message as pushed on a channel bus.
pub fn message_json(id: i64, channels: &[i64]) -> Value {
    json!({
        "id": id,
        "body": format!("message {id}"),
        "author_id": [7, "bob"],
        "date": "2016-01-12 10:30:00",
        "message_type": "comment",
        "channel_ids": channels,
    })
}
