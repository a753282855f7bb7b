//! Contract with the server.
//!
//! The client never talks to the network itself: every request goes through
//! a [`Transport`] implementation, and push notifications arrive on the
//! channel handed to [`crate::spawn_client`]. Implementations decode the
//! server formats with the helpers of [`causerie_shared::protocol`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use causerie_shared::protocol::{ChannelSlot, ChatInit};
use causerie_shared::types::{Channel, ChannelId, FoldState, Message, MessageId, PartnerId, Privacy};

/// Which messages a fetch selects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageScope {
    /// Messages posted in one channel.
    Channel(i64),
    /// Messages waiting for an action of the current user (virtual inbox).
    Needaction,
    /// Messages the current user starred.
    Starred,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageQuery {
    pub scope: MessageScope,
    /// Only messages with a smaller id (history backfill).
    pub before: Option<MessageId>,
    /// Only messages whose body contains these terms, case-insensitively.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl MessageQuery {
    pub fn for_channel(channel: ChannelId, before: Option<MessageId>) -> Self {
        let scope = match channel {
            ChannelId::Record(id) => MessageScope::Channel(id),
            ChannelId::Inbox => MessageScope::Needaction,
            ChannelId::Starred => MessageScope::Starred,
        };
        Self {
            scope,
            before,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.search = search.map(str::to_string);
        self
    }

    /// Whether `message` satisfies the search terms of this query.
    pub fn matches_search(&self, message: &Message) -> bool {
        self.search
            .as_deref()
            .map_or(true, |terms| message.body.to_lowercase().contains(&terms.to_lowercase()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Current user and notifications queued before the bus started.
    async fn chat_init(&self) -> anyhow::Result<ChatInit>;

    /// Initial bulk load: channels by kind, counterpart list and index.
    async fn fetch_channel_slot(&self) -> anyhow::Result<ChannelSlot>;

    /// Headers of the given channels.
    async fn channel_info(&self, ids: &[i64]) -> anyhow::Result<Vec<Channel>>;

    async fn get_or_create_direct_channel(&self, partners: &[PartnerId]) -> anyhow::Result<Channel>;

    async fn create_channel(&self, name: &str, privacy: Privacy) -> anyhow::Result<Channel>;

    async fn join_channel(&self, id: i64) -> anyhow::Result<Channel>;

    async fn pin_channel(&self, uuid: Uuid, pinned: bool) -> anyhow::Result<()>;

    async fn invite_to_channel(&self, id: i64, partners: &[PartnerId]) -> anyhow::Result<()>;

    async fn set_fold_state(&self, uuid: Uuid, state: FoldState) -> anyhow::Result<()>;

    /// At most `limit` messages matching `query`, in any order.
    async fn fetch_messages(&self, query: MessageQuery, limit: usize) -> anyhow::Result<Vec<Message>>;

    async fn post_message(&self, channel: i64, body: &str, attachments: &[i64]) -> anyhow::Result<MessageId>;

    /// Acknowledge everything in `channel` up to `last_seen`.
    async fn mark_seen(&self, channel: ChannelId, last_seen: Option<MessageId>) -> anyhow::Result<()>;
}
