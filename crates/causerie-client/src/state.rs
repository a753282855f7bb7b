//! Everything the client knows, owned by the actor task.
//!
//! [`ClientState`] applies pushes, user actions and RPC results synchronously
//! and emits the matching [`ClientEvent`]s. Work that needs the network is
//! returned as [`Effect`]s for the actor to run.

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use causerie_shared::protocol::{ChannelSlot, ChatInit, PushNotification};
use causerie_shared::types::{
    Channel, ChannelId, ChannelKind, FoldState, Message, MessageId, MessageKind, Partner,
    PartnerId,
};
use causerie_store::{ChannelStore, HistoryQuery, StoreError, UpsertOutcome};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{ClientEvent, EventSink, FeedTarget};
use crate::router::{NotificationRouter, Routed};
use crate::sessions::{ApplyOptions, FoldChange, PopupChange, SessionTracker};
use crate::thread::{ChannelView, MessageThread};
use crate::transport::MessageQuery;
use crate::unread::{UnreadMarker, UnreadTracker};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Feed a history page is fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryOwner {
    Current,
    /// A popup, identified by its creation sequence so that a page fetched
    /// for a closed popup never lands in a newer one for the same channel.
    Popup { channel: ChannelId, seq: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryRequest {
    pub owner: HistoryOwner,
    pub query: HistoryQuery,
    pub request: MessageQuery,
}

/// Network work requested by a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Headers of channels referenced by a message but not cached.
    FetchChannelInfo(Vec<i64>),
    SyncFold {
        id: ChannelId,
        uuid: Uuid,
        state: FoldState,
    },
    FetchHistory(HistoryRequest),
}

/// What a `mark_seen` request covers, captured when it is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Acknowledgement {
    pub last_seen: Option<MessageId>,
    /// Unread count of the channel at that time.
    pub count: u32,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A message as the renderer shows it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub author: String,
    pub body: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub kind: MessageKind,
    pub is_needaction: bool,
    pub is_starred: bool,
    pub attachment_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PopupSnapshot {
    pub channel: ChannelId,
    pub name: String,
    pub fold: FoldState,
    pub right_offset: u32,
    pub pending: u32,
    pub messages: Vec<MessageView>,
    pub history_exhausted: bool,
}

/// Read-only copy of the client state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub me: Option<PartnerId>,
    pub current: ChannelId,
    pub current_name: String,
    pub search: Option<String>,
    pub public: Vec<Channel>,
    pub private: Vec<Channel>,
    pub direct: Vec<Channel>,
    pub partners: Vec<Partner>,
    pub feed: Vec<MessageView>,
    pub feed_exhausted: bool,
    pub popups: Vec<PopupSnapshot>,
    pub unread: Vec<(ChannelId, UnreadMarker)>,
    pub global_unread: u32,
}

impl ClientSnapshot {
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.public
            .iter()
            .chain(&self.private)
            .chain(&self.direct)
            .find(|c| c.id == id)
    }

    pub fn popup(&self, id: ChannelId) -> Option<&PopupSnapshot> {
        self.popups.iter().find(|p| p.channel == id)
    }

    pub fn unread(&self, id: ChannelId) -> UnreadMarker {
        self.unread
            .iter()
            .find(|(c, _)| *c == id)
            .map(|(_, m)| *m)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ClientState {
    config: ClientConfig,
    me: Option<PartnerId>,
    store: ChannelStore,
    sessions: SessionTracker,
    unread: UnreadTracker,
    router: NotificationRouter,
    view: ChannelView,
    events: EventSink,
}

impl ClientState {
    pub fn new(config: ClientConfig, events: EventSink) -> Self {
        let sessions = SessionTracker::new(config.popup_right_offset, config.popup_width);
        Self {
            view: ChannelView::new(config.default_channel),
            config,
            me: None,
            store: ChannelStore::new(),
            sessions,
            unread: UnreadTracker::new(),
            router: NotificationRouter::new(),
            events,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn emit(&mut self, event: ClientEvent) {
        self.events.emit(event);
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Initial bulk load. Channels the server wants minimized get a popup.
    pub fn load_slot(&mut self, slot: ChannelSlot) -> Vec<Effect> {
        let loaded = self.store.load_slot(slot);
        info!(channels = loaded, partners = self.store.partners().len(), "Channel slot loaded");

        for kind in ChannelKind::ALL {
            self.emit(ClientEvent::ChannelListChanged { kind });
        }
        self.emit(ClientEvent::PartnersChanged);

        let minimized: Vec<Channel> = ChannelKind::ALL
            .iter()
            .flat_map(|kind| self.store.list(*kind))
            .filter(|c| c.is_minimized)
            .cloned()
            .collect();

        let mut effects = Vec::new();
        for channel in minimized {
            effects.extend(self.apply_session(channel, ApplyOptions::default()));
        }
        effects
    }

    /// Remember the current user and replay the notifications queued before
    /// the bus started.
    pub fn replay(&mut self, init: ChatInit) -> Vec<Effect> {
        self.me = init.partner_id;
        debug!(partner = ?self.me, pending = init.notifications.len(), "Replaying pending notifications");
        init.notifications
            .iter()
            .flat_map(|n| self.handle_push(n))
            .collect()
    }

    /// Select the configured default channel, or the inbox when it is not
    /// available.
    pub fn select_default(&mut self) -> Vec<Effect> {
        let default = self.config.default_channel;
        match self.select_channel(default) {
            Ok(effects) => effects,
            Err(_) => {
                warn!(channel = %default, "Default channel not found, using inbox");
                self.switch_view(ChannelId::Inbox)
            }
        }
    }

    // ------------------------------------------------------------------
    // Pushes
    // ------------------------------------------------------------------

    pub fn handle_push(&mut self, notification: &PushNotification) -> Vec<Effect> {
        match self.router.route(notification) {
            Routed::Header(channel) => {
                let options = ApplyOptions {
                    adopt_remote_fold: true,
                    ..Default::default()
                };
                let id = channel.id;
                self.on_header(channel, options).unwrap_or_else(|e| {
                    warn!(channel = %id, error = %e, "Rejected pushed channel header");
                    Vec::new()
                })
            }
            Routed::Unsubscribed(id) => {
                info!(channel = %id, "Unsubscribed from channel");
                self.remove_channel(&id)
            }
            Routed::Message(message) => self.on_message(message),
            Routed::Dropped => Vec::new(),
        }
    }

    /// Cache a channel header and bind it to its popup when it has (or
    /// should get) one.
    pub fn on_header(&mut self, channel: Channel, options: ApplyOptions) -> Result<Vec<Effect>, StoreError> {
        let id = channel.id;
        let kind = channel.kind;

        match self.store.upsert(channel.clone())? {
            UpsertOutcome::Inserted => {
                debug!(channel = %id, kind = ?kind, "Channel added");
                self.emit(ClientEvent::ChannelListChanged { kind });
                if kind == ChannelKind::DirectMessage {
                    self.emit(ClientEvent::PartnersChanged);
                }
            }
            UpsertOutcome::Updated { previous } => {
                self.emit(ClientEvent::ChannelListChanged { kind });
                if previous.kind != kind {
                    self.emit(ClientEvent::ChannelListChanged { kind: previous.kind });
                }
                if previous.counterpart != channel.counterpart {
                    self.emit(ClientEvent::PartnersChanged);
                }
                if self.view.channel_id() == id && previous.display_name != channel.display_name {
                    self.emit_current();
                }
            }
            UpsertOutcome::Unchanged => {}
        }

        if options.force_open || channel.is_minimized || self.sessions.contains(&id) {
            Ok(self.apply_session(channel, options))
        } else {
            Ok(Vec::new())
        }
    }

    fn on_message(&mut self, message: Message) -> Vec<Effect> {
        let me = self.me;

        for id in self.sessions.deliver(&message, me) {
            self.emit_popup(&id, false);
            self.emit(ClientEvent::FeedChanged {
                target: FeedTarget::Popup(id),
            });
        }

        if self.view.receive(&message, me) {
            self.emit(ClientEvent::FeedChanged {
                target: FeedTarget::Current,
            });
        }

        for id in self.unread.record(&message, me) {
            self.emit_unread(id);
        }

        let missing = self.store.missing(&message.channel_ids);
        if missing.is_empty() {
            Vec::new()
        } else {
            debug!(channels = ?missing, "Message references unknown channels");
            vec![Effect::FetchChannelInfo(missing)]
        }
    }

    /// Drop a channel everywhere. Unknown ids are ignored.
    pub fn remove_channel(&mut self, id: &ChannelId) -> Vec<Effect> {
        if let Some(channel) = self.store.remove(id) {
            self.emit(ClientEvent::ChannelListChanged { kind: channel.kind });
            if channel.kind == ChannelKind::DirectMessage {
                self.emit(ClientEvent::PartnersChanged);
            }
        }

        if self.sessions.remove_channel(id) {
            self.emit(ClientEvent::PopupClosed { id: *id });
            self.emit_all_popups();
        }

        if self.unread.forget(*id) > 0 {
            self.emit_unread(*id);
        }

        if self.view.channel_id() == *id {
            self.select_default()
        } else {
            Vec::new()
        }
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    pub fn select_channel(&mut self, id: ChannelId) -> Result<Vec<Effect>, ClientError> {
        if !id.is_virtual() && !self.store.contains(&id) {
            return Err(ClientError::UnknownChannel(id));
        }
        Ok(self.switch_view(id))
    }

    fn switch_view(&mut self, id: ChannelId) -> Vec<Effect> {
        info!(channel = %id, "Current channel changed");
        self.view.switch_to(id);
        if self.unread.focus(id) {
            self.emit_unread(id);
        }
        self.emit_current();
        self.emit(ClientEvent::FeedChanged {
            target: FeedTarget::Current,
        });

        if self.config.load_history {
            self.view_history().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Cached direct channel with `partner`.
    pub fn direct_channel(&self, partner: PartnerId) -> Option<Channel> {
        self.store
            .get_by_counterpart(partner)
            .and_then(|id| self.store.get(id))
            .cloned()
    }

    /// Show `channel` in a focused, open popup.
    pub fn open_popup(&mut self, channel: Channel) -> Result<Vec<Effect>, ClientError> {
        let options = ApplyOptions {
            force_open: true,
            focus: true,
            ..Default::default()
        };
        Ok(self.on_header(channel, options)?)
    }

    pub fn set_fold_state(&mut self, id: ChannelId, state: FoldState) -> Result<Vec<Effect>, ClientError> {
        if !self.sessions.contains(&id) {
            return Err(ClientError::NoPopup(id));
        }
        Ok(self
            .sessions
            .set_fold_state(&id, state)
            .map(|change| self.on_fold_change(change))
            .unwrap_or_default())
    }

    pub fn toggle_fold(&mut self, id: ChannelId) -> Result<Vec<Effect>, ClientError> {
        match self.sessions.toggle_fold(&id) {
            Some(change) => Ok(self.on_fold_change(change)),
            None => Err(ClientError::NoPopup(id)),
        }
    }

    /// Restrict the main panel to messages matching `terms`, or lift the
    /// restriction with `None`. The feed is fetched again.
    pub fn search(&mut self, terms: Option<&str>) -> Vec<Effect> {
        if !self.view.set_search(terms) {
            return Vec::new();
        }
        info!(channel = %self.view.channel_id(), search = ?self.view.search(), "Message search changed");
        self.emit(ClientEvent::FeedChanged {
            target: FeedTarget::Current,
        });
        self.view_history().into_iter().collect()
    }

    pub fn load_history(&mut self, target: FeedTarget) -> Result<Option<Effect>, ClientError> {
        match target {
            FeedTarget::Current => Ok(self.view_history()),
            FeedTarget::Popup(id) if self.sessions.contains(&id) => Ok(self.popup_history(&id)),
            FeedTarget::Popup(id) => Err(ClientError::NoPopup(id)),
        }
    }

    /// Record id and uuid of a stored channel.
    pub fn channel_uuid(&self, id: ChannelId) -> Result<Uuid, ClientError> {
        self.store
            .get(&id)
            .map(|c| c.uuid)
            .ok_or(ClientError::UnknownChannel(id))
    }

    /// Record id of the current channel, for invitations.
    pub fn invite_target(&self) -> Result<i64, ClientError> {
        let current = self.view.channel_id();
        match current.record() {
            Some(id) if self.store.contains(&current) => Ok(id),
            Some(_) => Err(ClientError::UnknownChannel(current)),
            None => Err(ClientError::NotPostable(current)),
        }
    }

    /// Record id of the current channel, checked for posting `body`.
    pub fn post_target(&self, body: &str, attachments: &[i64]) -> Result<i64, ClientError> {
        if body.trim().is_empty() && attachments.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        self.invite_target()
    }

    /// Record id of a popup's channel, checked for posting `body`.
    pub fn popup_post_target(&self, id: ChannelId, body: &str) -> Result<i64, ClientError> {
        if body.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if !self.sessions.contains(&id) {
            return Err(ClientError::NoPopup(id));
        }
        id.record().ok_or(ClientError::NotPostable(id))
    }

    /// Last message id the user has seen in `id` (if it is shown anywhere)
    /// and the unread count the acknowledgement will clear.
    pub fn acknowledge_target(&self, id: ChannelId) -> Result<Acknowledgement, ClientError> {
        if !id.is_virtual() && !self.store.contains(&id) {
            return Err(ClientError::UnknownChannel(id));
        }
        let last_seen = if self.view.channel_id() == id {
            self.view.feed().last_id()
        } else {
            self.sessions.popup(&id).and_then(|p| p.feed().last_id())
        };
        Ok(Acknowledgement {
            last_seen,
            count: self.unread.marker(id).count,
        })
    }

    pub fn partner_names(&self, ids: &[PartnerId]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.store
                    .partners()
                    .iter()
                    .find(|p| p.id == *id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // RPC results
    // ------------------------------------------------------------------

    pub fn complete_history(&mut self, request: HistoryRequest, result: anyhow::Result<Vec<Message>>) {
        let HistoryRequest { owner, query, .. } = request;
        let (target, thread): (FeedTarget, &mut dyn MessageThread) = match owner {
            HistoryOwner::Current => (FeedTarget::Current, &mut self.view as &mut dyn MessageThread),
            HistoryOwner::Popup { channel, seq } => match self.sessions.popup_with_seq(&channel, seq) {
                Some(popup) => (FeedTarget::Popup(channel), popup as &mut dyn MessageThread),
                None => {
                    debug!(channel = %channel, seq, "Discarding history of a closed popup");
                    return;
                }
            },
        };

        let feed = thread.feed_mut();
        match result {
            Ok(messages) => {
                let inserted = feed.complete_history(query, messages);
                debug!(feed = ?target, inserted, exhausted = feed.is_exhausted(), "History page applied");
                if inserted > 0 || feed.is_exhausted() {
                    self.events.emit(ClientEvent::FeedChanged { target });
                }
            }
            Err(e) => {
                warn!(feed = ?target, error = %e, "History fetch failed");
                feed.abort_history(query);
            }
        }
    }

    /// The server confirmed `ack` for `id`. Messages counted since the
    /// request was issued stay unread.
    pub fn clear_unread(&mut self, id: ChannelId, ack: Acknowledgement) {
        let cleared = self.unread.acknowledge(id, ack.count);
        debug!(channel = %id, cleared, remaining = self.unread.marker(id).count, "Unread marker acknowledged");
        if cleared > 0 {
            self.emit_unread(id);
        }
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        let me = self.me;
        let anonymous = self.config.visitor_name.as_str();
        let view = |m: &Message| MessageView {
            id: m.id,
            author: m.author_name(anonymous).to_string(),
            body: m.body.clone(),
            created_at: m.created_at,
            kind: m.kind,
            is_needaction: me.is_some_and(|p| m.is_needaction(p)),
            is_starred: me.is_some_and(|p| m.is_starred(p)),
            attachment_ids: m.attachment_ids.clone(),
        };
        let list = |kind: ChannelKind| -> Vec<Channel> { self.store.list(kind).into_iter().cloned().collect() };
        let current = self.view.channel_id();

        ClientSnapshot {
            me,
            current,
            current_name: self.channel_name(current),
            search: self.view.search().map(str::to_string),
            public: list(ChannelKind::Public),
            private: list(ChannelKind::Private),
            direct: list(ChannelKind::DirectMessage),
            partners: self.store.partners().to_vec(),
            feed: self.view.feed().messages().iter().map(view).collect(),
            feed_exhausted: self.view.feed().is_exhausted(),
            popups: self
                .sessions
                .popups()
                .map(|p| PopupSnapshot {
                    channel: p.channel_id(),
                    name: p.channel().display_name.clone(),
                    fold: p.fold(),
                    right_offset: p.right_offset(),
                    pending: p.pending(),
                    messages: p.feed().messages().iter().map(view).collect(),
                    history_exhausted: p.feed().is_exhausted(),
                })
                .collect(),
            unread: self.unread.unread_channels(),
            global_unread: self.unread.global(),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn apply_session(&mut self, channel: Channel, options: ApplyOptions) -> Vec<Effect> {
        let id = channel.id;
        let uuid = channel.uuid;
        let outcome = self.sessions.apply(channel, options);

        let mut effects = Vec::new();
        match outcome.change {
            PopupChange::Created => {
                self.emit_popup(&id, outcome.focus);
                if self.config.load_history {
                    effects.extend(self.popup_history(&id));
                }
            }
            PopupChange::Updated => self.emit_popup(&id, outcome.focus),
            PopupChange::Destroyed => {
                self.emit(ClientEvent::PopupClosed { id });
                self.emit_all_popups();
            }
            PopupChange::Ignored => {}
        }

        if let Some(state) = outcome.fold_sync {
            effects.push(Effect::SyncFold { id, uuid, state });
        }
        effects
    }

    fn on_fold_change(&mut self, change: FoldChange) -> Vec<Effect> {
        debug!(
            channel = %change.id,
            from = change.previous.as_str(),
            to = change.current.as_str(),
            "Fold state changed locally"
        );
        if change.current == FoldState::Closed {
            self.emit(ClientEvent::PopupClosed { id: change.id });
            self.emit_all_popups();
        } else {
            self.emit_popup(&change.id, false);
        }
        vec![Effect::SyncFold {
            id: change.id,
            uuid: change.uuid,
            state: change.current,
        }]
    }

    fn view_history(&mut self) -> Option<Effect> {
        let limit = self.config.history_limit;
        self.view.history_request(limit).map(|(query, request)| {
            Effect::FetchHistory(HistoryRequest {
                owner: HistoryOwner::Current,
                query,
                request,
            })
        })
    }

    fn popup_history(&mut self, id: &ChannelId) -> Option<Effect> {
        let limit = self.config.history_limit;
        let popup = self.sessions.popup_mut(id)?;
        let seq = popup.seq();
        popup.history_request(limit).map(|(query, request)| {
            Effect::FetchHistory(HistoryRequest {
                owner: HistoryOwner::Popup { channel: *id, seq },
                query,
                request,
            })
        })
    }

    fn channel_name(&self, id: ChannelId) -> String {
        match id {
            ChannelId::Inbox => "Inbox".to_string(),
            ChannelId::Starred => "Starred".to_string(),
            ChannelId::Record(_) => self
                .store
                .get(&id)
                .map(|c| c.display_name.clone())
                .unwrap_or_else(|| id.to_string()),
        }
    }

    fn emit_current(&mut self) {
        let id = self.view.channel_id();
        let name = self.channel_name(id);
        self.emit(ClientEvent::CurrentChannelChanged { id, name });
    }

    fn emit_popup(&mut self, id: &ChannelId, focus: bool) {
        if let Some(popup) = self.sessions.popup(id) {
            let event = ClientEvent::PopupChanged {
                id: *id,
                fold: popup.fold(),
                offset: popup.right_offset(),
                pending: popup.pending(),
                focus,
            };
            self.emit(event);
        }
    }

    /// Offsets shift after a removal.
    fn emit_all_popups(&mut self) {
        let ids: Vec<ChannelId> = self.sessions.popups().map(|p| p.channel_id()).collect();
        for id in ids {
            self.emit_popup(&id, false);
        }
    }

    fn emit_unread(&mut self, id: ChannelId) {
        let marker = self.unread.marker(id);
        let global = self.unread.global();
        self.emit(ClientEvent::UnreadChanged {
            id,
            count: marker.count,
            highlighted: marker.highlighted,
            global,
        });
    }
}
