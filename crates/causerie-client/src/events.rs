use serde::Serialize;
use tokio::sync::mpsc;

use causerie_shared::types::{ChannelId, ChannelKind, FoldState};

pub const EVENT_CHANNEL_LIST_CHANGED: &str = "channel-list-changed";
pub const EVENT_PARTNERS_CHANGED: &str = "partners-changed";
pub const EVENT_CURRENT_CHANNEL_CHANGED: &str = "current-channel-changed";
pub const EVENT_FEED_CHANGED: &str = "feed-changed";
pub const EVENT_POPUP_CHANGED: &str = "popup-changed";
pub const EVENT_POPUP_CLOSED: &str = "popup-closed";
pub const EVENT_UNREAD_CHANGED: &str = "unread-changed";
pub const EVENT_NOTICE: &str = "notice";
pub const EVENT_READY: &str = "ready";

/// A message list the renderer shows.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "view", content = "channel", rename_all = "snake_case")]
pub enum FeedTarget {
    /// The foreground channel view.
    Current,
    /// The conversation popup of a channel.
    Popup(ChannelId),
}

/// Change notification for the renderer: one variant per UI fragment to
/// re-render.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    ChannelListChanged {
        kind: ChannelKind,
    },
    PartnersChanged,
    CurrentChannelChanged {
        id: ChannelId,
        name: String,
    },
    FeedChanged {
        target: FeedTarget,
    },
    PopupChanged {
        id: ChannelId,
        fold: FoldState,
        offset: u32,
        pending: u32,
        focus: bool,
    },
    PopupClosed {
        id: ChannelId,
    },
    UnreadChanged {
        id: ChannelId,
        count: u32,
        highlighted: bool,
        global: u32,
    },
    /// Transient notification for the user (failed post, invite, ...).
    Notice {
        title: String,
        message: String,
    },
    /// Startup finished: channels loaded and default channel selected.
    Ready,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelListChanged { .. } => EVENT_CHANNEL_LIST_CHANGED,
            Self::PartnersChanged => EVENT_PARTNERS_CHANGED,
            Self::CurrentChannelChanged { .. } => EVENT_CURRENT_CHANNEL_CHANGED,
            Self::FeedChanged { .. } => EVENT_FEED_CHANGED,
            Self::PopupChanged { .. } => EVENT_POPUP_CHANGED,
            Self::PopupClosed { .. } => EVENT_POPUP_CLOSED,
            Self::UnreadChanged { .. } => EVENT_UNREAD_CHANGED,
            Self::Notice { .. } => EVENT_NOTICE,
            Self::Ready => EVENT_READY,
        }
    }

    pub fn notice(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notice {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Sending half of the event stream.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
    closed: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { tx, closed: false }
    }

    pub fn emit(&mut self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.tx.send(event) {
            // Only report the first failure; the renderer is gone for good.
            if !self.closed {
                tracing::warn!(event = name, error = %e, "Failed to emit event");
                self.closed = true;
            }
        }
    }
}
