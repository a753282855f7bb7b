//! Unread markers per channel and the global badge counter.
//!
//! A message counts once for every channel it targets that is not in the
//! foreground. Focusing a channel only dims its highlight; the count goes
//! away when the server confirmed the acknowledgement
//! ([`UnreadTracker::acknowledge`]).

use std::collections::HashMap;

use serde::Serialize;

use causerie_shared::types::{ChannelId, Message, MessageId, PartnerId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadMarker {
    pub count: u32,
    /// Something arrived since the channel was last focused.
    pub highlighted: bool,
}

#[derive(Debug, Default)]
struct ChannelUnread {
    /// Counted and not yet acknowledged, in arrival order.
    counted: Vec<MessageId>,
    highlighted: bool,
    /// Highest id covered by a confirmed acknowledgement.
    acknowledged: Option<MessageId>,
}

impl ChannelUnread {
    fn marker(&self) -> UnreadMarker {
        UnreadMarker {
            count: self.counted.len() as u32,
            highlighted: self.highlighted,
        }
    }
}

#[derive(Debug, Default)]
pub struct UnreadTracker {
    channels: HashMap<ChannelId, ChannelUnread>,
    global: u32,
    focused: Option<ChannelId>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `message` against every unfocused channel it targets. A message
    /// that needs an action from `me` also counts against the inbox. Returns
    /// the channels whose marker changed.
    pub fn record(&mut self, message: &Message, me: Option<PartnerId>) -> Vec<ChannelId> {
        let mut targets = message.channel_ids.clone();
        if me.is_some_and(|p| message.is_needaction(p)) {
            targets.push(ChannelId::Inbox);
        }
        targets.sort_unstable();
        targets.dedup();
        targets.retain(|id| Some(*id) != self.focused);

        let mut changed = Vec::with_capacity(targets.len());
        for id in targets {
            let entry = self.channels.entry(id).or_default();
            // Redelivered, or already covered by an acknowledgement.
            if entry.acknowledged.is_some_and(|seen| message.id <= seen) || entry.counted.contains(&message.id) {
                continue;
            }
            entry.counted.push(message.id);
            entry.highlighted = true;
            self.global += 1;
            changed.push(id);
        }
        changed
    }

    /// Bring `id` to the foreground. Returns whether its marker changed.
    pub fn focus(&mut self, id: ChannelId) -> bool {
        self.focused = Some(id);
        match self.channels.get_mut(&id) {
            Some(entry) if entry.highlighted => {
                entry.highlighted = false;
                true
            }
            _ => false,
        }
    }

    /// The server confirmed the acknowledgement of the first `count` messages
    /// counted against `id`. Messages counted after the request was issued
    /// stay unread. Returns the count removed.
    pub fn acknowledge(&mut self, id: ChannelId, count: u32) -> u32 {
        let Some(entry) = self.channels.get_mut(&id) else {
            return 0;
        };
        let take = (count as usize).min(entry.counted.len());
        let seen = entry.counted.drain(..take).max();
        if seen > entry.acknowledged {
            entry.acknowledged = seen;
        }
        if entry.counted.is_empty() {
            entry.highlighted = false;
        }
        self.global -= take as u32;
        take as u32
    }

    /// The channel is gone: forget its marker and unfocus it. Returns the
    /// count removed.
    pub fn forget(&mut self, id: ChannelId) -> u32 {
        if self.focused == Some(id) {
            self.focused = None;
        }
        match self.channels.remove(&id) {
            Some(entry) => {
                let count = entry.counted.len() as u32;
                self.global -= count;
                count
            }
            None => 0,
        }
    }

    pub fn marker(&self, id: ChannelId) -> UnreadMarker {
        self.channels.get(&id).map(ChannelUnread::marker).unwrap_or_default()
    }

    pub fn global(&self) -> u32 {
        self.global
    }

    pub fn focused(&self) -> Option<ChannelId> {
        self.focused
    }

    /// Channels with a non-zero marker, sorted.
    pub fn unread_channels(&self) -> Vec<(ChannelId, UnreadMarker)> {
        let mut all: Vec<_> = self
            .channels
            .iter()
            .map(|(id, entry)| (*id, entry.marker()))
            .filter(|(_, marker)| marker.count > 0)
            .collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }
}
