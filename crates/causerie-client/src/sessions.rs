//! Minimized conversation popups.
//!
//! Each popup walks `open <-> folded -> closed`. Closing destroys it: a
//! closed channel only comes back through a fresh [`SessionTracker::apply`],
//! which creates a new popup with a new sequence number. Popups are stacked
//! from the right edge in creation order.

use tracing::{debug, info};
use uuid::Uuid;

use causerie_shared::types::{Channel, ChannelId, FoldState, Message, PartnerId};
use causerie_store::MessageFeed;

use crate::thread::MessageThread;

#[derive(Debug, Clone)]
pub struct ConversationPopup {
    channel: Channel,
    fold: FoldState,
    right_offset: u32,
    /// Messages received while folded.
    pending: u32,
    seq: u64,
    feed: MessageFeed,
}

impl ConversationPopup {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn fold(&self) -> FoldState {
        self.fold
    }

    pub fn right_offset(&self) -> u32 {
        self.right_offset
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Creation sequence number, unique over the tracker's lifetime.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn set_fold(&mut self, fold: FoldState) {
        self.fold = fold;
        if fold == FoldState::Open {
            self.pending = 0;
        }
    }
}

impl MessageThread for ConversationPopup {
    fn channel_id(&self) -> ChannelId {
        self.channel.id
    }

    fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    fn feed_mut(&mut self) -> &mut MessageFeed {
        &mut self.feed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Open the popup whatever its state and tell the server.
    pub force_open: bool,
    /// The header comes from another session of the user: take its fold
    /// state instead of keeping the local one.
    pub adopt_remote_fold: bool,
    /// Give the popup keyboard focus.
    pub focus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupChange {
    Created,
    Updated,
    Destroyed,
    /// Closed header for a channel without popup.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub change: PopupChange,
    /// Fold state to send back to the server.
    pub fold_sync: Option<FoldState>,
    pub focus: bool,
}

/// A local fold change the server must be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldChange {
    pub id: ChannelId,
    pub uuid: Uuid,
    pub previous: FoldState,
    pub current: FoldState,
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    /// Creation order.
    popups: Vec<ConversationPopup>,
    next_seq: u64,
    base_offset: u32,
    popup_width: u32,
}

impl SessionTracker {
    pub fn new(base_offset: u32, popup_width: u32) -> Self {
        Self {
            popups: Vec::new(),
            next_seq: 0,
            base_offset,
            popup_width,
        }
    }

    /// Bind a channel header to its popup, creating the popup when needed.
    pub fn apply(&mut self, channel: Channel, options: ApplyOptions) -> ApplyOutcome {
        let id = channel.id;
        let mut outcome = ApplyOutcome {
            change: PopupChange::Updated,
            fold_sync: None,
            focus: options.focus,
        };

        if let Some(pos) = self.position(&id) {
            let remote = channel.fold_state;
            let popup = &mut self.popups[pos];
            popup.channel = channel;

            if options.force_open {
                if popup.fold != FoldState::Open {
                    popup.set_fold(FoldState::Open);
                    outcome.fold_sync = Some(FoldState::Open);
                }
            } else if options.adopt_remote_fold && remote != popup.fold {
                if remote == FoldState::Closed {
                    self.destroy(pos);
                    outcome.change = PopupChange::Destroyed;
                    return outcome;
                }
                debug!(channel = %id, fold = remote.as_str(), "Adopting remote fold state");
                popup.set_fold(remote);
            }
            return outcome;
        }

        let fold = match (channel.fold_state, options.force_open) {
            (_, true) => FoldState::Open,
            (FoldState::Closed, false) => {
                debug!(channel = %id, "Closed header does not spawn a popup");
                outcome.change = PopupChange::Ignored;
                return outcome;
            }
            (state, false) => state,
        };
        if fold != channel.fold_state {
            outcome.fold_sync = Some(fold);
        }

        info!(channel = %id, fold = fold.as_str(), "Conversation popup created");
        self.popups.push(ConversationPopup {
            channel,
            fold,
            right_offset: 0,
            pending: 0,
            seq: self.next_seq,
            feed: MessageFeed::new(),
        });
        self.next_seq += 1;
        self.recompute_offsets();

        outcome.change = PopupChange::Created;
        outcome
    }

    /// Local fold action. Returns `None` for channels without popup and for
    /// no-op changes.
    pub fn set_fold_state(&mut self, id: &ChannelId, state: FoldState) -> Option<FoldChange> {
        let pos = self.position(id)?;
        let popup = &mut self.popups[pos];
        let previous = popup.fold;
        if previous == state {
            return None;
        }

        let change = FoldChange {
            id: *id,
            uuid: popup.channel.uuid,
            previous,
            current: state,
        };
        if state == FoldState::Closed {
            self.destroy(pos);
        } else {
            popup.set_fold(state);
        }
        Some(change)
    }

    /// Header click: open <-> folded.
    pub fn toggle_fold(&mut self, id: &ChannelId) -> Option<FoldChange> {
        let next = match self.popup(id)?.fold {
            FoldState::Open => FoldState::Folded,
            _ => FoldState::Open,
        };
        self.set_fold_state(id, next)
    }

    /// Destroy the popup of a removed channel.
    pub fn remove_channel(&mut self, id: &ChannelId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.destroy(pos);
                true
            }
            None => false,
        }
    }

    /// Insert a live message into every popup it belongs to. Returns the
    /// channels whose popup changed.
    pub fn deliver(&mut self, message: &Message, me: Option<PartnerId>) -> Vec<ChannelId> {
        let mut changed = Vec::new();
        for popup in &mut self.popups {
            if popup.receive(message, me) {
                match popup.fold {
                    FoldState::Open => popup.pending = 0,
                    _ => popup.pending += 1,
                }
                changed.push(popup.channel.id);
            }
        }
        changed
    }

    pub fn popup(&self, id: &ChannelId) -> Option<&ConversationPopup> {
        self.popups.iter().find(|p| p.channel.id == *id)
    }

    pub fn popup_mut(&mut self, id: &ChannelId) -> Option<&mut ConversationPopup> {
        self.popups.iter_mut().find(|p| p.channel.id == *id)
    }

    /// The popup of `id` if it is still the one created with `seq`.
    pub fn popup_with_seq(&mut self, id: &ChannelId, seq: u64) -> Option<&mut ConversationPopup> {
        self.popup_mut(id).filter(|p| p.seq == seq)
    }

    pub fn popups(&self) -> impl Iterator<Item = &ConversationPopup> {
        self.popups.iter()
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.popups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.popups.is_empty()
    }

    fn position(&self, id: &ChannelId) -> Option<usize> {
        self.popups.iter().position(|p| p.channel.id == *id)
    }

    fn destroy(&mut self, pos: usize) {
        let popup = self.popups.remove(pos);
        info!(channel = %popup.channel.id, "Conversation popup closed");
        self.recompute_offsets();
    }

    fn recompute_offsets(&mut self) {
        for (i, popup) in self.popups.iter_mut().enumerate() {
            popup.right_offset = self.base_offset + i as u32 * self.popup_width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::{ChannelKind, MessageId, MessageKind};
    use chrono::Utc;

    fn header(id: i64, fold: FoldState) -> Channel {
        Channel {
            id: ChannelId::Record(id),
            uuid: Uuid::new_v4(),
            kind: ChannelKind::Public,
            display_name: format!("channel {id}"),
            counterpart: None,
            fold_state: fold,
            is_minimized: true,
        }
    }

    fn msg(id: i64, channel: i64) -> Message {
        Message {
            id: MessageId(id),
            channel_ids: vec![ChannelId::Record(channel)],
            body: String::new(),
            author: None,
            created_at: Utc::now(),
            kind: MessageKind::Comment,
            needaction_partner_ids: Vec::new(),
            starred_partner_ids: Vec::new(),
            attachment_ids: Vec::new(),
        }
    }

    fn offsets(tracker: &SessionTracker) -> Vec<(i64, u32)> {
        tracker
            .popups()
            .map(|p| (p.channel().id.record().unwrap(), p.right_offset()))
            .collect()
    }

    #[test]
    fn test_close_is_terminal() {
        let mut tracker = SessionTracker::new(0, 290);
        let id = ChannelId::Record(10);
        let created = tracker.apply(header(10, FoldState::Open), ApplyOptions::default());
        assert_eq!(created.change, PopupChange::Created);

        let change = tracker.set_fold_state(&id, FoldState::Closed).unwrap();
        assert_eq!(change.previous, FoldState::Open);
        assert!(!tracker.contains(&id));

        // Nothing brings it back but a fresh apply.
        assert_eq!(tracker.set_fold_state(&id, FoldState::Open), None);
        assert_eq!(tracker.toggle_fold(&id), None);
        assert!(!tracker.contains(&id));

        let again = tracker.apply(header(10, FoldState::Open), ApplyOptions::default());
        assert_eq!(again.change, PopupChange::Created);
        assert_eq!(tracker.popup(&id).unwrap().seq(), 1);
    }

    #[test]
    fn test_closed_header_never_spawns() {
        let mut tracker = SessionTracker::new(0, 290);
        let outcome = tracker.apply(
            header(10, FoldState::Closed),
            ApplyOptions {
                adopt_remote_fold: true,
                ..Default::default()
            },
        );
        assert_eq!(outcome.change, PopupChange::Ignored);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_local_fold_kept_unless_adopted() {
        let mut tracker = SessionTracker::new(0, 290);
        let id = ChannelId::Record(10);
        tracker.apply(header(10, FoldState::Open), ApplyOptions::default());
        tracker.set_fold_state(&id, FoldState::Folded);

        tracker.apply(header(10, FoldState::Open), ApplyOptions::default());
        assert_eq!(tracker.popup(&id).unwrap().fold(), FoldState::Folded);

        let remote = ApplyOptions {
            adopt_remote_fold: true,
            ..Default::default()
        };
        tracker.apply(header(10, FoldState::Open), remote);
        assert_eq!(tracker.popup(&id).unwrap().fold(), FoldState::Open);

        let outcome = tracker.apply(header(10, FoldState::Closed), remote);
        assert_eq!(outcome.change, PopupChange::Destroyed);
        assert!(!tracker.contains(&id));
    }

    #[test]
    fn test_force_open_syncs_back() {
        let mut tracker = SessionTracker::new(0, 290);
        let id = ChannelId::Record(10);
        let force = ApplyOptions {
            force_open: true,
            focus: true,
            ..Default::default()
        };

        let outcome = tracker.apply(header(10, FoldState::Closed), force);
        assert_eq!(outcome.change, PopupChange::Created);
        assert_eq!(outcome.fold_sync, Some(FoldState::Open));
        assert!(outcome.focus);

        tracker.toggle_fold(&id);
        let outcome = tracker.apply(header(10, FoldState::Folded), force);
        assert_eq!(outcome.change, PopupChange::Updated);
        assert_eq!(outcome.fold_sync, Some(FoldState::Open));

        // Already open: nothing to tell the server.
        assert_eq!(tracker.apply(header(10, FoldState::Open), force).fold_sync, None);
    }

    #[test]
    fn test_offsets_follow_creation_order() {
        let mut tracker = SessionTracker::new(10, 100);
        for id in [1, 2, 3] {
            tracker.apply(header(id, FoldState::Open), ApplyOptions::default());
        }
        assert_eq!(offsets(&tracker), vec![(1, 10), (2, 110), (3, 210)]);

        tracker.set_fold_state(&ChannelId::Record(2), FoldState::Closed);
        assert_eq!(offsets(&tracker), vec![(1, 10), (3, 110)]);

        tracker.remove_channel(&ChannelId::Record(1));
        assert_eq!(offsets(&tracker), vec![(3, 10)]);
        assert!(!tracker.remove_channel(&ChannelId::Record(1)));
    }

    #[test]
    fn test_deliver_counts_pending_while_folded() {
        let mut tracker = SessionTracker::new(0, 290);
        let id = ChannelId::Record(10);
        tracker.apply(header(10, FoldState::Folded), ApplyOptions::default());
        tracker.apply(header(11, FoldState::Open), ApplyOptions::default());

        assert_eq!(tracker.deliver(&msg(1, 10), None), vec![id]);
        assert_eq!(tracker.deliver(&msg(2, 10), None), vec![id]);
        assert!(tracker.deliver(&msg(2, 10), None).is_empty());
        assert_eq!(tracker.popup(&id).unwrap().pending(), 2);
        assert_eq!(tracker.popup(&id).unwrap().feed().len(), 2);

        let change = tracker.toggle_fold(&id).unwrap();
        assert_eq!(change.current, FoldState::Open);
        assert_eq!(tracker.popup(&id).unwrap().pending(), 0);
    }

    #[test]
    fn test_seq_guards_recreated_popup() {
        let mut tracker = SessionTracker::new(0, 290);
        let id = ChannelId::Record(10);
        tracker.apply(header(10, FoldState::Open), ApplyOptions::default());
        let old_seq = tracker.popup(&id).unwrap().seq();

        tracker.set_fold_state(&id, FoldState::Closed);
        tracker.apply(header(10, FoldState::Open), ApplyOptions::default());

        assert!(tracker.popup_with_seq(&id, old_seq).is_none());
        assert!(tracker.popup_with_seq(&id, old_seq + 1).is_some());
    }
}
