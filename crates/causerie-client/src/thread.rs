//! Message handling shared by every view that shows a [`MessageFeed`]: the
//! foreground channel view and each conversation popup.

use causerie_shared::types::{ChannelId, Message, MessageId, PartnerId};
use causerie_store::{HistoryQuery, MessageFeed};

use crate::transport::MessageQuery;

pub trait MessageThread {
    /// Channel whose messages this view shows (possibly virtual).
    fn channel_id(&self) -> ChannelId;

    fn feed(&self) -> &MessageFeed;

    fn feed_mut(&mut self) -> &mut MessageFeed;

    /// Search terms restricting the messages shown.
    fn search(&self) -> Option<&str> {
        None
    }

    fn query(&self, before: Option<MessageId>) -> MessageQuery {
        MessageQuery::for_channel(self.channel_id(), before).with_search(self.search())
    }

    /// Whether a live message belongs in this view. `me` is the current
    /// user's partner, needed by the virtual inbox and starred views.
    fn accepts(&self, message: &Message, me: Option<PartnerId>) -> bool {
        let in_scope = match self.channel_id() {
            id @ ChannelId::Record(_) => message.targets(&id),
            ChannelId::Inbox => me.is_some_and(|p| message.is_needaction(p)),
            ChannelId::Starred => me.is_some_and(|p| message.is_starred(p)),
        };
        in_scope && self.query(None).matches_search(message)
    }

    /// Insert `message` if it belongs here. Returns whether the feed changed.
    fn receive(&mut self, message: &Message, me: Option<PartnerId>) -> bool {
        self.accepts(message, me) && self.feed_mut().insert([message.clone()]) > 0
    }

    /// Next history page to request, if any.
    fn history_request(&mut self, limit: usize) -> Option<(HistoryQuery, MessageQuery)> {
        let query = self.feed_mut().begin_history(limit)?;
        Some((query, self.query(query.before)))
    }
}

/// The channel shown in the main panel.
#[derive(Debug, Clone)]
pub struct ChannelView {
    channel: ChannelId,
    feed: MessageFeed,
    /// Kept across channel switches.
    search: Option<String>,
}

impl ChannelView {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            feed: MessageFeed::new(),
            search: None,
        }
    }

    /// Restrict the view to messages matching `terms`. Blank terms clear
    /// the search. Returns whether the search changed; the feed is then
    /// emptied and must be fetched again.
    pub fn set_search(&mut self, terms: Option<&str>) -> bool {
        let terms = terms.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        if terms == self.search {
            return false;
        }
        self.search = terms;
        self.feed.clear();
        true
    }

    /// Switch to another channel, dropping the messages of the previous one
    /// and invalidating its in-flight fetches.
    pub fn switch_to(&mut self, channel: ChannelId) {
        self.channel = channel;
        self.feed.clear();
    }
}

impl MessageThread for ChannelView {
    fn channel_id(&self) -> ChannelId {
        self.channel
    }

    fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    fn feed_mut(&mut self) -> &mut MessageFeed {
        &mut self.feed
    }

    fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::types::MessageKind;
    use chrono::Utc;

    fn msg(id: i64, channels: &[i64]) -> Message {
        Message {
            id: MessageId(id),
            channel_ids: channels.iter().copied().map(ChannelId::Record).collect(),
            body: String::new(),
            author: None,
            created_at: Utc::now(),
            kind: MessageKind::Comment,
            needaction_partner_ids: Vec::new(),
            starred_partner_ids: Vec::new(),
            attachment_ids: Vec::new(),
        }
    }

    #[test]
    fn test_record_view_accepts_its_channel() {
        let mut view = ChannelView::new(ChannelId::Record(10));
        assert!(view.receive(&msg(1, &[10, 11]), None));
        assert!(!view.receive(&msg(2, &[11]), None));
        // Duplicate delivery leaves the feed unchanged.
        assert!(!view.receive(&msg(1, &[10]), None));
        assert_eq!(view.feed().len(), 1);
    }

    #[test]
    fn test_inbox_accepts_needaction() {
        let mut view = ChannelView::new(ChannelId::Inbox);
        let mut m = msg(1, &[10]);
        m.needaction_partner_ids.push(PartnerId(3));

        assert!(!view.accepts(&m, None));
        assert!(!view.accepts(&m, Some(PartnerId(4))));
        assert!(view.receive(&m, Some(PartnerId(3))));
    }

    #[test]
    fn test_switch_discards_old_pages() {
        let mut view = ChannelView::new(ChannelId::Record(10));
        let (query, request) = view.history_request(20).unwrap();
        assert_eq!(request, MessageQuery::for_channel(ChannelId::Record(10), None));

        view.switch_to(ChannelId::Starred);
        assert_eq!(view.feed_mut().complete_history(query, vec![msg(1, &[10])]), 0);
        assert_eq!(view.channel_id(), ChannelId::Starred);
    }

    #[test]
    fn test_search_filters_live_and_history() {
        let mut view = ChannelView::new(ChannelId::Record(10));
        let (stale, _) = view.history_request(20).unwrap();

        assert!(view.set_search(Some("  deploy ")));
        assert!(!view.set_search(Some("deploy")));
        assert_eq!(view.feed_mut().complete_history(stale, vec![msg(1, &[10])]), 0);

        let (_, request) = view.history_request(20).unwrap();
        assert_eq!(request.search.as_deref(), Some("deploy"));

        let mut hit = msg(2, &[10]);
        hit.body = "Deploy done".into();
        assert!(view.receive(&hit, None));
        assert!(!view.receive(&msg(3, &[10]), None));

        view.switch_to(ChannelId::Record(11));
        assert_eq!(view.search(), Some("deploy"));
        assert!(view.set_search(Some(" ")));
        assert_eq!(view.search(), None);
    }
}
