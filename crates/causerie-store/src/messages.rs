//! Ordered, de-duplicated message list of one view.
//!
//! A [`MessageFeed`] backs either the foreground channel view or one
//! conversation popup. It is always sorted ascending by message id, whatever
//! the arrival order of live pushes and history pages.

use tracing::debug;

use causerie_shared::types::{Message, MessageId};

/// One page of older messages to request from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only messages with a smaller id; `None` asks for the most recent page.
    pub before: Option<MessageId>,
    pub limit: usize,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MessageFeed {
    messages: Vec<Message>,
    exhausted: bool,
    in_flight: bool,
    /// Bumped by every reset so that answers to older queries are ignored.
    generation: u64,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `messages` into the feed. Ids already present (in the feed or
    /// earlier in the batch) are skipped. Returns the number inserted.
    pub fn insert<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut inserted = 0;
        for message in messages {
            match self.messages.binary_search_by_key(&message.id, |m| m.id) {
                Ok(_) => debug!(message = %message.id, "Duplicate message ignored"),
                Err(pos) => {
                    self.messages.insert(pos, message);
                    inserted += 1;
                }
            }
        }
        inserted
    }

    /// Start a history backfill of at most `limit` messages older than the
    /// oldest one held. Returns `None` once history is exhausted or while
    /// another page is still in flight.
    pub fn begin_history(&mut self, limit: usize) -> Option<HistoryQuery> {
        if self.exhausted || self.in_flight || limit == 0 {
            return None;
        }
        self.in_flight = true;
        Some(HistoryQuery {
            before: self.first_id(),
            limit,
            generation: self.generation,
        })
    }

    /// Apply the answer to `query`. A short page marks the history as
    /// exhausted. Answers to a query issued before the last reset are
    /// dropped. Returns the number of messages inserted.
    pub fn complete_history(&mut self, query: HistoryQuery, messages: Vec<Message>) -> usize {
        if query.generation != self.generation {
            debug!(
                query_generation = query.generation,
                feed_generation = self.generation,
                "Discarding stale history page"
            );
            return 0;
        }
        self.in_flight = false;
        if messages.len() < query.limit {
            self.exhausted = true;
        }
        self.insert(messages)
    }

    /// Forget an in-flight query that failed, so the page can be retried.
    pub fn abort_history(&mut self, query: HistoryQuery) {
        if query.generation == self.generation {
            self.in_flight = false;
        }
    }

    /// Allow history backfill again and invalidate any in-flight query.
    pub fn reset_history(&mut self) {
        self.exhausted = false;
        self.in_flight = false;
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.reset_history();
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|pos| &self.messages[pos])
    }

    pub fn first_id(&self) -> Option<MessageId> {
        self.messages.first().map(|m| m.id)
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
