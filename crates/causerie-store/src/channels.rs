//! In-memory cache of channel headers.
//!
//! [`ChannelStore`] is the authoritative client-side copy of every channel
//! the user can see. It keeps a secondary index from a direct-message
//! counterpart to its one-to-one channel and the list of counterparts shown
//! in the sidebar.

use std::collections::HashMap;

use tracing::{debug, warn};

use causerie_shared::protocol::ChannelSlot;
use causerie_shared::types::{Channel, ChannelId, ChannelKind, Partner, PartnerId};

use crate::error::{Result, StoreError};

/// What an [`ChannelStore::upsert`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The record was replaced; carries the header it replaced.
    Updated { previous: Channel },
    /// The header was identical to the cached one.
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    channels: HashMap<ChannelId, Channel>,
    /// Arrival order, used for the per-kind channel lists.
    order: Vec<ChannelId>,
    by_counterpart: HashMap<PartnerId, ChannelId>,
    partners: Vec<Partner>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or replace the header for `channel.id`.
    ///
    /// Last write wins by arrival order. Applying the same header twice
    /// leaves the store as after the first application.
    pub fn upsert(&mut self, channel: Channel) -> Result<UpsertOutcome> {
        validate(&channel)?;

        let previous = self.channels.get(&channel.id).cloned();
        if previous.as_ref() == Some(&channel) {
            return Ok(UpsertOutcome::Unchanged);
        }

        // Drop the index entry of a counterpart this channel no longer has.
        if let Some(old) = previous.as_ref().and_then(Channel::counterpart_id) {
            if channel.counterpart_id() != Some(old) && self.by_counterpart.get(&old) == Some(&channel.id) {
                self.by_counterpart.remove(&old);
            }
        }

        if let Some(partner) = channel.counterpart.clone() {
            if let Some(stale) = self.by_counterpart.insert(partner.id, channel.id) {
                if stale != channel.id {
                    debug!(
                        partner = %partner.id,
                        stale = %stale,
                        channel = %channel.id,
                        "Counterpart moved to another direct channel"
                    );
                }
            }
            self.add_partner(partner);
        }

        let id = channel.id;
        self.channels.insert(id, channel);

        Ok(match previous {
            Some(previous) => UpsertOutcome::Updated { previous },
            None => {
                self.order.push(id);
                UpsertOutcome::Inserted
            }
        })
    }

    /// Remove a channel and the index entry pointing at it. Unknown ids are
    /// ignored.
    pub fn remove(&mut self, id: &ChannelId) -> Option<Channel> {
        let channel = self.channels.remove(id)?;
        self.order.retain(|c| c != id);

        if let Some(partner) = channel.counterpart_id() {
            if self.by_counterpart.get(&partner) == Some(id) {
                self.by_counterpart.remove(&partner);
                self.remove_partner(partner);
            }
        }

        debug!(channel = %id, "Channel removed from store");
        Some(channel)
    }

    /// Replace the whole content with the initial bulk load. Returns the
    /// number of channels kept; invalid headers are skipped.
    pub fn load_slot(&mut self, slot: ChannelSlot) -> usize {
        *self = Self::new();
        self.partners = slot.partners;

        let mut loaded = 0;
        for channel in slot.channels {
            let id = channel.id;
            match self.upsert(channel) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(channel = %id, error = %e, "Skipping channel from slot"),
            }
        }

        // The server mapping may reference direct channels that are not
        // pinned (and therefore not listed); index them anyway.
        for (partner, channel) in slot.mapping {
            self.by_counterpart.entry(partner).or_insert(channel);
        }

        loaded
    }

    /// Add a counterpart to the sidebar list, replacing an older entry for
    /// the same partner.
    pub fn add_partner(&mut self, partner: Partner) {
        match self.partners.iter_mut().find(|p| p.id == partner.id) {
            Some(existing) => *existing = partner,
            None => self.partners.push(partner),
        }
    }

    pub fn remove_partner(&mut self, id: PartnerId) -> bool {
        let before = self.partners.len();
        self.partners.retain(|p| p.id != id);
        self.partners.len() != before
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn get_by_counterpart(&self, partner: PartnerId) -> Option<&ChannelId> {
        self.by_counterpart.get(&partner)
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    /// Channels of one kind, in arrival order.
    pub fn list(&self, kind: ChannelKind) -> Vec<&Channel> {
        self.order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .filter(|c| c.kind == kind)
            .collect()
    }

    pub fn partners(&self) -> &[Partner] {
        &self.partners
    }

    /// Record ids among `ids` that have no cached header yet.
    pub fn missing(&self, ids: &[ChannelId]) -> Vec<i64> {
        let mut missing: Vec<i64> = ids
            .iter()
            .filter(|id| !self.channels.contains_key(*id))
            .filter_map(ChannelId::record)
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn validate(channel: &Channel) -> Result<()> {
    let reason = match (channel.id, channel.kind, channel.counterpart.is_some()) {
        (ChannelId::Inbox | ChannelId::Starred, _, _) => "virtual channels are not stored",
        (_, ChannelKind::DirectMessage, false) => "direct message without counterpart",
        (_, ChannelKind::Public | ChannelKind::Private, true) => "broadcast channel with counterpart",
        _ => return Ok(()),
    };
    Err(StoreError::InvalidChannel {
        id: channel.id,
        reason,
    })
}
