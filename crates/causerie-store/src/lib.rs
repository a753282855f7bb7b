//! # causerie-store
//!
//! In-memory client state for the Causerie sync core: the channel header
//! cache ([`ChannelStore`]) and the per-view message list ([`MessageFeed`]).
//!
//! Everything here is synchronous and free of I/O. The client actor owns the
//! instances and is their only writer.

pub mod channels;
pub mod messages;

mod error;

pub use channels::{ChannelStore, UpsertOutcome};
pub use error::StoreError;
pub use messages::{HistoryQuery, MessageFeed};
