use thiserror::Error;

use causerie_shared::types::ChannelId;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A header that would break a store invariant (e.g. a direct message
    /// without exactly one counterpart).
    #[error("Invalid channel {id}: {reason}")]
    InvalidChannel { id: ChannelId, reason: &'static str },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
