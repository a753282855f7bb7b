use thiserror::Error;

use causerie_shared::types::ChannelId;
use causerie_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// An RPC failed (network error or server exception).
    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("No conversation open for channel {0}")]
    NoPopup(ChannelId),

    #[error("Cannot post in {0}")]
    NotPostable(ChannelId),

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Channel name is empty")]
    EmptyChannelName,

    /// The client task has stopped.
    #[error("Client task is not running")]
    Closed,
}
