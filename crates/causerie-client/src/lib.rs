//! # causerie-client
//!
//! Client side of the Causerie sync core. [`spawn_client`] starts a task
//! that owns the channel cache, the conversation popups, the foreground
//! message feed and the unread markers. It is driven by three inputs: the
//! [`ClientHandle`] (user actions), the push notifications of the bus and the
//! results of the RPCs it issues through a [`Transport`]. Renderers follow
//! the [`ClientEvent`] stream.

mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod router;
pub mod sessions;
pub mod state;
pub mod thread;
pub mod transport;
pub mod unread;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use bridge::spawn_client;
pub use commands::ClientHandle;
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::{ClientEvent, FeedTarget};
pub use state::{ClientSnapshot, MessageView, PopupSnapshot};
pub use transport::{MessageQuery, MessageScope, Transport};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("causerie_client=debug,causerie_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Causerie client logging initialised");
}
