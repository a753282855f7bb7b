//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client runs with zero configuration.

use causerie_shared::constants::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_POPUP_WIDTH, DEFAULT_POST_RETRIES, DEFAULT_VISITOR_NAME,
};
use causerie_shared::types::ChannelId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Page size of history fetches.
    /// Env: `CAUSERIE_HISTORY_LIMIT`
    /// Default: `20`
    pub history_limit: usize,

    /// Width of one conversation popup, used to stack them.
    /// Env: `CAUSERIE_POPUP_WIDTH`
    /// Default: `290`
    pub popup_width: u32,

    /// Distance between the right edge and the first popup.
    /// Env: `CAUSERIE_POPUP_RIGHT_OFFSET`
    /// Default: `0`
    pub popup_right_offset: u32,

    /// Fetch the latest page when a popup opens or a channel is selected.
    /// Env: `CAUSERIE_LOAD_HISTORY` (true/false)
    /// Default: `true`
    pub load_history: bool,

    /// Attempts made to post a message before giving up.
    /// Env: `CAUSERIE_POST_RETRIES`
    /// Default: `3`
    pub post_retries: u32,

    /// Channel selected at startup and after the current one is removed.
    /// Env: `CAUSERIE_DEFAULT_CHANNEL` (record id or `channel_inbox`/`channel_starred`)
    /// Default: `channel_inbox`
    pub default_channel: ChannelId,

    /// Name shown for messages without author.
    /// Env: `CAUSERIE_VISITOR_NAME`
    /// Default: `"Visitor"`
    pub visitor_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            popup_width: DEFAULT_POPUP_WIDTH,
            popup_right_offset: 0,
            load_history: true,
            post_retries: DEFAULT_POST_RETRIES,
            default_channel: ChannelId::Inbox,
            visitor_name: DEFAULT_VISITOR_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var("CAUSERIE_HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => tracing::warn!(value = %val, "Invalid CAUSERIE_HISTORY_LIMIT, using default"),
            }
        }

        if let Some(val) = var("CAUSERIE_POPUP_WIDTH") {
            match val.parse::<u32>() {
                Ok(n) => config.popup_width = n,
                Err(_) => tracing::warn!(value = %val, "Invalid CAUSERIE_POPUP_WIDTH, using default"),
            }
        }

        if let Some(val) = var("CAUSERIE_POPUP_RIGHT_OFFSET") {
            match val.parse::<u32>() {
                Ok(n) => config.popup_right_offset = n,
                Err(_) => tracing::warn!(value = %val, "Invalid CAUSERIE_POPUP_RIGHT_OFFSET, using default"),
            }
        }

        if let Some(val) = var("CAUSERIE_LOAD_HISTORY") {
            config.load_history = val != "false" && val != "0";
        }

        if let Some(val) = var("CAUSERIE_POST_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.post_retries = n,
                _ => tracing::warn!(value = %val, "Invalid CAUSERIE_POST_RETRIES, using default"),
            }
        }

        if let Some(val) = var("CAUSERIE_DEFAULT_CHANNEL") {
            match val.parse::<ChannelId>() {
                Ok(id) => config.default_channel = id,
                Err(e) => tracing::warn!(error = %e, "Invalid CAUSERIE_DEFAULT_CHANNEL, using default"),
            }
        }

        if let Some(name) = var("CAUSERIE_VISITOR_NAME") {
            if !name.trim().is_empty() {
                config.visitor_name = name;
            }
        }

        config
    }
}
