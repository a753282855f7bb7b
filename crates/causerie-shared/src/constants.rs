/// Reserved id of the virtual inbox (messages needing the user's action)
pub const VIRTUAL_INBOX: &str = "channel_inbox";

/// Reserved id of the virtual starred box
pub const VIRTUAL_STARRED: &str = "channel_starred";

/// Bus model name carrying channel headers for a partner
pub const MODEL_PARTNER: &str = "res.partner";

/// Bus model name carrying messages of a channel
pub const MODEL_CHANNEL: &str = "mail.channel";

/// Default page size of message fetches and history backfill
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default width of a conversation popup, used to stack popups
pub const DEFAULT_POPUP_WIDTH: u32 = 290;

/// Default number of attempts when posting a message
pub const DEFAULT_POST_RETRIES: u32 = 3;

/// Name shown for messages without an author
pub const DEFAULT_VISITOR_NAME: &str = "Visitor";

/// Timestamp format of server-formatted messages (UTC)
pub const SERVER_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
