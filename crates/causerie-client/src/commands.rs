//! User-facing handle on the client task.
//!
//! Each [`ClientHandle`] method sends one [`ClientCommand`] and waits for the
//! task's answer. Methods that need the server resolve once the RPC finished.

use tokio::sync::{mpsc, oneshot};

use causerie_shared::types::{ChannelId, FoldState, MessageId, PartnerId, Privacy};

use crate::error::ClientError;
use crate::events::FeedTarget;
use crate::state::ClientSnapshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Commands sent into the client task.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    SelectChannel {
        id: ChannelId,
        reply: Reply<()>,
    },
    OpenDirectChat {
        partner: PartnerId,
        reply: Reply<ChannelId>,
    },
    CreateChannel {
        name: String,
        privacy: Privacy,
        reply: Reply<ChannelId>,
    },
    JoinChannel {
        id: i64,
        reply: Reply<ChannelId>,
    },
    UnpinChannel {
        id: ChannelId,
        reply: Reply<()>,
    },
    Invite {
        partners: Vec<PartnerId>,
        reply: Reply<()>,
    },
    SetFoldState {
        id: ChannelId,
        state: FoldState,
        reply: Reply<()>,
    },
    ToggleFold {
        id: ChannelId,
        reply: Reply<()>,
    },
    PostMessage {
        body: String,
        attachments: Vec<i64>,
        reply: Reply<MessageId>,
    },
    PostToPopup {
        id: ChannelId,
        body: String,
        reply: Reply<MessageId>,
    },
    LoadHistory {
        target: FeedTarget,
        reply: Reply<bool>,
    },
    Search {
        terms: Option<String>,
        reply: Reply<()>,
    },
    Acknowledge {
        id: ChannelId,
        reply: Reply<()>,
    },
    Snapshot(Reply<ClientSnapshot>),
    /// Stop the client task.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub(crate) fn new(tx: mpsc::Sender<ClientCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> ClientCommand) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Show `id` in the main panel. Virtual channels are always selectable.
    pub async fn select_channel(&self, id: ChannelId) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::SelectChannel { id, reply }).await
    }

    /// Open a conversation popup with `partner`, creating the direct channel
    /// on the server when none is known yet.
    pub async fn open_direct_chat(&self, partner: PartnerId) -> Result<ChannelId, ClientError> {
        self.request(|reply| ClientCommand::OpenDirectChat { partner, reply })
            .await
    }

    /// Create a broadcast channel and select it.
    pub async fn create_channel(&self, name: &str, privacy: Privacy) -> Result<ChannelId, ClientError> {
        let name = name.to_string();
        self.request(|reply| ClientCommand::CreateChannel { name, privacy, reply })
            .await
    }

    /// Join a public channel and select it.
    pub async fn join_channel(&self, id: i64) -> Result<ChannelId, ClientError> {
        self.request(|reply| ClientCommand::JoinChannel { id, reply }).await
    }

    /// Unpin (leave) a channel. It is removed locally once the server
    /// confirmed.
    pub async fn unpin_channel(&self, id: ChannelId) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::UnpinChannel { id, reply }).await
    }

    /// Invite partners to the current channel.
    pub async fn invite(&self, partners: Vec<PartnerId>) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::Invite { partners, reply }).await
    }

    pub async fn set_fold_state(&self, id: ChannelId, state: FoldState) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::SetFoldState { id, state, reply })
            .await
    }

    pub async fn toggle_fold(&self, id: ChannelId) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::ToggleFold { id, reply }).await
    }

    /// Post in the current channel. The message itself comes back through
    /// the bus.
    pub async fn post_message(&self, body: &str, attachments: Vec<i64>) -> Result<MessageId, ClientError> {
        let body = body.to_string();
        self.request(|reply| ClientCommand::PostMessage {
            body,
            attachments,
            reply,
        })
        .await
    }

    pub async fn post_to_popup(&self, id: ChannelId, body: &str) -> Result<MessageId, ClientError> {
        let body = body.to_string();
        self.request(|reply| ClientCommand::PostToPopup { id, body, reply })
            .await
    }

    /// Request the next page of older messages. Returns `false` when history
    /// is exhausted or a page is already on its way.
    pub async fn load_history(&self, target: FeedTarget) -> Result<bool, ClientError> {
        self.request(|reply| ClientCommand::LoadHistory { target, reply })
            .await
    }

    /// Only show messages of the main panel matching `terms`; `None` shows
    /// everything again.
    pub async fn search(&self, terms: Option<&str>) -> Result<(), ClientError> {
        let terms = terms.map(str::to_string);
        self.request(|reply| ClientCommand::Search { terms, reply }).await
    }

    /// Mark `id` as read on the server, then clear its unread marker.
    pub async fn acknowledge(&self, id: ChannelId) -> Result<(), ClientError> {
        self.request(|reply| ClientCommand::Acknowledge { id, reply }).await
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.request(ClientCommand::Snapshot).await
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.tx
            .send(ClientCommand::Shutdown)
            .await
            .map_err(|_| ClientError::Closed)
    }
}
