//! The client task: single owner of [`ClientState`].
//!
//! The loop selects over user commands, push notifications and RPC
//! completions. Every RPC runs in its own task and posts a [`Completion`]
//! back, so a slow server never blocks the loop and overlapping requests
//! are applied in whatever order they finish.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use causerie_shared::protocol::PushNotification;
use causerie_shared::types::{Channel, ChannelId, FoldState, Message, MessageId, PartnerId};

use crate::commands::{ClientCommand, ClientHandle, Reply};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{ClientEvent, EventSink};
use crate::state::{Acknowledgement, ClientState, Effect, HistoryRequest};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

/// Result of an RPC, posted back into the client task.
enum Completion {
    ChannelInfo(anyhow::Result<Vec<Channel>>),
    History(HistoryRequest, anyhow::Result<Vec<Message>>),
    FoldSynced {
        id: ChannelId,
        state: FoldState,
        result: anyhow::Result<()>,
    },
    DirectChat {
        result: anyhow::Result<Channel>,
        reply: Reply<ChannelId>,
    },
    /// A channel was created or joined.
    Joined {
        result: anyhow::Result<Channel>,
        reply: Reply<ChannelId>,
    },
    Unpinned {
        id: ChannelId,
        result: anyhow::Result<()>,
        reply: Reply<()>,
    },
    Invited {
        partners: Vec<PartnerId>,
        result: anyhow::Result<()>,
        reply: Reply<()>,
    },
    Posted {
        channel: i64,
        result: anyhow::Result<MessageId>,
        reply: Reply<MessageId>,
    },
    Acknowledged {
        id: ChannelId,
        ack: Acknowledgement,
        result: anyhow::Result<()>,
        reply: Reply<()>,
    },
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the client task on the current tokio runtime.
///
/// The task first loads the initial state from `transport` (current user,
/// pending notifications, channel slot), selects the default channel and
/// emits [`ClientEvent::Ready`]. It then serves commands from the returned
/// handle and applies the notifications arriving on `push_rx` until
/// [`ClientHandle::shutdown`] is called or every handle is dropped.
pub fn spawn_client<T: Transport>(
    transport: T,
    mut push_rx: mpsc::Receiver<PushNotification>,
    config: ClientConfig,
) -> (ClientHandle, mpsc::UnboundedReceiver<ClientEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(256);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

    tokio::spawn(async move {
        let mut client = Client {
            state: ClientState::new(config, EventSink::new(event_tx)),
            transport: Arc::new(transport),
            done_tx,
        };

        client.start().await;

        loop {
            tokio::select! {
                // --- User commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Shutdown) => {
                            info!("Client shutdown requested");
                            break;
                        }
                        Some(cmd) => client.handle_command(cmd),
                        None => {
                            info!("All client handles dropped, stopping");
                            break;
                        }
                    }
                }

                // --- Push notifications ---
                Some(notification) = push_rx.recv() => {
                    let effects = client.state.handle_push(&notification);
                    client.run(effects);
                }

                // --- RPC completions ---
                Some(done) = done_rx.recv() => client.handle_completion(done),
            }
        }

        warn!("Client loop ended");
    });

    (ClientHandle::new(cmd_tx), event_rx)
}

struct Client<T: Transport> {
    state: ClientState,
    transport: Arc<T>,
    done_tx: mpsc::UnboundedSender<Completion>,
}

impl<T: Transport> Client<T> {
    /// Load everything the panel needs before serving commands.
    async fn start(&mut self) {
        let init = match self.transport.chat_init().await {
            Ok(init) => init,
            Err(e) => {
                warn!(error = %e, "chat_init failed");
                self.state
                    .emit(ClientEvent::notice("Connection", format!("Could not load conversations: {e}")));
                Default::default()
            }
        };

        match self.transport.fetch_channel_slot().await {
            Ok(slot) => {
                let effects = self.state.load_slot(slot);
                self.run(effects);
            }
            Err(e) => {
                warn!(error = %e, "fetch_channel_slot failed");
                self.state
                    .emit(ClientEvent::notice("Connection", format!("Could not load channels: {e}")));
            }
        }

        let effects = self.state.replay(init);
        self.run(effects);
        let effects = self.state.select_default();
        self.run(effects);

        info!("Client ready");
        self.state.emit(ClientEvent::Ready);
    }

    /// Run `call` against the transport in its own task and feed its result
    /// back into the loop.
    fn spawn_rpc<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let done = self.done_tx.clone();
        let rpc = call(self.transport.clone());
        tokio::spawn(async move {
            // The loop only stops on shutdown; late results are dropped.
            let _ = done.send(rpc.await);
        });
    }

    fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchChannelInfo(ids) => {
                    debug!(channels = ?ids, "Fetching channel headers");
                    self.spawn_rpc(|t| async move { Completion::ChannelInfo(t.channel_info(&ids).await) });
                }
                Effect::SyncFold { id, uuid, state } => {
                    self.spawn_rpc(|t| async move {
                        let result = t.set_fold_state(uuid, state).await;
                        Completion::FoldSynced { id, state, result }
                    });
                }
                Effect::FetchHistory(request) => {
                    self.spawn_rpc(|t| async move {
                        let result = t.fetch_messages(request.request.clone(), request.query.limit).await;
                        Completion::History(request, result)
                    });
                }
            }
        }
    }

    /// Post with up to `post_retries` attempts.
    fn spawn_post(&self, channel: i64, body: String, attachments: Vec<i64>, reply: Reply<MessageId>) {
        let attempts = self.state.config().post_retries.max(1);
        self.spawn_rpc(|t| async move {
            let mut attempt = 1;
            let result = loop {
                match t.post_message(channel, &body, &attachments).await {
                    Ok(id) => break Ok(id),
                    Err(e) if attempt < attempts => {
                        warn!(channel, attempt, error = %e, "Posting failed, retrying");
                        attempt += 1;
                    }
                    Err(e) => break Err(e),
                }
            };
            Completion::Posted { channel, result, reply }
        });
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::SelectChannel { id, reply } => {
                let result = self.state.select_channel(id).map(|effects| self.run(effects));
                let _ = reply.send(result);
            }

            ClientCommand::OpenDirectChat { partner, reply } => match self.state.direct_channel(partner) {
                Some(channel) => {
                    let id = channel.id;
                    let result = self.state.open_popup(channel).map(|effects| {
                        self.run(effects);
                        id
                    });
                    let _ = reply.send(result);
                }
                None => {
                    debug!(partner = %partner, "No direct channel cached, asking the server");
                    self.spawn_rpc(|t| async move {
                        let result = t.get_or_create_direct_channel(&[partner]).await;
                        Completion::DirectChat { result, reply }
                    });
                }
            },

            ClientCommand::CreateChannel { name, privacy, reply } => {
                if name.trim().is_empty() {
                    let _ = reply.send(Err(ClientError::EmptyChannelName));
                    return;
                }
                self.spawn_rpc(|t| async move {
                    let result = t.create_channel(name.trim(), privacy).await;
                    Completion::Joined { result, reply }
                });
            }

            ClientCommand::JoinChannel { id, reply } => {
                self.spawn_rpc(|t| async move {
                    let result = t.join_channel(id).await;
                    Completion::Joined { result, reply }
                });
            }

            ClientCommand::UnpinChannel { id, reply } => match self.state.channel_uuid(id) {
                Ok(uuid) => self.spawn_unpin(id, uuid, reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ClientCommand::Invite { partners, reply } => match self.state.invite_target() {
                Ok(_) if partners.is_empty() => {
                    let _ = reply.send(Ok(()));
                }
                Ok(channel) => {
                    self.spawn_rpc(|t| async move {
                        let result = t.invite_to_channel(channel, &partners).await;
                        Completion::Invited {
                            partners,
                            result,
                            reply,
                        }
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ClientCommand::SetFoldState { id, state, reply } => {
                let result = self.state.set_fold_state(id, state).map(|effects| self.run(effects));
                let _ = reply.send(result);
            }

            ClientCommand::ToggleFold { id, reply } => {
                let result = self.state.toggle_fold(id).map(|effects| self.run(effects));
                let _ = reply.send(result);
            }

            ClientCommand::PostMessage {
                body,
                attachments,
                reply,
            } => match self.state.post_target(&body, &attachments) {
                Ok(channel) => self.spawn_post(channel, body, attachments, reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ClientCommand::PostToPopup { id, body, reply } => match self.state.popup_post_target(id, &body) {
                Ok(channel) => self.spawn_post(channel, body, Vec::new(), reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ClientCommand::LoadHistory { target, reply } => {
                let result = self.state.load_history(target).map(|effect| {
                    let requested = effect.is_some();
                    self.run(effect.into_iter().collect());
                    requested
                });
                let _ = reply.send(result);
            }

            ClientCommand::Search { terms, reply } => {
                let effects = self.state.search(terms.as_deref());
                self.run(effects);
                let _ = reply.send(Ok(()));
            }

            ClientCommand::Acknowledge { id, reply } => match self.state.acknowledge_target(id) {
                Ok(ack) => {
                    self.spawn_rpc(|t| async move {
                        let result = t.mark_seen(id, ack.last_seen).await;
                        Completion::Acknowledged { id, ack, result, reply }
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            ClientCommand::Snapshot(reply) => {
                let _ = reply.send(Ok(self.state.snapshot()));
            }

            // Handled by the loop.
            ClientCommand::Shutdown => {}
        }
    }

    fn spawn_unpin(&self, id: ChannelId, uuid: Uuid, reply: Reply<()>) {
        self.spawn_rpc(|t| async move {
            let result = t.pin_channel(uuid, false).await;
            Completion::Unpinned { id, result, reply }
        });
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::ChannelInfo(Ok(channels)) => {
                for channel in channels {
                    let id = channel.id;
                    match self.state.on_header(channel, Default::default()) {
                        Ok(effects) => self.run(effects),
                        Err(e) => warn!(channel = %id, error = %e, "Rejected channel header"),
                    }
                }
            }
            Completion::ChannelInfo(Err(e)) => {
                warn!(error = %e, "channel_info failed");
            }

            Completion::History(request, result) => self.state.complete_history(request, result),

            Completion::FoldSynced { id, state, result } => match result {
                Ok(()) => debug!(channel = %id, fold = state.as_str(), "Fold state synced"),
                // Local state stays as the user left it.
                Err(e) => warn!(channel = %id, fold = state.as_str(), error = %e, "Fold state sync failed"),
            },

            Completion::DirectChat { result, reply } => {
                let result = result
                    .map_err(ClientError::from)
                    .and_then(|channel| {
                        let id = channel.id;
                        self.state.open_popup(channel).map(|effects| (id, effects))
                    })
                    .map(|(id, effects)| {
                        self.run(effects);
                        id
                    });
                self.reply_or_notice("Chat", result, reply);
            }

            Completion::Joined { result, reply } => {
                let result = result.map_err(ClientError::from).and_then(|channel| {
                    let id = channel.id;
                    let mut effects = self.state.on_header(channel, Default::default())?;
                    effects.extend(self.state.select_channel(id)?);
                    self.run(effects);
                    Ok(id)
                });
                self.reply_or_notice("Channel", result, reply);
            }

            Completion::Unpinned { id, result, reply } => {
                let result = result.map_err(ClientError::from).map(|()| {
                    info!(channel = %id, "Channel unpinned");
                    let effects = self.state.remove_channel(&id);
                    self.run(effects);
                });
                self.reply_or_notice("Unsubscribe", result, reply);
            }

            Completion::Invited { partners, result, reply } => {
                if result.is_ok() {
                    let names = self.state.partner_names(&partners).join(", ");
                    info!(count = partners.len(), "Partners invited");
                    self.state
                        .emit(ClientEvent::notice("New people", format!("{names} joined the channel")));
                }
                self.reply_or_notice("Invitation", result.map_err(ClientError::from), reply);
            }

            Completion::Posted { channel, result, reply } => {
                if let Ok(id) = &result {
                    debug!(channel, message = %id, "Message posted");
                }
                self.reply_or_notice("Message not sent", result.map_err(ClientError::from), reply);
            }

            Completion::Acknowledged { id, ack, result, reply } => {
                let result = result
                    .map_err(ClientError::from)
                    .map(|()| self.state.clear_unread(id, ack));
                self.reply_or_notice("Mark as read", result, reply);
            }
        }
    }

    /// Answer the caller; a failure is also shown to the user.
    fn reply_or_notice<R>(&mut self, title: &str, result: Result<R, ClientError>, reply: Reply<R>) {
        if let Err(e) = &result {
            warn!(action = title, error = %e, "User action failed");
            self.state.emit(ClientEvent::notice(title, e.to_string()));
        }
        let _ = reply.send(result);
    }
}
