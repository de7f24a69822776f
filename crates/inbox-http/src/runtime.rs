use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use inbox_core::{
    ClientChannelError, ClientChannels, ClientCommand, ClientError, ClientErrorCategory,
    ClientEvent, DEFAULT_RECONNECT_DELAY_MS, EventStream, MutationKind, ReconnectPolicy,
    TimelineStore, normalize_history_outcome, normalize_mutation_outcome,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{api::InboxApi, push::run_push_loop};

const SERVER_PAGE_LIMIT_CAP: u16 = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub reconnect_delay_ms: u64,
}

impl RuntimeConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InboxRuntimeHandle {
    channels: ClientChannels,
}

impl InboxRuntimeHandle {
    pub async fn send(&self, command: ClientCommand) -> Result<(), ClientChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Spawn the runtime actor on the current tokio runtime.
pub fn spawn_runtime(config: RuntimeConfig) -> Result<InboxRuntimeHandle, ClientError> {
    let api = InboxApi::new(config.base_url, config.request_timeout)?;
    let (channels, command_rx) = ClientChannels::new(128, 512);
    let runtime = InboxRuntime::new(
        api,
        ReconnectPolicy::new(config.reconnect_delay_ms),
        channels.clone(),
        command_rx,
    );
    tokio::spawn(async move {
        runtime.run().await;
    });

    Ok(InboxRuntimeHandle { channels })
}

#[derive(Debug)]
struct RunningPushTask {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Shared state for spawned command tasks.
#[derive(Clone)]
struct CommandContext {
    api: InboxApi,
    channels: ClientChannels,
    directory_revision: Arc<AtomicU64>,
}

struct InboxRuntime {
    context: CommandContext,
    command_rx: mpsc::Receiver<ClientCommand>,
    policy: ReconnectPolicy,
    push_task: Option<RunningPushTask>,
}

impl InboxRuntime {
    fn new(
        api: InboxApi,
        policy: ReconnectPolicy,
        channels: ClientChannels,
        command_rx: mpsc::Receiver<ClientCommand>,
    ) -> Self {
        Self {
            context: CommandContext {
                api,
                channels,
                directory_revision: Arc::new(AtomicU64::new(0)),
            },
            command_rx,
            policy,
            push_task: None,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.command_rx.recv().await {
            let operation = operation_label(&command);
            if let Err(error) = self.handle_command(command).await {
                warn!(operation, error = %error, "runtime command failed");
                self.context.channels.emit(ClientEvent::RequestFailed {
                    request_id: None,
                    operation: operation.to_owned(),
                    error,
                });
            }
        }

        if let Some(running) = self.push_task.take() {
            running.stop.cancel();
            let _ = running.task.await;
        }
        debug!("runtime command channel closed");
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Result<(), ClientError> {
        match command {
            ClientCommand::Start => self.handle_start(),
            ClientCommand::Stop => self.handle_stop().await,
            other => {
                // Each backend call runs on its own task so slow uploads never hold up the queue.
                let context = self.context.clone();
                tokio::spawn(async move {
                    context.execute(other).await;
                });
                Ok(())
            }
        }
    }

    fn handle_start(&mut self) -> Result<(), ClientError> {
        if self.push_task.is_some() {
            return Err(ClientError::new(
                ClientErrorCategory::Internal,
                "push_already_running",
                "push channel is already running",
            ));
        }

        let url = self.context.api.push_url()?;
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_push_loop(
            url,
            self.policy,
            self.context.channels.clone(),
            stop.child_token(),
        ));
        self.push_task = Some(RunningPushTask { stop, task });
        info!("push channel started");

        let context = self.context.clone();
        tokio::spawn(async move {
            context.execute(ClientCommand::FetchBotInfo).await;
        });
        Ok(())
    }

    async fn handle_stop(&mut self) -> Result<(), ClientError> {
        let Some(running) = self.push_task.take() else {
            return Err(ClientError::new(
                ClientErrorCategory::Internal,
                "push_not_running",
                "push channel is not running",
            ));
        };
        running.stop.cancel();
        let _ = running.task.await;
        Ok(())
    }
}

impl CommandContext {
    async fn execute(&self, command: ClientCommand) {
        let api = &self.api;
        match command {
            ClientCommand::Start | ClientCommand::Stop => {}
            ClientCommand::RefreshDirectory { revision } => {
                self.refresh_directory(revision).await;
            }
            ClientCommand::FetchHistory { ticket } => {
                let limit = TimelineStore::bounded_page_limit(ticket.limit, SERVER_PAGE_LIMIT_CAP);
                let outcome = api
                    .fetch_messages(ticket.conversation_id, ticket.offset, limit)
                    .await;
                self.channels
                    .emit(normalize_history_outcome(ticket, outcome));
            }
            ClientCommand::SendText {
                request_id,
                conversation_id,
                text,
                reply_to,
            } => {
                let outcome = api.send_text(conversation_id, &text, reply_to).await;
                self.finish_mutation(request_id, MutationKind::SendText, outcome)
                    .await;
            }
            ClientCommand::SendAttachment {
                request_id,
                attachment,
            } => {
                let outcome = api.upload(&attachment).await;
                self.finish_mutation(request_id, MutationKind::SendAttachment, outcome)
                    .await;
            }
            ClientCommand::DeleteMessages {
                request_id,
                conversation_id,
                msg_ids,
                for_everyone,
            } => {
                let kind = if for_everyone {
                    MutationKind::DeleteForEveryone
                } else {
                    MutationKind::DeleteForMe
                };
                let outcome = api
                    .delete_messages(conversation_id, &msg_ids, for_everyone)
                    .await;
                self.finish_mutation(request_id, kind, outcome).await;
            }
            ClientCommand::ForwardMessages {
                request_id,
                from,
                to,
                msg_ids,
            } => match api.forward(from, &to, &msg_ids).await {
                Ok(results) => {
                    self.channels.emit(ClientEvent::ForwardCompleted {
                        request_id,
                        results,
                    });
                    self.refresh_directory(0).await;
                }
                Err(error) => {
                    self.channels.emit(normalize_mutation_outcome(
                        request_id,
                        MutationKind::Forward,
                        Err(error),
                    ));
                }
            },
            ClientCommand::React {
                request_id,
                conversation_id,
                msg_id,
                emoji,
            } => {
                let outcome = api.react(conversation_id, msg_id, &emoji).await;
                self.finish_mutation(request_id, MutationKind::React, outcome)
                    .await;
            }
            ClientCommand::Unreact {
                request_id,
                conversation_id,
                msg_id,
            } => {
                let outcome = api.unreact(conversation_id, msg_id).await;
                self.finish_mutation(request_id, MutationKind::Unreact, outcome)
                    .await;
            }
            ClientCommand::EditMessage {
                request_id,
                conversation_id,
                msg_id,
                text,
            } => {
                let outcome = api.edit_message(conversation_id, msg_id, &text).await;
                self.finish_mutation(request_id, MutationKind::EditMessage, outcome)
                    .await;
            }
            ClientCommand::ClearUnread {
                request_id,
                conversation_id,
            } => {
                let outcome = api.clear_unread(conversation_id).await;
                self.finish_mutation(request_id, MutationKind::ClearUnread, outcome)
                    .await;
            }
            ClientCommand::PinMessage {
                request_id,
                chat_id,
                msg_id,
            } => {
                let outcome = api.pin(chat_id, msg_id).await;
                self.finish_mutation(request_id, MutationKind::Pin, outcome)
                    .await;
            }
            ClientCommand::UnpinMessage {
                request_id,
                chat_id,
                msg_id,
            } => {
                let outcome = api.unpin(chat_id, msg_id).await;
                self.finish_mutation(request_id, MutationKind::Unpin, outcome)
                    .await;
            }
            ClientCommand::BanMember {
                request_id,
                chat_id,
                user_id,
            } => {
                let outcome = api.ban(chat_id, user_id).await;
                self.finish_mutation(request_id, MutationKind::Ban, outcome)
                    .await;
            }
            ClientCommand::UnbanMember {
                request_id,
                chat_id,
                user_id,
            } => {
                let outcome = api.unban(chat_id, user_id).await;
                self.finish_mutation(request_id, MutationKind::Unban, outcome)
                    .await;
            }
            ClientCommand::BlockUser {
                request_id,
                user_id,
            } => {
                let outcome = api.block(user_id).await;
                self.finish_mutation(request_id, MutationKind::Block, outcome)
                    .await;
            }
            ClientCommand::UnblockUser {
                request_id,
                user_id,
            } => {
                let outcome = api.unblock(user_id).await;
                self.finish_mutation(request_id, MutationKind::Unblock, outcome)
                    .await;
            }
            ClientCommand::LeaveGroup {
                request_id,
                chat_id,
            } => {
                let outcome = api.leave(chat_id).await;
                self.finish_mutation(request_id, MutationKind::LeaveGroup, outcome)
                    .await;
            }
            ClientCommand::FetchGroupInfo {
                request_id,
                chat_id,
            } => match api.group_info(chat_id).await {
                Ok(info) => self.channels.emit(ClientEvent::GroupInfoLoaded {
                    request_id,
                    chat_id,
                    info,
                }),
                Err(error) => self.request_failed(Some(request_id), "load group info", error),
            },
            ClientCommand::FetchEditHistory {
                request_id,
                conversation_id,
                msg_id,
            } => match api.edit_history(conversation_id, msg_id).await {
                Ok(entries) => self.channels.emit(ClientEvent::EditHistoryLoaded {
                    request_id,
                    conversation_id,
                    msg_id,
                    entries,
                }),
                Err(error) => self.request_failed(Some(request_id), "load edit history", error),
            },
            ClientCommand::FetchMedia {
                request_id,
                conversation_id,
                file_token,
            } => match api.media(conversation_id, &file_token).await {
                Ok(media) => self
                    .channels
                    .emit(ClientEvent::MediaLoaded { request_id, media }),
                Err(error) => self.request_failed(Some(request_id), "download media", error),
            },
            ClientCommand::FetchBotInfo => match api.bot_info().await {
                Ok(info) => self.channels.emit(ClientEvent::BotInfoLoaded(info)),
                Err(error) => self.request_failed(None, "load bot info", error),
            },
        }
    }

    async fn finish_mutation(
        &self,
        request_id: String,
        kind: MutationKind,
        outcome: Result<(), ClientError>,
    ) {
        let succeeded = outcome.is_ok();
        if let Err(error) = outcome.as_ref() {
            warn!(%request_id, ?kind, error = %error, "mutation failed");
        }
        self.channels
            .emit(normalize_mutation_outcome(request_id, kind, outcome));
        if succeeded {
            self.refresh_directory(0).await;
        }
    }

    /// Revision for a fetch that starts now: never below `requested` and
    /// always above every fetch that started earlier.
    fn stamp_revision(&self, requested: u64) -> u64 {
        let previous = match self.directory_revision.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| Some(requested.max(current + 1)),
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        requested.max(previous + 1)
    }

    async fn refresh_directory(&self, requested: u64) {
        let revision = self.stamp_revision(requested);
        match self.api.list_conversations().await {
            Ok(conversations) => {
                debug!(revision, count = conversations.len(), "directory refreshed");
                self.channels.emit(ClientEvent::DirectoryUpdated {
                    revision,
                    conversations,
                });
            }
            Err(error) => self.request_failed(None, "refresh conversations", error),
        }
    }

    fn request_failed(&self, request_id: Option<String>, operation: &str, error: ClientError) {
        warn!(operation, error = %error, "request failed");
        self.channels.emit(ClientEvent::RequestFailed {
            request_id,
            operation: operation.to_owned(),
            error,
        });
    }
}

fn operation_label(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::Start => "start push channel",
        ClientCommand::Stop => "stop push channel",
        _ => "dispatch command",
    }
}
