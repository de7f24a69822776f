//! Explicit application state for one operator session.
//!
//! `InboxSession` is owned by a single task and mutated one input at a time.
//! Operations never perform I/O: they return [`SessionEffect`]s that the
//! caller forwards to the runtime or the presentation layer.

use std::{collections::HashMap, path::PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dispatch::dispatch_push,
    error::ClientError,
    pagination::PaginationController,
    selection::SelectionController,
    timeline::TimelineStore,
    types::{
        BotInfo, ClientCommand, ClientEvent, ConversationId, ConversationSummary, ForwardResult,
        Message, MessageId, MessagePage, MutationAck, OutgoingAttachment, PageTicket,
        PushConnectionState, PushEvent, PushStatus,
    },
};

/// Side effect requested by a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Forward to the runtime.
    Command(ClientCommand),
    /// Keep the view pinned to the newest message.
    ScrollToBottom,
    /// Older history was prepended; keep the previously visible content in place.
    PreserveScrollAnchor { old_len: usize, new_len: usize },
    CopyToClipboard(String),
}

/// User-visible notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    /// Stable error code for failures, `None` for informational notices.
    pub error_code: Option<String>,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error_code: None,
        }
    }

    pub fn failure(text: impl Into<String>, error: &ClientError) -> Self {
        Self {
            text: format!("{}: {}", text.into(), error.message),
            error_code: Some(error.code.clone()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Conversation list, always replaced wholesale from backend snapshots.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    conversations: Vec<ConversationSummary>,
    applied_revision: u64,
    next_revision: u64,
    query: String,
}

impl Directory {
    /// All conversations in backend order.
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn get(&self, id: ConversationId) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|summary| summary.id == id)
    }

    pub fn applied_revision(&self) -> u64 {
        self.applied_revision
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Conversations matching the current search query.
    pub fn visible(&self) -> Vec<&ConversationSummary> {
        self.conversations
            .iter()
            .filter(|summary| summary.matches_query(&self.query))
            .collect()
    }

    /// Allocate the revision for a new refresh request.
    pub fn next_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    /// Replace the snapshot unless an equal-or-newer one was already requested and applied.
    ///
    /// Returns `false` when the snapshot is older than the applied one.
    pub fn apply_snapshot(&mut self, revision: u64, conversations: Vec<ConversationSummary>) -> bool {
        if revision < self.applied_revision {
            debug!(
                revision,
                applied = self.applied_revision,
                "discarding stale directory snapshot"
            );
            return false;
        }
        self.applied_revision = revision;
        self.next_revision = self.next_revision.max(revision);
        self.conversations = conversations;
        true
    }
}

/// The single open conversation and everything scoped to it.
///
/// Replaced as a whole on conversation switch, so timeline, selection and
/// cursor can never refer to different conversations.
#[derive(Debug, Clone)]
pub struct OpenConversation {
    id: ConversationId,
    generation: u64,
    timeline: TimelineStore,
    selection: SelectionController,
    pagination: PaginationController,
    reply_to: Option<MessageId>,
}

impl OpenConversation {
    fn new(id: ConversationId, generation: u64, page_size: u16) -> Self {
        Self {
            id,
            generation,
            timeline: TimelineStore::new(),
            selection: SelectionController::default(),
            pagination: PaginationController::new(page_size),
            reply_to: None,
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.timeline
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn reply_to(&self) -> Option<MessageId> {
        self.reply_to
    }

    fn owns(&self, ticket: &PageTicket) -> bool {
        self.generation == ticket.generation && self.id == ticket.conversation_id
    }

    fn forget_removed(&mut self, removed: &[MessageId]) {
        self.selection.prune(removed);
        if self.reply_to.is_some_and(|id| removed.contains(&id)) {
            self.reply_to = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingPurpose {
    /// Bulk action over the selection; success exits selection mode.
    Bulk,
    /// Leave-group; success closes the view.
    Leave,
    Plain,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    purpose: PendingPurpose,
    generation: Option<u64>,
}

/// Operator session state.
#[derive(Debug, Clone)]
pub struct InboxSession {
    page_size: u16,
    directory: Directory,
    open: Option<OpenConversation>,
    last_generation: u64,
    push_status: PushStatus,
    bot: Option<BotInfo>,
    pending: HashMap<String, PendingRequest>,
    notices: Vec<Notice>,
}

impl InboxSession {
    pub fn new(page_size: u16) -> Self {
        Self {
            page_size,
            directory: Directory::default(),
            open: None,
            last_generation: 0,
            push_status: PushStatus {
                state: PushConnectionState::Idle,
                retry_in_ms: None,
            },
            bot: None,
            pending: HashMap::new(),
            notices: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut Directory {
        &mut self.directory
    }

    pub fn open(&self) -> Option<&OpenConversation> {
        self.open.as_ref()
    }

    /// Directory row of the open conversation.
    pub fn open_summary(&self) -> Option<&ConversationSummary> {
        self.open
            .as_ref()
            .and_then(|open| self.directory.get(open.id))
    }

    pub fn push_status(&self) -> PushStatus {
        self.push_status
    }

    /// Client title derived from the backend identity.
    pub fn title(&self) -> String {
        self.bot
            .as_ref()
            .map(BotInfo::title)
            .unwrap_or_else(|| BotInfo::default().title())
    }

    /// Drain queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Connect the push channel and load the first directory snapshot.
    pub fn start(&mut self) -> Vec<SessionEffect> {
        vec![
            SessionEffect::Command(ClientCommand::Start),
            self.refresh_directory(),
        ]
    }

    pub fn refresh_directory(&mut self) -> SessionEffect {
        SessionEffect::Command(ClientCommand::RefreshDirectory {
            revision: self.directory.next_revision(),
        })
    }

    /// Switch to conversation `id`, discarding all state of the previous one.
    pub fn open_conversation(&mut self, id: ConversationId) -> Vec<SessionEffect> {
        if self.directory.get(id).is_none() {
            self.notice(format!("Unknown conversation {id}"));
            return Vec::new();
        }

        self.last_generation += 1;
        let mut open = OpenConversation::new(id, self.last_generation, self.page_size);
        info!(
            conversation_id = id,
            generation = open.generation,
            "opening conversation"
        );

        let mut effects = Vec::new();
        if let Some(ticket) = open
            .pagination
            .load_older(id, open.generation, &open.timeline)
        {
            effects.push(SessionEffect::Command(ClientCommand::FetchHistory { ticket }));
        }
        self.open = Some(open);
        effects.push(self.plain_command(|request_id| ClientCommand::ClearUnread {
            request_id,
            conversation_id: id,
        }));
        effects
    }

    /// Return to the "no conversation selected" view.
    pub fn close_conversation(&mut self) {
        if let Some(open) = self.open.take() {
            debug!(conversation_id = open.id, "closing conversation");
        }
    }

    /// Request the next older history page for the open conversation.
    pub fn load_older(&mut self) -> Vec<SessionEffect> {
        let Some(open) = self.open.as_mut() else {
            return Vec::new();
        };
        open.pagination
            .load_older(open.id, open.generation, &open.timeline)
            .map(|ticket| vec![SessionEffect::Command(ClientCommand::FetchHistory { ticket })])
            .unwrap_or_default()
    }

    /// Apply one runtime event.
    pub fn handle_event(&mut self, event: ClientEvent) -> Vec<SessionEffect> {
        match event {
            ClientEvent::PushStatus(status) => {
                self.push_status = status;
                Vec::new()
            }
            ClientEvent::Push(event) => self.handle_push(event),
            ClientEvent::DirectoryUpdated {
                revision,
                conversations,
            } => {
                self.apply_directory(revision, conversations);
                Vec::new()
            }
            ClientEvent::HistoryPage { ticket, page } => self.apply_page(ticket, page),
            ClientEvent::HistoryFailed { ticket, error } => {
                self.fail_page(ticket, &error);
                Vec::new()
            }
            ClientEvent::MutationAck(ack) => {
                self.apply_ack(ack);
                Vec::new()
            }
            ClientEvent::ForwardCompleted {
                request_id,
                results,
            } => {
                self.apply_forward_results(&request_id, &results);
                Vec::new()
            }
            ClientEvent::BotInfoLoaded(info) => {
                self.bot = Some(info);
                Vec::new()
            }
            ClientEvent::RequestFailed {
                request_id,
                operation,
                error,
            } => {
                if let Some(request_id) = request_id {
                    self.pending.remove(&request_id);
                }
                self.notices
                    .push(Notice::failure(format!("Failed to {operation}"), &error));
                Vec::new()
            }
            ClientEvent::GroupInfoLoaded { request_id, .. }
            | ClientEvent::EditHistoryLoaded { request_id, .. }
            | ClientEvent::MediaLoaded { request_id, .. } => {
                self.pending.remove(&request_id);
                Vec::new()
            }
        }
    }

    fn handle_push(&mut self, event: PushEvent) -> Vec<SessionEffect> {
        let open = self
            .open
            .as_mut()
            .map(|open| (open.id, &mut open.timeline));
        let outcome = dispatch_push(event, open);

        if !outcome.removed.is_empty()
            && let Some(open) = self.open.as_mut()
        {
            open.forget_removed(&outcome.removed);
        }

        let mut effects = Vec::new();
        if outcome.scroll_to_bottom {
            effects.push(SessionEffect::ScrollToBottom);
        }
        if let Some(conversation_id) = outcome.mark_read {
            effects.push(self.plain_command(|request_id| ClientCommand::ClearUnread {
                request_id,
                conversation_id,
            }));
        }
        if outcome.refresh_directory {
            effects.push(self.refresh_directory());
        }
        effects
    }

    fn apply_directory(&mut self, revision: u64, conversations: Vec<ConversationSummary>) {
        if !self.directory.apply_snapshot(revision, conversations) {
            return;
        }
        if let Some(open) = self.open.as_ref()
            && self.directory.get(open.id).is_none()
        {
            warn!(
                conversation_id = open.id,
                "open conversation left the directory"
            );
            self.open = None;
            self.notice("Conversation is no longer available");
        }
    }

    fn apply_page(&mut self, ticket: PageTicket, page: MessagePage) -> Vec<SessionEffect> {
        let Some(open) = self.open.as_mut().filter(|open| open.owns(&ticket)) else {
            debug!(
                conversation_id = ticket.conversation_id,
                generation = ticket.generation,
                "discarding history page for a conversation that is no longer open"
            );
            return Vec::new();
        };
        if !open.pagination.complete(&ticket) {
            debug!(offset = ticket.offset, "discarding unexpected history page");
            return Vec::new();
        }

        let outcome = open.timeline.append_older(page.messages, page.has_more);
        if outcome.old_len == 0 {
            vec![SessionEffect::ScrollToBottom]
        } else {
            vec![SessionEffect::PreserveScrollAnchor {
                old_len: outcome.old_len,
                new_len: outcome.new_len,
            }]
        }
    }

    fn fail_page(&mut self, ticket: PageTicket, error: &ClientError) {
        let Some(open) = self.open.as_mut().filter(|open| open.owns(&ticket)) else {
            debug!(
                conversation_id = ticket.conversation_id,
                "dropping history failure for a conversation that is no longer open"
            );
            return;
        };
        if open.pagination.complete(&ticket) {
            self.notices
                .push(Notice::failure("Failed to load messages", error));
        }
    }

    fn apply_ack(&mut self, ack: MutationAck) {
        let pending = self.pending.remove(&ack.request_id);
        if let Some(error) = ack.error.as_ref() {
            self.notices.push(Notice::failure(
                format!("Failed to {}", ack.kind.label()),
                error,
            ));
            return;
        }

        let Some(pending) = pending else {
            return;
        };
        let same_view = self
            .open
            .as_ref()
            .is_some_and(|open| Some(open.generation) == pending.generation);
        match pending.purpose {
            PendingPurpose::Bulk if same_view => {
                if let Some(open) = self.open.as_mut() {
                    open.selection.exit();
                }
            }
            PendingPurpose::Leave if same_view => {
                self.open = None;
                self.notice("Left the group");
            }
            _ => {}
        }
    }

    fn apply_forward_results(&mut self, request_id: &str, results: &[ForwardResult]) {
        let pending = self.pending.remove(request_id);
        let mut failed_targets: Vec<ConversationId> = Vec::new();
        for result in results.iter().filter(|result| !result.is_ok()) {
            if !failed_targets.contains(&result.to) {
                failed_targets.push(result.to);
            }
        }
        let failed: Vec<String> = failed_targets
            .into_iter()
            .map(|target| {
                self.directory
                    .get(target)
                    .map(ConversationSummary::display_name)
                    .unwrap_or_else(|| target.to_string())
            })
            .collect();

        if !failed.is_empty() {
            self.notices.push(Notice {
                text: format!("Forward failed for: {}", failed.join(", ")),
                error_code: Some("forward_partial".into()),
            });
            return;
        }

        let same_view = pending.is_some_and(|pending| {
            self.open
                .as_ref()
                .is_some_and(|open| Some(open.generation) == pending.generation)
        });
        if same_view && let Some(open) = self.open.as_mut() {
            open.selection.exit();
        }
        self.notice("Messages forwarded");
    }

    pub fn enter_selection(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.selection.enter();
        }
    }

    pub fn exit_selection(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.selection.exit();
        }
    }

    /// Toggle `id` in the selection. Ids outside the open timeline are refused.
    pub fn toggle_selection(&mut self, id: MessageId) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        if !open.timeline.contains(id) {
            self.notice(format!("Message #{id} is not loaded"));
            return false;
        }
        open.selection.toggle(id)
    }

    /// Delete the selected messages, for the operator only or for everyone.
    pub fn delete_selected(&mut self, for_everyone: bool) -> Vec<SessionEffect> {
        let Some((conversation_id, msg_ids)) = self.selected_ids() else {
            return Vec::new();
        };
        vec![self.tracked_command(PendingPurpose::Bulk, |request_id| {
            ClientCommand::DeleteMessages {
                request_id,
                conversation_id,
                msg_ids,
                for_everyone,
            }
        })]
    }

    /// Forward the selected messages to other directory conversations.
    pub fn forward_selected(&mut self, targets: &[ConversationId]) -> Vec<SessionEffect> {
        let Some((from, msg_ids)) = self.selected_ids() else {
            return Vec::new();
        };
        let mut to: Vec<ConversationId> = targets
            .iter()
            .copied()
            .filter(|target| *target != from && self.directory.get(*target).is_some())
            .collect();
        to.sort_unstable();
        to.dedup();
        if to.is_empty() {
            self.notice("No valid forward targets");
            return Vec::new();
        }
        vec![self.tracked_command(PendingPurpose::Bulk, |request_id| {
            ClientCommand::ForwardMessages {
                request_id,
                from,
                to,
                msg_ids,
            }
        })]
    }

    /// Copy the text of the selected messages, in timeline order, and exit selection.
    pub fn copy_selected(&mut self) -> Vec<SessionEffect> {
        let Some(open) = self.open.as_mut() else {
            return Vec::new();
        };
        let texts: Vec<&str> = open
            .timeline
            .items()
            .iter()
            .filter(|message| open.selection.contains(message.id))
            .filter_map(|message| message.text.as_deref())
            .collect();
        let joined = texts.join("\n\n");
        open.selection.exit();

        if joined.is_empty() {
            return Vec::new();
        }
        self.notice("Copied to clipboard");
        vec![SessionEffect::CopyToClipboard(joined)]
    }

    pub fn set_reply(&mut self, id: MessageId) -> bool {
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        if !open.timeline.contains(id) {
            self.notice(format!("Message #{id} is not loaded"));
            return false;
        }
        open.reply_to = Some(id);
        true
    }

    pub fn clear_reply(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.reply_to = None;
        }
    }

    /// Send text to the open conversation.
    ///
    /// Nothing is inserted locally; the backend echo is the insertion path.
    pub fn compose_text(&mut self, text: &str) -> Vec<SessionEffect> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let Some(open) = self.open.as_mut() else {
            return Vec::new();
        };
        let conversation_id = open.id;
        let reply_to = open.reply_to.take();
        let text = text.to_owned();
        vec![self.plain_command(|request_id| ClientCommand::SendText {
            request_id,
            conversation_id,
            text,
            reply_to,
        })]
    }

    /// Upload a file to the open conversation.
    pub fn compose_attachment(&mut self, path: PathBuf, caption: &str) -> Vec<SessionEffect> {
        let Some(open) = self.open.as_mut() else {
            return Vec::new();
        };
        let attachment = OutgoingAttachment {
            conversation_id: open.id,
            path,
            caption: caption.trim().to_owned(),
            reply_to: open.reply_to.take(),
        };
        vec![self.plain_command(|request_id| ClientCommand::SendAttachment {
            request_id,
            attachment,
        })]
    }

    /// Set the operator's reaction. Resubmitting the current emoji removes it on the backend.
    pub fn react(&mut self, id: MessageId, emoji: &str) -> Vec<SessionEffect> {
        let emoji = emoji.trim().to_owned();
        if emoji.is_empty() {
            return Vec::new();
        }
        self.message_command(id, |request_id, conversation_id, msg_id| {
            ClientCommand::React {
                request_id,
                conversation_id,
                msg_id,
                emoji,
            }
        })
    }

    pub fn unreact(&mut self, id: MessageId) -> Vec<SessionEffect> {
        self.message_command(id, |request_id, conversation_id, msg_id| {
            ClientCommand::Unreact {
                request_id,
                conversation_id,
                msg_id,
            }
        })
    }

    /// Edit an outbound message. The change lands through the `message_edited` push.
    pub fn edit(&mut self, id: MessageId, text: &str) -> Vec<SessionEffect> {
        let text = text.trim().to_owned();
        if text.is_empty() {
            self.notice("Edited text cannot be empty");
            return Vec::new();
        }
        match self.loaded_message(id).map(Message::is_outbound) {
            Some(true) => {}
            Some(false) => {
                self.notice("Only your own messages can be edited");
                return Vec::new();
            }
            None => return Vec::new(),
        }
        self.message_command(id, |request_id, conversation_id, msg_id| {
            ClientCommand::EditMessage {
                request_id,
                conversation_id,
                msg_id,
                text,
            }
        })
    }

    pub fn pin(&mut self, id: MessageId) -> Vec<SessionEffect> {
        self.message_command(id, |request_id, chat_id, msg_id| ClientCommand::PinMessage {
            request_id,
            chat_id,
            msg_id,
        })
    }

    pub fn unpin(&mut self, id: MessageId) -> Vec<SessionEffect> {
        self.message_command(id, |request_id, chat_id, msg_id| {
            ClientCommand::UnpinMessage {
                request_id,
                chat_id,
                msg_id,
            }
        })
    }

    pub fn edit_history(&mut self, id: MessageId) -> Vec<SessionEffect> {
        self.message_command(id, |request_id, conversation_id, msg_id| {
            ClientCommand::FetchEditHistory {
                request_id,
                conversation_id,
                msg_id,
            }
        })
    }

    /// Download the attachment of a loaded message.
    pub fn fetch_media(&mut self, id: MessageId) -> Vec<SessionEffect> {
        let file_token = match self
            .loaded_message(id)
            .map(|message| message.media().map(|media| media.file_token.to_owned()))
        {
            Some(Some(file_token)) => file_token,
            Some(None) => {
                self.notice(format!("Message #{id} has no attachment"));
                return Vec::new();
            }
            None => return Vec::new(),
        };
        self.message_command(id, |request_id, conversation_id, _| {
            ClientCommand::FetchMedia {
                request_id,
                conversation_id,
                file_token,
            }
        })
    }

    pub fn block(&mut self) -> Vec<SessionEffect> {
        self.direct_command(|request_id, user_id| ClientCommand::BlockUser {
            request_id,
            user_id,
        })
    }

    pub fn unblock(&mut self) -> Vec<SessionEffect> {
        self.direct_command(|request_id, user_id| ClientCommand::UnblockUser {
            request_id,
            user_id,
        })
    }

    pub fn ban(&mut self, user_id: i64) -> Vec<SessionEffect> {
        self.group_command(PendingPurpose::Plain, |request_id, chat_id| {
            ClientCommand::BanMember {
                request_id,
                chat_id,
                user_id,
            }
        })
    }

    pub fn unban(&mut self, user_id: i64) -> Vec<SessionEffect> {
        self.group_command(PendingPurpose::Plain, |request_id, chat_id| {
            ClientCommand::UnbanMember {
                request_id,
                chat_id,
                user_id,
            }
        })
    }

    /// Leave the open group; success closes the view.
    pub fn leave(&mut self) -> Vec<SessionEffect> {
        self.group_command(PendingPurpose::Leave, |request_id, chat_id| {
            ClientCommand::LeaveGroup {
                request_id,
                chat_id,
            }
        })
    }

    pub fn group_info(&mut self) -> Vec<SessionEffect> {
        self.group_command(PendingPurpose::Plain, |request_id, chat_id| {
            ClientCommand::FetchGroupInfo {
                request_id,
                chat_id,
            }
        })
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::info(text));
    }

    fn selected_ids(&mut self) -> Option<(ConversationId, Vec<MessageId>)> {
        let open = self.open.as_ref()?;
        if open.selection.is_empty() {
            self.notice("No messages selected");
            return None;
        }
        Some((open.id, open.selection.ids()))
    }

    fn loaded_message(&mut self, id: MessageId) -> Option<&Message> {
        let loaded = self
            .open
            .as_ref()
            .is_some_and(|open| open.timeline.contains(id));
        if !loaded {
            if self.open.is_some() {
                self.notice(format!("Message #{id} is not loaded"));
            }
            return None;
        }
        self.open.as_ref().and_then(|open| open.timeline.get(id))
    }

    fn plain_command(&mut self, build: impl FnOnce(String) -> ClientCommand) -> SessionEffect {
        self.tracked_command(PendingPurpose::Plain, build)
    }

    fn tracked_command(
        &mut self,
        purpose: PendingPurpose,
        build: impl FnOnce(String) -> ClientCommand,
    ) -> SessionEffect {
        let request_id = Uuid::new_v4().to_string();
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                purpose,
                generation: self.open.as_ref().map(|open| open.generation),
            },
        );
        SessionEffect::Command(build(request_id))
    }

    fn message_command(
        &mut self,
        id: MessageId,
        build: impl FnOnce(String, ConversationId, MessageId) -> ClientCommand,
    ) -> Vec<SessionEffect> {
        if self.loaded_message(id).is_none() {
            return Vec::new();
        }
        let Some(conversation_id) = self.open.as_ref().map(|open| open.id) else {
            return Vec::new();
        };
        vec![self.plain_command(|request_id| build(request_id, conversation_id, id))]
    }

    fn direct_command(
        &mut self,
        build: impl FnOnce(String, ConversationId) -> ClientCommand,
    ) -> Vec<SessionEffect> {
        let Some((id, is_group)) = self
            .open_summary()
            .map(|summary| (summary.id, summary.is_group()))
        else {
            return Vec::new();
        };
        if is_group {
            self.notice("Only available in direct conversations");
            return Vec::new();
        }
        vec![self.plain_command(|request_id| build(request_id, id))]
    }

    fn group_command(
        &mut self,
        purpose: PendingPurpose,
        build: impl FnOnce(String, ConversationId) -> ClientCommand,
    ) -> Vec<SessionEffect> {
        let Some((id, is_group)) = self
            .open_summary()
            .map(|summary| (summary.id, summary.is_group()))
        else {
            return Vec::new();
        };
        if !is_group {
            self.notice("Only available in groups");
            return Vec::new();
        }
        vec![self.tracked_command(purpose, |request_id| build(request_id, id))]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        error::ClientErrorCategory,
        timeline::tests::message,
        types::{ConversationKind, Direction, MutationKind},
    };

    fn summary(id: ConversationId, name: &str, kind: ConversationKind) -> ConversationSummary {
        ConversationSummary {
            id,
            full_name: name.to_owned(),
            username: None,
            kind,
            last_message: None,
            unread_count: 0,
            is_banned: false,
            is_blocked: false,
        }
    }

    fn session_with(conversations: Vec<ConversationSummary>) -> InboxSession {
        let mut session = InboxSession::new(30);
        session.handle_event(ClientEvent::DirectoryUpdated {
            revision: 1,
            conversations,
        });
        session
    }

    fn two_chats() -> InboxSession {
        session_with(vec![
            summary(1, "Ada", ConversationKind::Direct),
            summary(2, "Bob", ConversationKind::Direct),
            summary(3, "Team", ConversationKind::Group),
        ])
    }

    fn ticket_of(effects: &[SessionEffect]) -> PageTicket {
        effects
            .iter()
            .find_map(|effect| match effect {
                SessionEffect::Command(ClientCommand::FetchHistory { ticket }) => Some(*ticket),
                _ => None,
            })
            .expect("effects should include a history fetch")
    }

    fn request_id_of(effects: &[SessionEffect]) -> String {
        effects
            .iter()
            .find_map(|effect| match effect {
                SessionEffect::Command(command) => request_id(command),
                _ => None,
            })
            .expect("effects should include a request")
    }

    fn request_id(command: &ClientCommand) -> Option<String> {
        let value = serde_json::to_value(command).ok()?;
        value
            .as_object()?
            .values()
            .next()?
            .get("request_id")?
            .as_str()
            .map(str::to_owned)
    }

    fn open_with_messages(session: &mut InboxSession, id: ConversationId, ids: &[MessageId]) {
        let ticket = ticket_of(&session.open_conversation(id));
        session.handle_event(ClientEvent::HistoryPage {
            ticket,
            page: MessagePage {
                messages: ids.iter().map(|id| message(*id, &format!("m{id}"))).collect(),
                total: None,
                has_more: false,
            },
        });
    }

    #[test]
    fn opening_issues_first_page_and_mark_read() {
        let mut session = two_chats();
        let effects = session.open_conversation(1);

        let ticket = ticket_of(&effects);
        assert_eq!(ticket.conversation_id, 1);
        assert_eq!(ticket.offset, 0);
        assert_eq!(ticket.limit, 30);
        assert!(effects.iter().any(|effect| matches!(
            effect,
            SessionEffect::Command(ClientCommand::ClearUnread {
                conversation_id: 1,
                ..
            })
        )));
    }

    #[test]
    fn opening_unknown_conversation_is_refused() {
        let mut session = two_chats();
        assert!(session.open_conversation(99).is_empty());
        assert!(session.open().is_none());
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn first_page_scrolls_and_later_pages_preserve_anchor() {
        let mut session = two_chats();
        let ticket = ticket_of(&session.open_conversation(1));
        let effects = session.handle_event(ClientEvent::HistoryPage {
            ticket,
            page: MessagePage {
                messages: (11..=12).map(|id| message(id, "x")).collect(),
                total: None,
                has_more: true,
            },
        });
        assert_eq!(effects, vec![SessionEffect::ScrollToBottom]);

        let ticket = ticket_of(&session.load_older());
        assert_eq!(ticket.offset, 2);
        let effects = session.handle_event(ClientEvent::HistoryPage {
            ticket,
            page: MessagePage {
                messages: vec![message(10, "x")],
                total: None,
                has_more: false,
            },
        });
        assert_eq!(
            effects,
            vec![SessionEffect::PreserveScrollAnchor {
                old_len: 2,
                new_len: 3
            }]
        );
        assert!(session.load_older().is_empty());
    }

    #[test]
    fn page_for_previous_open_of_same_conversation_is_discarded() {
        let mut session = two_chats();
        let stale = ticket_of(&session.open_conversation(1));
        session.open_conversation(2);
        let fresh = ticket_of(&session.open_conversation(1));

        session.handle_event(ClientEvent::HistoryPage {
            ticket: stale,
            page: MessagePage {
                messages: vec![message(1, "stale")],
                total: None,
                has_more: false,
            },
        });
        let open = session.open().expect("conversation 1 is open");
        assert!(open.timeline().is_empty());
        assert_eq!(open.pagination().in_flight(), Some(&fresh));
    }

    #[test]
    fn failed_page_releases_guard_with_notice() {
        let mut session = two_chats();
        let ticket = ticket_of(&session.open_conversation(1));
        session.handle_event(ClientEvent::HistoryFailed {
            ticket,
            error: ClientError::transport("timed out"),
        });

        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_error());
        assert!(!session.load_older().is_empty());
    }

    #[test]
    fn selection_refuses_ids_outside_timeline() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1, 2]);

        assert!(session.toggle_selection(2));
        assert!(!session.toggle_selection(50));
        let open = session.open().expect("open");
        assert_eq!(open.selection().ids(), vec![2]);
    }

    #[test]
    fn push_deletion_prunes_selection_and_reply() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1, 2, 3]);
        session.toggle_selection(2);
        session.toggle_selection(3);
        session.set_reply(2);

        session.handle_event(ClientEvent::Push(PushEvent::MessagesDeleted {
            conversation_id: 1,
            msg_ids: vec![2],
            for_everyone: true,
        }));

        let open = session.open().expect("open");
        assert_eq!(open.selection().ids(), vec![3]);
        assert_eq!(open.reply_to(), None);
    }

    #[test]
    fn bulk_delete_exits_selection_only_on_success() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1, 2]);
        session.toggle_selection(1);

        let effects = session.delete_selected(true);
        assert!(matches!(
            &effects[0],
            SessionEffect::Command(ClientCommand::DeleteMessages {
                msg_ids,
                for_everyone: true,
                ..
            }) if msg_ids == &vec![1]
        ));
        let request_id = request_id_of(&effects);
        session.handle_event(ClientEvent::MutationAck(MutationAck {
            request_id,
            kind: MutationKind::DeleteForEveryone,
            error: Some(ClientError::application("Failed to delete in Telegram")),
        }));
        assert_eq!(session.open().expect("open").selection().ids(), vec![1]);

        let request_id = request_id_of(&session.delete_selected(false));
        session.handle_event(ClientEvent::MutationAck(MutationAck {
            request_id,
            kind: MutationKind::DeleteForMe,
            error: None,
        }));
        assert!(!session.open().expect("open").selection().is_active());
    }

    #[test]
    fn bulk_ack_after_switch_leaves_new_selection_alone() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1]);
        session.toggle_selection(1);
        let request_id = request_id_of(&session.delete_selected(false));

        open_with_messages(&mut session, 2, &[5]);
        session.toggle_selection(5);
        session.handle_event(ClientEvent::MutationAck(MutationAck {
            request_id,
            kind: MutationKind::DeleteForMe,
            error: None,
        }));
        assert_eq!(session.open().expect("open").selection().ids(), vec![5]);
    }

    #[test]
    fn copy_joins_text_in_timeline_order() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1, 2, 3]);
        session.toggle_selection(3);
        session.toggle_selection(1);

        let effects = session.copy_selected();
        assert_eq!(
            effects,
            vec![SessionEffect::CopyToClipboard("m1\n\nm3".into())]
        );
        assert!(session.open().expect("open").selection().is_empty());
    }

    #[test]
    fn forward_filters_targets_and_reports_partial_failure() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1]);
        session.toggle_selection(1);

        let effects = session.forward_selected(&[1, 2, 77]);
        let request_id = request_id_of(&effects);
        assert!(matches!(
            &effects[0],
            SessionEffect::Command(ClientCommand::ForwardMessages { to, .. }) if to == &vec![2]
        ));

        session.handle_event(ClientEvent::ForwardCompleted {
            request_id,
            results: vec![ForwardResult {
                to: 2,
                msg_id: None,
                status: "error".into(),
                error: Some("blocked".into()),
            }],
        });
        let notices = session.take_notices();
        assert_eq!(notices[0].text, "Forward failed for: Bob");
        assert_eq!(session.open().expect("open").selection().ids(), vec![1]);
    }

    #[test]
    fn compose_sends_without_local_insert_and_clears_reply() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1]);
        session.set_reply(1);

        let effects = session.compose_text("  hello  ");
        assert!(matches!(
            &effects[0],
            SessionEffect::Command(ClientCommand::SendText {
                conversation_id: 1,
                text,
                reply_to: Some(1),
                ..
            }) if text == "hello"
        ));
        let open = session.open().expect("open");
        assert_eq!(open.timeline().len(), 1);
        assert_eq!(open.reply_to(), None);
        assert!(session.compose_text("   ").is_empty());
    }

    #[test]
    fn echo_inserts_sent_message_once() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1]);
        let mut sent = message(2, "hello");
        sent.direction = Direction::Outbound;

        for _ in 0..2 {
            session.handle_event(ClientEvent::Push(PushEvent::MessageSent {
                conversation_id: 1,
                message: sent.clone(),
            }));
        }
        assert_eq!(session.open().expect("open").timeline().len(), 2);
    }

    #[test]
    fn edit_is_limited_to_outbound_messages() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[1]);
        assert!(session.edit(1, "new").is_empty());
        assert_eq!(session.take_notices().len(), 1);
    }

    #[test]
    fn conversation_actions_respect_kind() {
        let mut session = two_chats();
        open_with_messages(&mut session, 1, &[]);
        assert!(session.leave().is_empty());
        assert_eq!(session.block().len(), 1);

        open_with_messages(&mut session, 3, &[]);
        assert!(session.block().is_empty());
        let request_id = request_id_of(&session.leave());
        session.handle_event(ClientEvent::MutationAck(MutationAck {
            request_id,
            kind: MutationKind::LeaveGroup,
            error: None,
        }));
        assert!(session.open().is_none());
    }

    #[test]
    fn stale_directory_snapshot_is_discarded() {
        let mut session = two_chats();
        let revision = match session.refresh_directory() {
            SessionEffect::Command(ClientCommand::RefreshDirectory { revision }) => revision,
            other => panic!("unexpected effect: {other:?}"),
        };
        session.handle_event(ClientEvent::DirectoryUpdated {
            revision,
            conversations: vec![summary(1, "Ada", ConversationKind::Direct)],
        });
        session.handle_event(ClientEvent::DirectoryUpdated {
            revision: revision - 1,
            conversations: Vec::new(),
        });
        assert_eq!(session.directory().conversations().len(), 1);
    }

    #[test]
    fn open_conversation_leaving_directory_closes_view() {
        let mut session = two_chats();
        session.open_conversation(2);
        session.handle_event(ClientEvent::DirectoryUpdated {
            revision: 5,
            conversations: vec![summary(1, "Ada", ConversationKind::Direct)],
        });
        assert!(session.open().is_none());
    }

    #[test]
    fn request_failures_become_notices() {
        let mut session = two_chats();
        session.handle_event(ClientEvent::RequestFailed {
            request_id: None,
            operation: "load group info".into(),
            error: ClientError::new(ClientErrorCategory::NotFound, "http_status", "gone"),
        });
        let notices = session.take_notices();
        assert_eq!(notices[0].text, "Failed to load group info: gone");
        assert_eq!(notices[0].error_code.as_deref(), Some("http_status"));
    }

    #[test]
    fn bot_info_sets_title() {
        let mut session = two_chats();
        assert_eq!(session.title(), "Chat");
        session.handle_event(ClientEvent::BotInfoLoaded(
            serde_json::from_value(json!({"name": "Helper", "username": "helper_bot"}))
                .expect("bot info"),
        ));
        assert_eq!(session.title(), "Helper Chat");
    }

    #[test]
    fn later_pages_use_cursor() {
        let mut session = two_chats();
        let ticket = ticket_of(&session.open_conversation(2));
        session.handle_event(ClientEvent::HistoryPage {
            ticket,
            page: MessagePage {
                messages: (31..=60).map(|id| message(id, "x")).collect(),
                total: Some(90),
                has_more: true,
            },
        });

        let ticket = ticket_of(&session.load_older());
        assert_eq!(ticket.offset, 30);
        assert_eq!(ticket.conversation_id, 2);
    }
}
