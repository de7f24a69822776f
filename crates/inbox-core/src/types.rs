use std::{collections::BTreeMap, path::PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;

/// Backend-assigned conversation identifier (user id for direct chats, chat id for groups).
pub type ConversationId = i64;

/// Conversation-scoped message identifier, assigned monotonically by the backend.
pub type MessageId = i64;

/// Reactor identity to emoji. A reactor holds at most one reaction per message.
pub type ReactionMap = BTreeMap<String, String>;

/// Key the backend uses for the operator's own reaction.
pub const OWN_REACTOR: &str = "me";

/// Message direction relative to the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the conversation peer(s).
    #[serde(rename = "in")]
    Inbound,
    /// Sent by the operator.
    #[serde(rename = "out")]
    Outbound,
}

/// Attachment kind reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Sticker,
    Video,
    VideoNote,
    Audio,
    Voice,
    Document,
    /// Any kind this client does not know about yet.
    #[serde(other)]
    Other,
}

impl MediaKind {
    /// Wire label, also used in previews.
    pub fn label(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Sticker => "sticker",
            Self::Video => "video",
            Self::VideoNote => "video_note",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Other => "media",
        }
    }
}

/// Borrowed view of a message attachment: kind plus opaque file token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRef<'a> {
    pub kind: MediaKind,
    pub file_token: &'a str,
}

/// One message in a conversation timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Stable identifier, never reused within the conversation.
    #[serde(rename = "msg_id")]
    pub id: MessageId,
    pub direction: Direction,
    /// Backend-local timestamp.
    pub timestamp: NaiveDateTime,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub media_file: Option<String>,
    /// Message this one replies to; the target may no longer exist.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub forwarded_from: Option<String>,
    #[serde(default)]
    pub forwarded_from_username: Option<String>,
    /// Sender identity in group conversations.
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub edited: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reactions: ReactionMap,
}

impl Message {
    /// Attachment reference when both kind and file token are present.
    pub fn media(&self) -> Option<MediaRef<'_>> {
        match (self.media_type, self.media_file.as_deref()) {
            (Some(kind), Some(file_token)) => Some(MediaRef { kind, file_token }),
            _ => None,
        }
    }

    /// Text body, or the attachment label for media-only messages.
    pub fn display_text(&self) -> String {
        if let Some(text) = self.text.as_deref() {
            return text.to_owned();
        }
        self.media_type
            .map(|kind| kind.label().to_owned())
            .unwrap_or_default()
    }

    /// One-line directory preview (`📎 <kind>` for media).
    pub fn preview(&self) -> String {
        let raw = match self.media_type {
            Some(kind) => format!("📎 {}", kind.label()),
            None => self.text.clone().unwrap_or_default(),
        };
        raw.chars().take(PREVIEW_MAX_CHARS).collect()
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }
}

const PREVIEW_MAX_CHARS: usize = 50;

/// Conversation flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Group,
    Supergroup,
    #[default]
    #[serde(other)]
    Direct,
}

/// Directory row for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    #[serde(rename = "user_id")]
    pub id: ConversationId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "chat_type", deserialize_with = "null_as_default")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_banned: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_blocked: bool,
}

impl ConversationSummary {
    /// Best-effort display name.
    pub fn display_name(&self) -> String {
        let name = self.full_name.trim();
        if !name.is_empty() {
            return name.to_owned();
        }
        match self.username.as_deref().filter(|value| !value.is_empty()) {
            Some(username) => format!("@{username}"),
            None => format!("ID: {}", self.id),
        }
    }

    /// Last-message preview, empty when the conversation has no messages.
    pub fn preview(&self) -> String {
        self.last_message
            .as_ref()
            .map(Message::preview)
            .unwrap_or_default()
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self.kind,
            ConversationKind::Group | ConversationKind::Supergroup
        )
    }

    /// Case-insensitive match against display name and username.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.full_name.to_lowercase().contains(&query)
            || self
                .username
                .as_deref()
                .is_some_and(|username| username.to_lowercase().contains(&query))
    }
}

/// One page of history as returned by the backend (oldest-first within the page).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub has_more: bool,
}

/// Server-initiated event delivered over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Inbound message from a peer.
    NewMessage {
        #[serde(rename = "user_id")]
        conversation_id: ConversationId,
        message: Message,
    },
    /// Echo of an operator-sent message.
    MessageSent {
        #[serde(rename = "user_id")]
        conversation_id: ConversationId,
        message: Message,
    },
    MessagesDeleted {
        #[serde(rename = "user_id")]
        conversation_id: ConversationId,
        msg_ids: Vec<MessageId>,
        #[serde(default)]
        for_everyone: bool,
    },
    /// Full replacement of one message's reactions.
    ReactionUpdate {
        #[serde(rename = "user_id")]
        conversation_id: ConversationId,
        msg_id: MessageId,
        #[serde(default, deserialize_with = "null_as_default")]
        reactions: ReactionMap,
    },
    MessageEdited {
        #[serde(rename = "user_id")]
        conversation_id: ConversationId,
        msg_id: MessageId,
        #[serde(default)]
        message: Option<Message>,
    },
    /// Any event kind this client does not handle.
    #[serde(other)]
    Unknown,
}

impl PushEvent {
    /// Conversation the event belongs to, if known.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::NewMessage {
                conversation_id, ..
            }
            | Self::MessageSent {
                conversation_id, ..
            }
            | Self::MessagesDeleted {
                conversation_id, ..
            }
            | Self::ReactionUpdate {
                conversation_id, ..
            }
            | Self::MessageEdited {
                conversation_id, ..
            } => Some(*conversation_id),
            Self::Unknown => None,
        }
    }

    /// Stable event-kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::MessageSent { .. } => "message_sent",
            Self::MessagesDeleted { .. } => "messages_deleted",
            Self::ReactionUpdate { .. } => "reaction_update",
            Self::MessageEdited { .. } => "message_edited",
            Self::Unknown => "unknown",
        }
    }
}

/// Push transport connection state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushConnectionState {
    /// Push loop has not been started.
    Idle,
    /// A connection attempt is in progress.
    Connecting,
    /// Frames are being received.
    Connected,
    /// Connection dropped; waiting for the fixed reconnect delay.
    WaitingToReconnect,
    /// Push loop was cancelled.
    Stopped,
}

/// Push status update emitted on every connection-state transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushStatus {
    pub state: PushConnectionState,
    /// Delay before the next attempt while waiting to reconnect.
    pub retry_in_ms: Option<u64>,
}

/// Identifies one history-page request and the open-conversation instance that issued it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageTicket {
    pub conversation_id: ConversationId,
    /// Generation of the open conversation when the request was issued.
    pub generation: u64,
    /// Offset from the newest end of the history.
    pub offset: usize,
    pub limit: u16,
}

/// File attachment queued for upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub conversation_id: ConversationId,
    /// Local file to upload.
    pub path: PathBuf,
    pub caption: String,
    pub reply_to: Option<MessageId>,
}

/// Backend-side mutation kinds acknowledged through `MutationAck`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SendText,
    SendAttachment,
    DeleteForMe,
    DeleteForEveryone,
    Forward,
    React,
    Unreact,
    EditMessage,
    ClearUnread,
    Pin,
    Unpin,
    Ban,
    Unban,
    Block,
    Unblock,
    LeaveGroup,
}

impl MutationKind {
    /// Human-readable action label used in notices.
    pub fn label(self) -> &'static str {
        match self {
            Self::SendText => "send",
            Self::SendAttachment => "upload",
            Self::DeleteForMe | Self::DeleteForEveryone => "delete",
            Self::Forward => "forward",
            Self::React => "react",
            Self::Unreact => "remove reaction",
            Self::EditMessage => "edit",
            Self::ClearUnread => "mark read",
            Self::Pin => "pin",
            Self::Unpin => "unpin",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::LeaveGroup => "leave group",
        }
    }
}

/// Acknowledgement for a backend mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationAck {
    /// Frontend-provided request id.
    pub request_id: String,
    pub kind: MutationKind,
    /// Error on failure; `None` on success.
    pub error: Option<ClientError>,
}

impl MutationAck {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-target forward outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardResult {
    pub to: ConversationId,
    #[serde(default)]
    pub msg_id: Option<MessageId>,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ForwardResult {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Previous revision of an edited message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditHistoryEntry {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub edited_at: Option<String>,
}

/// Recently active group member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub id: String,
    pub name: String,
}

/// Group metadata returned by the group-info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupInfo {
    #[serde(default)]
    pub member_count: u64,
    /// Administrator records, passed through as reported by the backend.
    #[serde(default)]
    pub admins: Vec<serde_json::Value>,
    #[serde(default)]
    pub active_members: Vec<GroupMember>,
}

/// Backend identity used as the client title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BotInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

impl BotInfo {
    pub fn title(&self) -> String {
        let name = if self.name.is_empty() {
            self.username.as_str()
        } else {
            self.name.as_str()
        };
        if name.is_empty() {
            "Chat".to_owned()
        } else {
            format!("{name} Chat")
        }
    }
}

/// Downloaded attachment bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaBlob {
    pub conversation_id: ConversationId,
    pub file_token: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Command channel input accepted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Connect the push channel and load the bot identity.
    Start,
    /// Disconnect the push channel.
    Stop,
    /// Re-fetch the directory snapshot.
    RefreshDirectory { revision: u64 },
    /// Fetch one page of older history.
    FetchHistory { ticket: PageTicket },
    SendText {
        request_id: String,
        conversation_id: ConversationId,
        text: String,
        reply_to: Option<MessageId>,
    },
    SendAttachment {
        request_id: String,
        attachment: OutgoingAttachment,
    },
    DeleteMessages {
        request_id: String,
        conversation_id: ConversationId,
        msg_ids: Vec<MessageId>,
        for_everyone: bool,
    },
    ForwardMessages {
        request_id: String,
        from: ConversationId,
        to: Vec<ConversationId>,
        msg_ids: Vec<MessageId>,
    },
    /// Set the operator's reaction; resubmitting the current emoji toggles it off.
    React {
        request_id: String,
        conversation_id: ConversationId,
        msg_id: MessageId,
        emoji: String,
    },
    Unreact {
        request_id: String,
        conversation_id: ConversationId,
        msg_id: MessageId,
    },
    EditMessage {
        request_id: String,
        conversation_id: ConversationId,
        msg_id: MessageId,
        text: String,
    },
    ClearUnread {
        request_id: String,
        conversation_id: ConversationId,
    },
    PinMessage {
        request_id: String,
        chat_id: ConversationId,
        msg_id: MessageId,
    },
    UnpinMessage {
        request_id: String,
        chat_id: ConversationId,
        msg_id: MessageId,
    },
    BanMember {
        request_id: String,
        chat_id: ConversationId,
        user_id: i64,
    },
    UnbanMember {
        request_id: String,
        chat_id: ConversationId,
        user_id: i64,
    },
    BlockUser {
        request_id: String,
        user_id: ConversationId,
    },
    UnblockUser {
        request_id: String,
        user_id: ConversationId,
    },
    LeaveGroup {
        request_id: String,
        chat_id: ConversationId,
    },
    FetchGroupInfo {
        request_id: String,
        chat_id: ConversationId,
    },
    FetchEditHistory {
        request_id: String,
        conversation_id: ConversationId,
        msg_id: MessageId,
    },
    FetchMedia {
        request_id: String,
        conversation_id: ConversationId,
        file_token: String,
    },
    FetchBotInfo,
}

/// Event channel output emitted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientEvent {
    PushStatus(PushStatus),
    /// Decoded push frame, in transport arrival order.
    Push(PushEvent),
    DirectoryUpdated {
        revision: u64,
        conversations: Vec<ConversationSummary>,
    },
    HistoryPage {
        ticket: PageTicket,
        page: MessagePage,
    },
    HistoryFailed {
        ticket: PageTicket,
        error: ClientError,
    },
    MutationAck(MutationAck),
    /// Forward request accepted; per-target outcomes.
    ForwardCompleted {
        request_id: String,
        results: Vec<ForwardResult>,
    },
    GroupInfoLoaded {
        request_id: String,
        chat_id: ConversationId,
        info: GroupInfo,
    },
    EditHistoryLoaded {
        request_id: String,
        conversation_id: ConversationId,
        msg_id: MessageId,
        entries: Vec<EditHistoryEntry>,
    },
    MediaLoaded {
        request_id: String,
        media: MediaBlob,
    },
    BotInfoLoaded(BotInfo),
    /// A query or background operation failed outside of the ack paths.
    RequestFailed {
        request_id: Option<String>,
        operation: String,
        error: ClientError,
    },
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_backend_message_with_sparse_fields() {
        let message: Message = serde_json::from_value(json!({
            "msg_id": 42,
            "direction": "in",
            "text": "",
            "timestamp": "2024-05-01T10:20:30.123456",
            "media_type": "photo",
            "media_file": "42.jpg",
            "reply_to": null,
            "forwarded_from": null,
            "forwarded_from_username": null,
            "source": "bot"
        }))
        .expect("message should decode");

        assert_eq!(message.id, 42);
        assert_eq!(message.direction, Direction::Inbound);
        assert_eq!(message.text, None);
        assert_eq!(
            message.media(),
            Some(MediaRef {
                kind: MediaKind::Photo,
                file_token: "42.jpg"
            })
        );
        assert!(message.reactions.is_empty());
        assert!(!message.edited);
        assert_eq!(message.preview(), "📎 photo");
    }

    #[test]
    fn unknown_media_kind_decodes_as_other() {
        let message: Message = serde_json::from_value(json!({
            "msg_id": 1,
            "direction": "out",
            "timestamp": "2024-05-01T10:20:30",
            "media_type": "hologram",
            "media_file": "1.bin",
            "reactions": null
        }))
        .expect("message should decode");
        assert_eq!(message.media_type, Some(MediaKind::Other));
        assert!(message.is_outbound());
    }

    #[test]
    fn decodes_directory_row_with_defaults() {
        let summary: ConversationSummary = serde_json::from_value(json!({
            "user_id": 7,
            "first_name": "Ada",
            "last_name": "",
            "username": "ada",
            "full_name": "Ada",
            "folder_name": "Ada$$7",
            "unread_count": 3,
            "last_message": null,
            "is_banned": false
        }))
        .expect("summary should decode");

        assert_eq!(summary.id, 7);
        assert_eq!(summary.kind, ConversationKind::Direct);
        assert_eq!(summary.unread_count, 3);
        assert!(summary.matches_query("AD"));
        assert!(!summary.matches_query("bob"));
        assert_eq!(summary.preview(), "");
    }

    #[test]
    fn missing_null_or_unknown_chat_type_is_direct() {
        for chat_type in [None, Some(json!(null)), Some(json!("channel"))] {
            let mut row = json!({"user_id": 11, "full_name": "Zed"});
            if let Some(chat_type) = chat_type {
                row["chat_type"] = chat_type;
            }
            let summary: ConversationSummary =
                serde_json::from_value(row.clone()).expect("summary should decode");
            assert_eq!(summary.kind, ConversationKind::Direct, "row: {row}");
            assert!(!summary.is_group());
        }

        let group: ConversationSummary = serde_json::from_value(json!({
            "user_id": -100, "full_name": "Ops", "chat_type": "supergroup"
        }))
        .expect("summary should decode");
        assert_eq!(group.kind, ConversationKind::Supergroup);
        assert!(group.is_group());
    }

    #[test]
    fn display_name_falls_back_to_username_then_id() {
        let mut summary: ConversationSummary = serde_json::from_value(json!({
            "user_id": 9, "full_name": " ", "username": "neo"
        }))
        .expect("summary should decode");
        assert_eq!(summary.display_name(), "@neo");
        summary.username = None;
        assert_eq!(summary.display_name(), "ID: 9");
    }

    #[test]
    fn decodes_tagged_push_events() {
        let event: PushEvent = serde_json::from_value(json!({
            "type": "messages_deleted",
            "user_id": 5,
            "msg_ids": [1, 2],
            "for_everyone": true
        }))
        .expect("push event should decode");
        assert_eq!(
            event,
            PushEvent::MessagesDeleted {
                conversation_id: 5,
                msg_ids: vec![1, 2],
                for_everyone: true,
            }
        );
        assert_eq!(event.conversation_id(), Some(5));
    }

    #[test]
    fn unknown_push_kind_decodes_as_unknown() {
        let event: PushEvent = serde_json::from_value(json!({
            "type": "typing_started",
            "user_id": 5
        }))
        .expect("unknown kinds should still decode");
        assert_eq!(event, PushEvent::Unknown);
        assert_eq!(event.conversation_id(), None);
    }

    #[test]
    fn bot_title_prefers_name_then_username() {
        let info = BotInfo {
            name: String::new(),
            username: "helper_bot".into(),
        };
        assert_eq!(info.title(), "helper_bot Chat");
        assert_eq!(BotInfo::default().title(), "Chat");
    }
}
