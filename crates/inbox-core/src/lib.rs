//! Core inbox client contract shared between runtime and frontend consumers.
//!
//! This crate defines the command/event protocol and wire models, the
//! open-conversation timeline with its pagination and selection controllers,
//! push-event dispatch, and the session state that ties them together. It
//! performs no I/O.

/// Async command/event channel primitives.
pub mod channel;
/// Push event dispatch onto the open timeline.
pub mod dispatch;
/// Stable client error types and HTTP classification helpers.
pub mod error;
/// Response decoding and event normalization helpers.
pub mod normalization;
/// Older-history fetch guard.
pub mod pagination;
/// Fixed-delay reconnect policy for the push channel.
pub mod retry;
/// Message selection for bulk actions.
pub mod selection;
/// Operator session state.
pub mod session;
/// Push connection state machine.
pub mod state_machine;
/// Open-conversation timeline store.
pub mod timeline;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use channel::{ClientChannelError, ClientChannels, EventStream};
pub use dispatch::{DispatchOutcome, dispatch_push};
pub use error::{ClientError, ClientErrorCategory, classify_http_status};
pub use normalization::{decode_api_response, normalize_history_outcome, normalize_mutation_outcome};
pub use pagination::{DEFAULT_PAGE_SIZE, PaginationController};
pub use retry::{DEFAULT_RECONNECT_DELAY_MS, ReconnectPolicy};
pub use selection::SelectionController;
pub use session::{Directory, InboxSession, Notice, OpenConversation, SessionEffect};
pub use state_machine::PushStateMachine;
pub use timeline::{PrependOutcome, TimelineStore};
pub use types::{
    BotInfo, ClientCommand, ClientEvent, ConversationId, ConversationKind, ConversationSummary,
    Direction, EditHistoryEntry, ForwardResult, GroupInfo, GroupMember, MediaBlob, MediaKind,
    MediaRef, Message, MessageId, MessagePage, MutationAck, MutationKind, OWN_REACTOR,
    OutgoingAttachment, PageTicket, PushConnectionState, PushEvent, PushStatus, ReactionMap,
};
