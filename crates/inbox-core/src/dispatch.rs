use tracing::{debug, trace};

use crate::{
    timeline::TimelineStore,
    types::{ConversationId, MessageId, PushEvent},
};

/// What a push event did and what the caller still has to do about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Re-fetch the directory snapshot.
    pub refresh_directory: bool,
    /// Keep the view pinned to the newest message.
    pub scroll_to_bottom: bool,
    /// Conversation whose unread counter should be cleared.
    pub mark_read: Option<ConversationId>,
    /// Whether the open timeline was mutated.
    pub timeline_changed: bool,
    /// Ids actually removed from the open timeline.
    pub removed: Vec<MessageId>,
}

/// Apply one push event to the open timeline, if it belongs there.
///
/// `open` is the currently open conversation and its timeline. Events for any
/// other conversation never touch the timeline; they only ask for a directory
/// refresh so unread counters and previews catch up.
pub fn dispatch_push(
    event: PushEvent,
    open: Option<(ConversationId, &mut TimelineStore)>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let Some(conversation_id) = event.conversation_id() else {
        trace!(kind = event.kind(), "ignoring unhandled push event");
        return outcome;
    };
    let timeline = match open {
        Some((open_id, timeline)) if open_id == conversation_id => Some(timeline),
        _ => None,
    };
    let Some(timeline) = timeline else {
        debug!(
            conversation_id,
            kind = event.kind(),
            "push event for a conversation that is not open"
        );
        outcome.refresh_directory = true;
        return outcome;
    };

    match event {
        PushEvent::NewMessage { message, .. } => {
            outcome.refresh_directory = true;
            outcome.timeline_changed = timeline.append_live(message);
            outcome.scroll_to_bottom = true;
            outcome.mark_read = Some(conversation_id);
        }
        PushEvent::MessageSent { message, .. } => {
            outcome.refresh_directory = true;
            outcome.timeline_changed = timeline.append_live(message);
            outcome.scroll_to_bottom = true;
        }
        PushEvent::MessagesDeleted { msg_ids, .. } => {
            outcome.refresh_directory = true;
            outcome.removed = timeline.remove_many(&msg_ids);
            outcome.timeline_changed = !outcome.removed.is_empty();
        }
        PushEvent::ReactionUpdate {
            msg_id, reactions, ..
        } => {
            outcome.timeline_changed = timeline.apply_reaction_update(msg_id, reactions);
        }
        PushEvent::MessageEdited {
            msg_id, message, ..
        } => {
            // Edits can change the directory preview when they hit the newest message.
            outcome.refresh_directory = true;
            match message {
                Some(message) => {
                    outcome.timeline_changed = timeline.apply_edit(msg_id, message.text, true);
                }
                None => debug!(msg_id, "edit event without message payload; ignoring"),
            }
        }
        PushEvent::Unknown => {}
    }

    outcome
}
