use std::collections::HashSet;

use tracing::{debug, trace};

use crate::types::{Message, MessageId, ReactionMap};

/// Length change caused by a history prepend, used to keep the scroll anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrependOutcome {
    pub old_len: usize,
    pub new_len: usize,
    /// Batch items actually inserted (already-present ids are skipped).
    pub inserted: usize,
}

/// Ordered, deduplicated message list for the open conversation.
///
/// Items are kept oldest-to-newest. Message ids are unique within the store;
/// every insertion path checks the id index first and treats a collision as a
/// no-op rather than a replace.
#[derive(Debug, Clone)]
pub struct TimelineStore {
    items: Vec<Message>,
    ids: HashSet<MessageId>,
    cursor: usize,
    has_more: bool,
    live_shift: isize,
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineStore {
    /// Create an empty store. History is assumed to exist until a page says otherwise.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            cursor: 0,
            has_more: true,
            live_shift: 0,
        }
    }

    /// Drop all messages and pagination progress.
    pub fn reset(&mut self) {
        self.items.clear();
        self.ids.clear();
        self.cursor = 0;
        self.has_more = true;
        self.live_shift = 0;
    }

    /// Current messages, oldest first.
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter().find(|message| message.id == id)
    }

    /// Number of history messages fetched so far. Never decreases until `reset`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the backend reported older history beyond the loaded pages.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Offset from the newest end to request the next older page from.
    ///
    /// Live inserts push history further from the newest end and removals pull
    /// it closer, so the cursor is corrected by the net live shift.
    pub fn fetch_offset(&self) -> usize {
        let offset = self.cursor as isize + self.live_shift;
        offset.max(0) as usize
    }

    /// Prepend an oldest-first history batch.
    pub fn append_older(&mut self, batch: Vec<Message>, has_more: bool) -> PrependOutcome {
        let old_len = self.items.len();
        self.cursor += batch.len();
        self.has_more = has_more;

        let mut fresh = Vec::with_capacity(batch.len());
        for message in batch {
            if self.ids.insert(message.id) {
                fresh.push(message);
            } else {
                trace!(msg_id = message.id, "skipping already loaded history message");
            }
        }
        let inserted = fresh.len();
        self.items.splice(0..0, fresh);

        PrependOutcome {
            old_len,
            new_len: self.items.len(),
            inserted,
        }
    }

    /// Append a live message at the tail unless its id is already present.
    ///
    /// Returns `true` when the message was inserted.
    pub fn append_live(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            debug!(msg_id = message.id, "ignoring duplicate live message");
            return false;
        }
        self.items.push(message);
        self.live_shift += 1;
        true
    }

    /// Replace a message's text and edited flag in place.
    ///
    /// A missing or empty `new_text` keeps the current text (a media caption
    /// survives an edit frame that carries no text).
    pub fn apply_edit(&mut self, id: MessageId, new_text: Option<String>, edited: bool) -> bool {
        let Some(message) = self.find_mut(id) else {
            debug!(msg_id = id, "edit for message not in timeline; ignoring");
            return false;
        };
        if let Some(text) = new_text.filter(|text| !text.is_empty()) {
            message.text = Some(text);
        }
        message.edited = edited;
        true
    }

    /// Replace a message's reaction map wholesale. An empty map clears reactions.
    pub fn apply_reaction_update(&mut self, id: MessageId, reactions: ReactionMap) -> bool {
        let Some(message) = self.find_mut(id) else {
            debug!(msg_id = id, "reaction update for message not in timeline; ignoring");
            return false;
        };
        message.reactions = reactions;
        true
    }

    /// Remove every message whose id is listed; absent ids are ignored.
    ///
    /// Returns the ids that were actually removed.
    pub fn remove_many(&mut self, ids: &[MessageId]) -> Vec<MessageId> {
        let targets: HashSet<MessageId> = ids
            .iter()
            .copied()
            .filter(|id| self.ids.contains(id))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::with_capacity(targets.len());
        self.items.retain(|message| {
            if targets.contains(&message.id) {
                removed.push(message.id);
                false
            } else {
                true
            }
        });
        for id in &removed {
            self.ids.remove(id);
        }
        self.live_shift -= removed.len() as isize;
        removed
    }

    /// Clamp a requested page size against safety and server caps.
    ///
    /// The result is always in `1..=100`.
    pub fn bounded_page_limit(requested: u16, server_cap: u16) -> u16 {
        let safe_requested = requested.max(1);
        let safe_cap = server_cap.max(1);
        safe_requested.min(safe_cap).min(100)
    }

    fn find_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        if !self.ids.contains(&id) {
            return None;
        }
        self.items.iter_mut().find(|message| message.id == id)
    }
}
