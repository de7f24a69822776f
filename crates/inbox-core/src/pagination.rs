use tracing::trace;

use crate::{
    timeline::TimelineStore,
    types::{ConversationId, PageTicket},
};

/// Default history page size.
pub const DEFAULT_PAGE_SIZE: u16 = 30;

/// Single in-flight guard for older-history fetches.
///
/// Concurrent `load_older` calls collapse into one outstanding request; there
/// is no queue.
#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: u16,
    in_flight: Option<PageTicket>,
}

impl PaginationController {
    pub fn new(page_size: u16) -> Self {
        Self {
            page_size: TimelineStore::bounded_page_limit(page_size, page_size),
            in_flight: None,
        }
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Outstanding request, if any.
    pub fn in_flight(&self) -> Option<&PageTicket> {
        self.in_flight.as_ref()
    }

    /// Issue a ticket for the next older page, or `None` when a fetch is
    /// already in flight or the store reports no more history.
    pub fn load_older(
        &mut self,
        conversation_id: ConversationId,
        generation: u64,
        store: &TimelineStore,
    ) -> Option<PageTicket> {
        if self.in_flight.is_some() {
            trace!(conversation_id, "history fetch already in flight");
            return None;
        }
        if !store.has_more() {
            trace!(conversation_id, "no older history to fetch");
            return None;
        }

        let ticket = PageTicket {
            conversation_id,
            generation,
            offset: store.fetch_offset(),
            limit: self.page_size,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Release the guard if `ticket` is the outstanding request.
    ///
    /// Returns `false` for tickets this controller did not issue or already settled.
    pub fn complete(&mut self, ticket: &PageTicket) -> bool {
        if self.in_flight.as_ref() == Some(ticket) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
