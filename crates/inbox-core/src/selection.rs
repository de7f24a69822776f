use std::collections::BTreeSet;

use crate::types::MessageId;

/// Message ids chosen for a bulk action in the open conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionController {
    active: bool,
    ids: BTreeSet<MessageId>,
}

impl SelectionController {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn enter(&mut self) {
        self.active = true;
    }

    /// Leave selection mode. Always clears the set.
    pub fn exit(&mut self) {
        self.active = false;
        self.ids.clear();
    }

    /// Add or remove `id`, entering selection mode if needed.
    ///
    /// Membership in the open timeline is checked by the caller. Returns
    /// whether the id is selected afterwards.
    pub fn toggle(&mut self, id: MessageId) -> bool {
        self.active = true;
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in ascending order.
    pub fn ids(&self) -> Vec<MessageId> {
        self.ids.iter().copied().collect()
    }

    /// Drop ids that no longer exist in the timeline.
    pub fn prune(&mut self, removed: &[MessageId]) {
        for id in removed {
            self.ids.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let mut selection = SelectionController::default();
        assert!(selection.toggle(3));
        assert!(selection.is_active());
        assert!(selection.contains(3));
        assert!(!selection.toggle(3));
        assert!(selection.is_empty());
        assert!(selection.is_active());
    }

    #[test]
    fn exit_always_clears() {
        let mut selection = SelectionController::default();
        selection.enter();
        selection.toggle(1);
        selection.toggle(2);
        selection.exit();

        assert!(!selection.is_active());
        assert!(selection.is_empty());
    }

    #[test]
    fn prune_drops_only_removed_ids() {
        let mut selection = SelectionController::default();
        selection.toggle(4);
        selection.toggle(1);
        selection.toggle(9);
        selection.prune(&[9, 100]);

        assert_eq!(selection.ids(), vec![1, 4]);
    }
}
