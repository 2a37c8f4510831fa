//! Multi-select and read tracking.

use std::collections::HashMap;

use crate::store::ResultStore;
use crate::types::ItemId;

/// An item is read when the revision the user last viewed is the current one.
///
/// A newer revision makes a previously read item unread again.
pub fn is_read(stored: Option<u64>, current: u64) -> bool {
    stored == Some(current)
}

#[derive(Debug, Default, Clone)]
pub struct SelectionTracker {
    // ordered by when each id was selected
    selected: Vec<ItemId>,
    read: HashMap<ItemId, u64>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from revisions the server reports as already viewed.
    pub fn with_read_state(read: HashMap<ItemId, u64>) -> Self {
        Self {
            selected: Vec::new(),
            read,
        }
    }

    pub fn selected(&self) -> &[ItemId] {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    /// Flip membership of a committed id. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &str, store: &ResultStore) -> bool {
        if !store.contains(id) {
            log::debug!("Ignoring selection toggle for uncommitted item {}", id);
            return false;
        }
        if let Some(pos) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(id.to_string());
            true
        }
    }

    pub fn select_all(&mut self, store: &ResultStore) {
        self.selected = store.ids().to_vec();
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    /// Drop selected ids that are no longer committed. Read state is kept.
    pub fn retain_committed(&mut self, store: &ResultStore) -> usize {
        let before = self.selected.len();
        self.selected.retain(|id| store.contains(id));
        before - self.selected.len()
    }

    pub fn mark_read(&mut self, id: &str, revision: u64) {
        self.read.insert(id.to_string(), revision);
    }

    pub fn read_revision(&self, id: &str) -> Option<u64> {
        self.read.get(id).copied()
    }

    pub fn is_read(&self, id: &str, current_revision: u64) -> bool {
        is_read(self.read_revision(id), current_revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, SearchPayload};

    fn item(id: &str, revision: u64) -> Item {
        Item {
            id: id.to_string(),
            revision,
            created: None,
            headline: Some(id.to_uppercase()),
            slugline: None,
            name: None,
            coverages: vec![],
            watches: vec![],
            bookmarks: vec![],
            occurrences: vec![],
            planning_items: vec![],
        }
    }

    fn store_with(ids: &[&str]) -> ResultStore {
        let mut store = ResultStore::default();
        store.commit(SearchPayload {
            items: ids.iter().map(|id| item(id, 1)).collect(),
            total: ids.len() as u64,
            aggregations: None,
        });
        store
    }

    #[test]
    fn test_is_read_rule() {
        assert!(!is_read(None, 1));
        assert!(is_read(Some(3), 3));
        assert!(!is_read(Some(3), 4));
    }

    #[test]
    fn test_toggle_twice_is_noop() {
        let store = store_with(&["a", "b"]);
        let mut tracker = SelectionTracker::new();
        assert!(tracker.toggle("a", &store));
        assert!(!tracker.toggle("a", &store));
        assert!(tracker.selected().is_empty());
    }

    #[test]
    fn test_toggle_ignores_uncommitted() {
        let store = store_with(&["a"]);
        let mut tracker = SelectionTracker::new();
        assert!(!tracker.toggle("ghost", &store));
        assert!(!tracker.is_selected("ghost"));
    }

    #[test]
    fn test_select_all_and_none() {
        let store = store_with(&["a", "b", "c"]);
        let mut tracker = SelectionTracker::new();
        tracker.select_all(&store);
        assert_eq!(tracker.selected(), &["a", "b", "c"]);
        tracker.select_none();
        assert!(tracker.selected().is_empty());
    }

    #[test]
    fn test_replacement_prunes_selection_keeps_read() {
        let mut store = store_with(&["a", "b"]);
        let mut tracker = SelectionTracker::new();
        tracker.toggle("a", &store);
        tracker.toggle("b", &store);
        tracker.mark_read("a", 1);

        store.commit(SearchPayload {
            items: vec![item("b", 1), item("c", 1)],
            total: 2,
            aggregations: None,
        });
        assert_eq!(tracker.retain_committed(&store), 1);
        assert_eq!(tracker.selected(), &["b"]);
        assert!(tracker.is_read("a", 1));
    }

    #[test]
    fn test_new_revision_becomes_unread() {
        let mut tracker = SelectionTracker::new();
        tracker.mark_read("a", 1);
        assert!(tracker.is_read("a", 1));
        assert!(!tracker.is_read("a", 2));
        tracker.mark_read("a", 2);
        assert!(tracker.is_read("a", 2));
    }

    #[test]
    fn test_seeded_read_state() {
        let tracker = SelectionTracker::with_read_state(HashMap::from([("a".to_string(), 5)]));
        assert!(tracker.is_read("a", 5));
        assert!(!tracker.is_read("b", 1));
    }
}
