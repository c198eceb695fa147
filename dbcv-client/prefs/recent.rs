use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{load_json, store_json};
use crate::storage::LocalStorage;

pub const MAX_RECENT_ITEMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecentKind {
    Channel,
    Bot,
    Request,
    Widget,
}

impl RecentKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            RecentKind::Channel => "recent_channels",
            RecentKind::Bot => "recent_bots",
            RecentKind::Request => "recent_requests",
            RecentKind::Widget => "recent_widgets",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecentKind,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// Most-recently-opened list for one entity kind, newest first.
pub struct RecentItems {
    kind: RecentKind,
    storage: Arc<dyn LocalStorage>,
    items: Vec<RecentItem>,
}

impl RecentItems {
    pub fn load(kind: RecentKind, storage: Arc<dyn LocalStorage>) -> Self {
        let items = load_json(storage.as_ref(), kind.storage_key()).unwrap_or_default();
        Self {
            kind,
            storage,
            items,
        }
    }

    pub fn items(&self) -> &[RecentItem] {
        &self.items
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Move (or insert) `id` to the front; the list never exceeds
    /// `MAX_RECENT_ITEMS`.
    pub fn add(&mut self, id: &str, name: &str) {
        let item = RecentItem {
            id: id.to_string(),
            name: name.to_string(),
            kind: self.kind,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.items.retain(|i| i.id != id);
        self.items.insert(0, item);
        self.items.truncate(MAX_RECENT_ITEMS);
        store_json(self.storage.as_ref(), self.kind.storage_key(), &self.items);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        if let Err(e) = self.storage.remove(self.kind.storage_key()) {
            tracing::warn!(error = %e, "failed to clear recent items");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn recent() -> (RecentItems, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (RecentItems::load(RecentKind::Bot, storage.clone()), storage)
    }

    #[test]
    fn test_newest_first() {
        let (mut r, _) = recent();
        r.add("a", "A");
        r.add("b", "B");
        assert_eq!(r.ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_ninth_item_evicts_oldest() {
        let (mut r, _) = recent();
        for i in 1..=9 {
            r.add(&format!("id{i}"), &format!("Item {i}"));
        }
        assert_eq!(r.items().len(), MAX_RECENT_ITEMS);
        assert_eq!(r.items()[0].id, "id9");
        assert!(!r.ids().contains(&"id1"));
    }

    #[test]
    fn test_re_adding_moves_to_front_without_duplicate() {
        let (mut r, _) = recent();
        for id in ["a", "b", "c"] {
            r.add(id, id);
        }
        r.add("a", "A renamed");
        assert_eq!(r.ids(), vec!["a", "c", "b"]);
        assert_eq!(r.items()[0].name, "A renamed");
    }

    #[test]
    fn test_re_adding_in_full_list_keeps_others() {
        let (mut r, _) = recent();
        for i in 1..=8 {
            r.add(&format!("id{i}"), "x");
        }
        r.add("id1", "x");
        assert_eq!(r.items().len(), 8);
        assert_eq!(r.items()[0].id, "id1");
        assert!(r.ids().contains(&"id2"));
    }

    #[test]
    fn test_persisted_and_reloaded() {
        let (mut r, storage) = recent();
        r.add("a", "A");
        let reloaded = RecentItems::load(RecentKind::Bot, storage.clone());
        assert_eq!(reloaded.ids(), vec!["a"]);
        assert_eq!(reloaded.items()[0].kind, RecentKind::Bot);
        assert!(storage.get("recent_bots").unwrap().contains("\"type\":\"bot\""));
    }

    #[test]
    fn test_corrupt_storage_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("recent_channels", "not json").unwrap();
        let r = RecentItems::load(RecentKind::Channel, storage);
        assert!(r.is_empty());
    }

    #[test]
    fn test_clear_removes_key() {
        let (mut r, storage) = recent();
        r.add("a", "A");
        r.clear();
        assert!(r.is_empty());
        assert!(storage.get("recent_bots").is_none());
    }
}
