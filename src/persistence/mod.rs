//! # Persistence Module
//!
//! Keeps the little state the receiver carries across restarts in one flat
//! key-value file: the device serial, the pairing flag and the last media list.
//!
//! ## Error Handling Strategy
//! Reading never fails: a missing or corrupted file degrades to an empty store so the
//! receiver always starts. Write errors are returned to the caller, which logs them.

pub mod store;

pub use store::{KeyValueStore, StoreError};

use crate::media::{MediaItem, MediaRegistry};
use tracing::warn;

pub const STATE_FILE: &str = "state.toml";

pub const KEY_SERIAL: &str = "serial";
pub const KEY_IS_PAIRED: &str = "is_paired";
pub const KEY_PAIRING_CODE: &str = "pairing_code";
pub const KEY_MEDIA_ITEMS: &str = "media_items";
pub const KEY_CURRENT_INDEX: &str = "current_index";
pub const KEY_LAST_MEDIA_PATH: &str = "last_media_path";

/// Pairing and media state captured for the next start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub paired: bool,
    pub pairing_code: Option<String>,
    pub items: Vec<MediaItem>,
    pub current_index: usize,
}

impl SessionSnapshot {
    pub fn capture(paired: bool, pairing_code: &str, registry: &MediaRegistry) -> Self {
        Self {
            paired,
            pairing_code: Some(pairing_code.to_string()),
            items: registry.items().to_vec(),
            current_index: registry.current_index().unwrap_or(0),
        }
    }

    pub fn load(store: &KeyValueStore) -> Self {
        let items = match store.get(KEY_MEDIA_ITEMS) {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                warn!("Discarding unreadable media list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        Self {
            paired: store.get_bool(KEY_IS_PAIRED).unwrap_or(false),
            pairing_code: store.get(KEY_PAIRING_CODE).map(str::to_string),
            items,
            current_index: store.get_usize(KEY_CURRENT_INDEX).unwrap_or(0),
        }
    }

    pub fn write_to(&self, store: &mut KeyValueStore) {
        store.set(KEY_IS_PAIRED, self.paired);
        match &self.pairing_code {
            Some(code) => store.set(KEY_PAIRING_CODE, code),
            None => {
                store.remove(KEY_PAIRING_CODE);
            }
        }

        match serde_json::to_string(&self.items) {
            Ok(json) => store.set(KEY_MEDIA_ITEMS, json),
            Err(e) => warn!("Failed to serialize media list: {}", e),
        }
        store.set(KEY_CURRENT_INDEX, self.current_index);

        match self.items.get(self.current_index) {
            Some(item) => store.set(KEY_LAST_MEDIA_PATH, item.local_path.display()),
            None => {
                store.remove(KEY_LAST_MEDIA_PATH);
            }
        }
    }

    pub fn registry(&self) -> MediaRegistry {
        let mut registry = MediaRegistry::from_parts(self.items.clone(), self.current_index);
        registry.retain_existing();
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    #[tokio::test]
    async fn snapshot_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("video_0.mp4");
        tokio::fs::write(&file, b"mp4").await.unwrap();

        let mut registry = MediaRegistry::new();
        registry.replace_all(vec![MediaItem {
            url: "https://a.com/v.mp4".to_string(),
            local_path: file.clone(),
            kind: MediaKind::Video,
            index: 0,
            name: Some("intro".to_string()),
        }]);
        let snapshot = SessionSnapshot::capture(true, "A1B2C3", &registry);

        let mut store = KeyValueStore::open(dir.path().join(STATE_FILE)).await;
        snapshot.write_to(&mut store);
        store.save().await.unwrap();

        let store = KeyValueStore::open(dir.path().join(STATE_FILE)).await;
        let restored = SessionSnapshot::load(&store);
        assert_eq!(restored, snapshot);
        assert_eq!(
            store.get(KEY_LAST_MEDIA_PATH),
            Some(file.display().to_string().as_str())
        );
        assert_eq!(restored.registry().len(), 1);
    }

    #[tokio::test]
    async fn empty_store_gives_unpaired_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::open(dir.path().join(STATE_FILE)).await;

        let snapshot = SessionSnapshot::load(&store);

        assert!(!snapshot.paired);
        assert!(snapshot.pairing_code.is_none());
        assert!(snapshot.registry().is_empty());
    }
}
