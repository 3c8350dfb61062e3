//! Ordered registry of downloaded media with a display cursor.
//!
//! Items keep the order in which they arrived in their batch. The cursor is always a
//! valid index while the registry is non-empty; an empty registry has no current item.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// A media file that finished downloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub local_path: PathBuf,
    pub kind: MediaKind,
    /// Position of the item in its source batch
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl MediaItem {
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.kind),
            None => format!("{} #{}", self.kind, self.index + 1),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry is empty")]
    Empty,

    #[error("item {requested} not available (only {len} items)")]
    IndexOutOfRange { requested: usize, len: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRegistry {
    items: Vec<MediaItem>,
    current_index: usize,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted parts, clamping the cursor into range.
    pub fn from_parts(items: Vec<MediaItem>, current_index: usize) -> Self {
        let mut registry = Self {
            items,
            current_index: 0,
        };
        registry.show_nearest(current_index as i64);
        registry
    }

    /// Discards all items and takes `items` in the given order. The cursor resets to 0.
    pub fn replace_all(&mut self, items: Vec<MediaItem>) {
        debug!(
            "Replacing {} media items with {}",
            self.items.len(),
            items.len()
        );
        self.items = items;
        self.current_index = 0;
    }

    /// Moves the cursor to `index`, rejecting anything outside the registry.
    pub fn show_by_index(&mut self, index: usize) -> Result<&MediaItem, RegistryError> {
        if self.items.is_empty() {
            return Err(RegistryError::Empty);
        }
        if index >= self.items.len() {
            warn!(
                "Item {} not available (only {} items)",
                index + 1,
                self.items.len()
            );
            return Err(RegistryError::IndexOutOfRange {
                requested: index,
                len: self.items.len(),
            });
        }
        self.current_index = index;
        Ok(&self.items[index])
    }

    /// Moves the cursor to `index` clamped into `[0, len - 1]`.
    pub fn show_nearest(&mut self, index: i64) -> Option<&MediaItem> {
        if self.items.is_empty() {
            return None;
        }
        let last = (self.items.len() - 1) as i64;
        self.current_index = index.clamp(0, last) as usize;
        self.items.get(self.current_index)
    }

    pub fn next(&mut self) -> Option<&MediaItem> {
        if self.items.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % self.items.len();
        self.items.get(self.current_index)
    }

    pub fn previous(&mut self) -> Option<&MediaItem> {
        if self.items.is_empty() {
            return None;
        }
        self.current_index = if self.current_index > 0 {
            self.current_index - 1
        } else {
            self.items.len() - 1
        };
        self.items.get(self.current_index)
    }

    pub fn current(&self) -> Option<&MediaItem> {
        self.items.get(self.current_index)
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.current_index)
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops items whose local file has disappeared since they were registered.
    pub fn retain_existing(&mut self) {
        let before = self.items.len();
        self.items.retain(|item| item.local_path.exists());
        if self.items.len() != before {
            warn!(
                "Dropped {} media items with missing files",
                before - self.items.len()
            );
        }
        let current = self.current_index as i64;
        self.show_nearest(current);
        if self.items.is_empty() {
            self.current_index = 0;
        }
    }
}
