//! Media handling: batch parsing, sequential downloads and the display registry.
//!
//! ```text
//! batch JSON ──► MediaBatch ──► DownloadHandle ──► DownloadReport ──► MediaRegistry
//!               (batch.rs)      (downloader.rs)                       (registry.rs)
//! ```

pub mod batch;
pub mod downloader;
pub mod registry;

pub use batch::{BatchError, MediaBatch, MediaRequest};
pub use downloader::{DownloadError, DownloadEvent, DownloadHandle, DownloadReport};
pub use registry::{MediaItem, MediaKind, MediaRegistry, RegistryError};
