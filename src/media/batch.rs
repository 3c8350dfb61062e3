//! Parsing of media batch messages.
//!
//! Two payload shapes are accepted:
//!
//! ```text
//! {"images": [{"url": "..."}], "total_images": 2}
//! {"media":  [{"url": "...", "type": "video", "name": "intro"}]}
//! ```

use super::registry::MediaKind;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "m3u8", "3gp"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch contains no downloadable entries")]
    Empty,
}

/// One entry of a batch, in the position it had in the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub index: usize,
    pub url: String,
    pub kind: MediaKind,
    pub name: Option<String>,
}

/// An ordered list of media to download and show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBatch {
    pub requests: Vec<MediaRequest>,
}

#[derive(Deserialize)]
struct RawBatch {
    #[serde(default)]
    images: Option<Vec<RawEntry>>,
    #[serde(default)]
    media: Option<Vec<RawEntry>>,
}

#[derive(Deserialize)]
struct RawEntry {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
}

impl MediaBatch {
    pub fn parse(payload: &str) -> Result<Self, BatchError> {
        let raw: RawBatch = serde_json::from_str(payload)?;
        let entries = raw.media.or(raw.images).unwrap_or_default();

        let requests: Vec<MediaRequest> = entries
            .into_iter()
            .filter_map(|entry| match entry.url {
                Some(url) if !url.trim().is_empty() => Some((url, entry.kind, entry.name)),
                _ => {
                    warn!("Skipping batch entry without url");
                    None
                }
            })
            .enumerate()
            .map(|(index, (url, kind, name))| {
                let kind = match kind.as_deref() {
                    Some(declared) => kind_from_declared(declared, &url),
                    None => kind_from_url(&url),
                };
                MediaRequest {
                    index,
                    url,
                    kind,
                    name,
                }
            })
            .collect();

        if requests.is_empty() {
            return Err(BatchError::Empty);
        }

        Ok(Self { requests })
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

fn kind_from_declared(declared: &str, url: &str) -> MediaKind {
    match declared.to_ascii_lowercase().as_str() {
        "video" => MediaKind::Video,
        "image" | "picture" => MediaKind::Image,
        other => {
            warn!("Unknown media type '{}', guessing from url", other);
            kind_from_url(url)
        }
    }
}

/// Lower-cased extension of the last path segment of `url`, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn kind_from_url(url: &str) -> MediaKind {
    match url_extension(url) {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
        _ => MediaKind::Image,
    }
}

/// File extension to store a download under: the url's own when it is a known media
/// extension of the right kind, otherwise a fixed default per kind.
pub fn storage_extension(url: &str, kind: MediaKind) -> String {
    let known = match kind {
        MediaKind::Image => IMAGE_EXTENSIONS,
        MediaKind::Video => VIDEO_EXTENSIONS,
    };
    match url_extension(url) {
        Some(ext) if known.contains(&ext.as_str()) => ext,
        _ => match kind {
            MediaKind::Image => "jpg".to_string(),
            MediaKind::Video => "mp4".to_string(),
        },
    }
}
