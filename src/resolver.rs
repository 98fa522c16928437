//! Document-type resolution and content loading.
//!
//! The resolver decides, from a locator alone (path suffix or declared media
//! type), how a document's bytes will be loaded and handed to OCR. Unknown
//! locators are never rejected: they fall back to a configurable default kind
//! and carry a warning, and OCR gets the chance to fail on them instead.
//!
//! Loading happens later, inside the run, through [`load_content`]. Local
//! paths are read from disk; `http(s)://` locators are downloaded. Either way
//! the bytes are sniffed so that a mislabelled file fails at `content_load`
//! with a useful message instead of deep inside a rasteriser.

use crate::document::{Document, DocumentId};
use crate::error::LoadError;
use crate::status::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// How a document's bytes are interpreted before OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Pdf,
    Image,
    /// Already-machine-readable text; OCR passes it through.
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Image => "image",
            ContentKind::Text => "text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loaded, sniffed document bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub kind: ContentKind,
    pub bytes: Vec<u8>,
}

impl DocumentContent {
    /// Image format detected from magic bytes, if the content is an image.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self.kind {
            ContentKind::Image => image::guess_format(&self.bytes).ok(),
            _ => None,
        }
    }
}

/// Check if the locator looks like a URL.
pub fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Maps locators to content kinds.
#[derive(Debug, Clone)]
pub struct DocumentResolver {
    suffixes: HashMap<String, ContentKind>,
    media_types: HashMap<String, ContentKind>,
    fallback: ContentKind,
}

impl Default for DocumentResolver {
    fn default() -> Self {
        let mut suffixes = HashMap::new();
        suffixes.insert("pdf".to_string(), ContentKind::Pdf);
        for ext in ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"] {
            suffixes.insert(ext.to_string(), ContentKind::Image);
        }
        for ext in ["txt", "text"] {
            suffixes.insert(ext.to_string(), ContentKind::Text);
        }

        let mut media_types = HashMap::new();
        media_types.insert("application/pdf".to_string(), ContentKind::Pdf);
        media_types.insert("image/*".to_string(), ContentKind::Image);
        media_types.insert("text/plain".to_string(), ContentKind::Text);

        Self {
            suffixes,
            media_types,
            fallback: ContentKind::Pdf,
        }
    }
}

impl DocumentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a file suffix (with or without the leading dot) to a kind.
    pub fn register_suffix(&mut self, suffix: &str, kind: ContentKind) -> &mut Self {
        self.suffixes
            .insert(suffix.trim_start_matches('.').to_ascii_lowercase(), kind);
        self
    }

    /// Map a media type (`type/subtype` or `type/*`) to a kind.
    pub fn register_media_type(&mut self, media_type: &str, kind: ContentKind) -> &mut Self {
        self.media_types.insert(media_type.to_ascii_lowercase(), kind);
        self
    }

    pub fn set_fallback(&mut self, kind: ContentKind) -> &mut Self {
        self.fallback = kind;
        self
    }

    pub fn fallback(&self) -> ContentKind {
        self.fallback
    }

    /// Kind for `locator` by suffix, or `None` when no entry matches.
    pub fn kind_for_locator(&self, locator: &str) -> Option<ContentKind> {
        let suffix = locator_suffix(locator)?;
        self.suffixes.get(&suffix).copied()
    }

    /// Kind for a declared media type; parameters (`; charset=…`) are ignored.
    pub fn kind_for_media_type(&self, media_type: &str) -> Option<ContentKind> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if let Some(kind) = self.media_types.get(&essence) {
            return Some(*kind);
        }
        let (top, _) = essence.split_once('/')?;
        self.media_types.get(&format!("{top}/*")).copied()
    }

    /// Build a queued [`Document`] for `locator`.
    pub fn resolve(&self, locator: &str, id: DocumentId) -> Document {
        match self.kind_for_locator(locator) {
            Some(kind) => {
                debug!(%id, locator, %kind, "Resolved document kind");
                Document::new(id, locator, kind)
            }
            None => self.fallback_document(locator, id),
        }
    }

    /// Like [`resolve`](Self::resolve), but a recognised media type takes
    /// precedence over the locator suffix.
    pub fn resolve_with_media_type(&self, locator: &str, id: DocumentId, media_type: &str) -> Document {
        match self.kind_for_media_type(media_type) {
            Some(kind) => {
                debug!(%id, locator, media_type, %kind, "Resolved document kind from media type");
                Document::new(id, locator, kind)
            }
            None => self.resolve(locator, id),
        }
    }

    fn fallback_document(&self, locator: &str, id: DocumentId) -> Document {
        warn!(%id, locator, fallback = %self.fallback, "Unrecognised document type, using fallback");
        let mut doc = Document::new(id, locator, self.fallback);
        doc.mark_kind_guessed();
        doc.push_warning(
            Stage::Resolve,
            format!(
                "unrecognised document type for '{locator}'; treating it as {}",
                self.fallback
            ),
        );
        doc
    }
}

/// Lower-cased extension of the last path segment, ignoring any URL query
/// string or fragment.
fn locator_suffix(locator: &str) -> Option<String> {
    let path = if is_url(locator) {
        locator.split(['?', '#']).next().unwrap_or(locator)
    } else {
        locator
    };
    let last = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Load and check the bytes behind `doc`.
///
/// A recognised kind is enforced: the bytes must look like that kind or the
/// load fails. A guessed kind (resolver fallback) is replaced by whatever the
/// bytes look like; bytes that match nothing go on to OCR under the fallback
/// kind.
pub async fn load_content(doc: &Document, download_timeout_secs: u64) -> Result<DocumentContent, LoadError> {
    let locator = doc.source_locator();
    let bytes = if is_url(locator) {
        download(locator, download_timeout_secs).await?
    } else {
        read_local(locator).await?
    };

    let kind = if doc.kind_is_guessed() {
        let sniffed = sniff_kind(&bytes);
        if sniffed.is_none() {
            warn!(doc = %doc.id(), fallback = %doc.content_kind(), "Content kind not recognised from bytes");
        }
        sniffed.unwrap_or(doc.content_kind())
    } else {
        validate_content(doc.content_kind(), locator, &bytes)?;
        doc.content_kind()
    };
    debug!(doc = %doc.id(), bytes = bytes.len(), kind = %kind, "Loaded content");
    Ok(DocumentContent { kind, bytes })
}

/// Content kind from magic bytes: `%PDF`, then a known image format, then
/// UTF-8 text.
fn sniff_kind(bytes: &[u8]) -> Option<ContentKind> {
    if bytes.starts_with(b"%PDF") {
        Some(ContentKind::Pdf)
    } else if image::guess_format(bytes).is_ok() {
        Some(ContentKind::Image)
    } else if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() {
        Some(ContentKind::Text)
    } else {
        None
    }
}

async fn read_local(locator: &str) -> Result<Vec<u8>, LoadError> {
    let path = PathBuf::from(locator);
    tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => LoadError::PermissionDenied { path },
        _ => LoadError::Io {
            locator: locator.to_string(),
            detail: e.to_string(),
        },
    })
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, LoadError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| LoadError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LoadError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            LoadError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;
    Ok(bytes.to_vec())
}

fn validate_content(kind: ContentKind, locator: &str, bytes: &[u8]) -> Result<(), LoadError> {
    let invalid = |expected: &'static str, detail: String| LoadError::InvalidContent {
        locator: locator.to_string(),
        expected,
        detail,
    };
    match kind {
        ContentKind::Pdf => {
            if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
                let magic = &bytes[..bytes.len().min(4)];
                return Err(invalid("PDF", format!("missing %PDF header (found {magic:?})")));
            }
        }
        ContentKind::Image => {
            image::guess_format(bytes).map_err(|e| invalid("image", e.to_string()))?;
        }
        ContentKind::Text => {
            std::str::from_utf8(bytes).map_err(|e| invalid("UTF-8 text", e.to_string()))?;
        }
    }
    Ok(())
}
