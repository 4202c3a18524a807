//! Preview payloads built from registry state alone.
//!
//! Nothing here re-runs extraction. A PDF previews as its own bytes, DOCX and
//! PPTX as a text excerpt, and audio/video as playable media.

use std::sync::Arc;

use base64::Engine;
use serde::Serialize;

use crate::error::PreviewError;
use crate::models::{FileFormat, IngestedFile, MediaKind};
use crate::registry::IngestionRegistry;

/// Appended to an excerpt only when text was cut.
pub const TRUNCATION_MARKER: &str = "...";

/// What a caller can render for one file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PreviewPayload {
    /// Inline document rendering.
    Document {
        mime: &'static str,
        #[serde(skip)]
        bytes: Arc<[u8]>,
    },
    Text {
        excerpt: String,
        truncated: bool,
    },
    /// Playback-capable media.
    Media {
        kind: MediaKind,
        mime: &'static str,
        #[serde(skip)]
        bytes: Arc<[u8]>,
    },
}

impl PreviewPayload {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Document { mime, .. } | Self::Media { mime, .. } => *mime,
            Self::Text { .. } => "text/plain",
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Document { bytes, .. } | Self::Media { bytes, .. } => Some(&**bytes),
            Self::Text { .. } => None,
        }
    }

    /// `data:<mime>;base64,...` for byte-carrying payloads.
    pub fn data_url(&self) -> Option<String> {
        self.bytes().map(|bytes| {
            format!(
                "data:{};base64,{}",
                self.mime(),
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )
        })
    }
}

pub struct PreviewResolver {
    preview_chars: usize,
}

impl PreviewResolver {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    pub fn preview(
        &self,
        registry: &IngestionRegistry,
        filename: &str,
    ) -> Result<PreviewPayload, PreviewError> {
        let record = registry
            .get(filename)
            .ok_or_else(|| PreviewError::NotFound(filename.to_string()))?;
        self.render(&record)
    }

    pub fn render(&self, record: &IngestedFile) -> Result<PreviewPayload, PreviewError> {
        let bytes = record
            .raw_bytes
            .clone()
            .ok_or_else(|| PreviewError::NotFound(record.filename.clone()))?;
        let unavailable = || PreviewError::Unavailable {
            filename: record.filename.clone(),
            status: record.status(),
        };
        let format = record.format.ok_or_else(unavailable)?;

        match format {
            FileFormat::Pdf => Ok(PreviewPayload::Document {
                mime: format.mime(),
                bytes,
            }),
            FileFormat::Docx | FileFormat::Pptx => {
                let text = record.extracted_text().ok_or_else(unavailable)?;
                let (excerpt, truncated) = excerpt(text, self.preview_chars);
                Ok(PreviewPayload::Text { excerpt, truncated })
            }
            FileFormat::Mp4 | FileFormat::Mp3 | FileFormat::Wav => {
                let kind = format.media_kind().ok_or_else(unavailable)?;
                Ok(PreviewPayload::Media {
                    kind,
                    mime: format.mime(),
                    bytes,
                })
            }
        }
    }
}

/// Longest prefix of at most `max_chars` characters.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// First `max_chars` characters, with the marker if anything was cut.
fn excerpt(text: &str, max_chars: usize) -> (String, bool) {
    let prefix = char_prefix(text, max_chars);
    if prefix.len() < text.len() {
        (format!("{}{}", prefix, TRUNCATION_MARKER), true)
    } else {
        (prefix.to_string(), false)
    }
}
