//! Typed failures for extraction, transcription, and preview.
//!
//! Every per-file failure is an [`ExtractionError`]. The ingestion registry
//! records it on the file's record and moves on; nothing here aborts a batch.

use serde::Serialize;
use thiserror::Error;

use crate::models::{FileFormat, FileStatus};

/// Why a single file could not be turned into text.
///
/// | Variant | Retry by resubmission? |
/// |---------|------------------------|
/// | [`UnsupportedFormat`](ExtractionError::UnsupportedFormat) | no |
/// | [`EmptyContent`](ExtractionError::EmptyContent) | no |
/// | [`NoAudioTrack`](ExtractionError::NoAudioTrack) | no |
/// | [`Transcription`](ExtractionError::Transcription) | yes |
/// | [`MalformedInput`](ExtractionError::MalformedInput) | no |
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExtractionError {
    /// The filename's extension is not one of the supported formats.
    #[error("unsupported file type: '{0}'")]
    UnsupportedFormat(String),

    /// The extractor ran but produced only whitespace.
    #[error("no text content extracted from {0}")]
    EmptyContent(FileFormat),

    /// A video container without any audio stream.
    #[error("no audio found in video file")]
    NoAudioTrack,

    /// The speech backend (or demuxer tooling) failed, was unavailable, or timed out.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// The bytes do not parse as the declared format.
    #[error("{format} processing error: {message}")]
    MalformedInput { format: FileFormat, message: String },
}

/// Discriminant of [`ExtractionError`], for callers deciding retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    EmptyContent,
    NoAudioTrack,
    Transcription,
    MalformedInput,
}

impl ExtractionError {
    pub fn malformed(format: FileFormat, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            format,
            message: message.into(),
        }
    }

    pub fn transcription(message: impl Into<String>) -> Self {
        Self::Transcription(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::EmptyContent(_) => ErrorKind::EmptyContent,
            Self::NoAudioTrack => ErrorKind::NoAudioTrack,
            Self::Transcription(_) => ErrorKind::Transcription,
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
        }
    }

    /// Only backend failures can succeed on a second attempt with the same bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transcription(_))
    }
}

/// Failure to build a preview from registry state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    /// Unknown filename, or its raw bytes were evicted.
    #[error("file preview not available: {0}")]
    NotFound(String),

    /// The record exists but holds nothing renderable (no text yet, or failed).
    #[error("no preview for '{filename}' while it is {status}")]
    Unavailable { filename: String, status: FileStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transcription_is_retryable() {
        assert!(ExtractionError::transcription("503").is_retryable());
        assert!(!ExtractionError::NoAudioTrack.is_retryable());
        assert!(!ExtractionError::EmptyContent(FileFormat::Pdf).is_retryable());
        assert!(!ExtractionError::malformed(FileFormat::Docx, "bad zip").is_retryable());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = ExtractionError::UnsupportedFormat("xlsx".into());
        assert_eq!(err.to_string(), "unsupported file type: 'xlsx'");
        let err = ExtractionError::EmptyContent(FileFormat::Pptx);
        assert_eq!(err.to_string(), "no text content extracted from PPTX");
        let err = ExtractionError::malformed(FileFormat::Pdf, "invalid file header");
        assert_eq!(err.to_string(), "PDF processing error: invalid file header");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(ExtractionError::NoAudioTrack).unwrap();
        assert_eq!(json["kind"], "no_audio_track");
        let json = serde_json::to_value(ExtractionError::transcription("timeout")).unwrap();
        assert_eq!(json["kind"], "transcription");
        assert_eq!(json["detail"], "timeout");
    }
}
