//! Core data models for the ingestion pipeline.
//!
//! These types describe the files that flow through the registry: their
//! format, their processing state, and the conversation turns a session keeps
//! alongside the corpus.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::fingerprint::Fingerprint;

/// A supported input format, derived from the filename's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Docx,
    Pptx,
    Mp4,
    Mp3,
    Wav,
}

/// Whether a media format carries pictures or only sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl FileFormat {
    pub const ALL: [FileFormat; 6] = [
        FileFormat::Pdf,
        FileFormat::Docx,
        FileFormat::Pptx,
        FileFormat::Mp4,
        FileFormat::Mp3,
        FileFormat::Wav,
    ];

    /// Case-insensitive lookup of a bare extension (no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "mp4" => Some(Self::Mp4),
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }

    /// Resolve a filename's format, or fail naming the offending extension.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let ext = file_extension(filename);
        Self::from_extension(&ext).ok_or(ExtractionError::UnsupportedFormat(ext))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Mp4 => "video/mp4",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }

    /// `Some` for formats that go through transcription instead of parsing.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Mp4 => Some(MediaKind::Video),
            Self::Mp3 | Self::Wav => Some(MediaKind::Audio),
            Self::Pdf | Self::Docx | Self::Pptx => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.extension().to_ascii_uppercase())
    }
}

/// Lower-cased text after the last `.` of a filename; empty when there is none.
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Flat status view of a [`FileState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Processing state of one file. Text and error can never coexist.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileState {
    Processing {
        started_at: DateTime<Utc>,
    },
    Completed {
        text: String,
        processed_at: DateTime<Utc>,
    },
    Failed {
        error: ExtractionError,
        failed_at: DateTime<Utc>,
    },
}

impl FileState {
    pub fn status(&self) -> FileStatus {
        match self {
            Self::Processing { .. } => FileStatus::Processing,
            Self::Completed { .. } => FileStatus::Completed,
            Self::Failed { .. } => FileStatus::Failed,
        }
    }
}

/// One submitted file and everything the registry knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub filename: String,
    /// Lower-cased trailing extension, kept even when unsupported.
    pub extension: String,
    /// `None` when the extension is not a supported format.
    pub format: Option<FileFormat>,
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    /// Accepted submissions for this filename so far, starting at 1.
    pub attempt: u32,
    pub state: FileState,
    /// Original upload; `None` once evicted.
    #[serde(skip)]
    pub raw_bytes: Option<Arc<[u8]>>,
}

impl IngestedFile {
    pub fn status(&self) -> FileStatus {
        self.state.status()
    }

    pub fn extracted_text(&self) -> Option<&str> {
        match &self.state {
            FileState::Completed { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<&ExtractionError> {
        match &self.state {
            FileState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            FileState::Completed { processed_at, .. } => Some(*processed_at),
            _ => None,
        }
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            FileState::Failed { failed_at, .. } => Some(*failed_at),
            _ => None,
        }
    }

    /// Character count of the extracted text.
    pub fn content_length(&self) -> Option<usize> {
        self.extracted_text().map(|t| t.chars().count())
    }

    pub fn is_terminal(&self) -> bool {
        self.status() != FileStatus::Processing
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }
}

/// Result of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The file was (re)processed and now has a terminal status.
    Accepted,
    /// Same filename, same bytes: nothing changed.
    DuplicateSkipped,
}

/// Per-file line of a batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    pub filename: String,
    pub outcome: Outcome,
    pub status: Option<FileStatus>,
}

/// Record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub total: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}
