//! Audio and video transcription.
//!
//! [`Transcriber`] turns media bytes into text in two stages: an
//! [`AudioDemuxer`] isolates the audio track of a video, then a
//! [`SpeechBackend`] recognizes it. The whole call is bounded by
//! `transcription.timeout_secs`; scratch files live in a [`tempfile::TempDir`]
//! dropped on every path, and child processes are killed if the call is
//! abandoned.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::error::ExtractionError;
use crate::extract::require_text;
use crate::models::FileFormat;
use crate::speech::{create_backend, AudioClip, SpeechBackend};

/// Splits the audio track out of a video container.
#[async_trait]
pub trait AudioDemuxer: Send + Sync {
    /// `Ok(None)` when the container has no audio stream.
    async fn extract_audio(&self, video: &[u8]) -> Result<Option<AudioClip>, ExtractionError>;
}

/// Demuxer backed by the `ffprobe` and `ffmpeg` binaries.
pub struct FfmpegDemuxer {
    ffmpeg: String,
    ffprobe: String,
    sample_rate: u32,
}

impl FfmpegDemuxer {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            sample_rate,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(&config.ffmpeg, &config.ffprobe, config.sample_rate)
    }

    async fn has_audio_stream(&self, input: &Path) -> Result<bool, ExtractionError> {
        let probe = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ])
            .arg(input)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| tool_unavailable(&self.ffprobe, e))?;

        if !probe.status.success() {
            let stderr = String::from_utf8_lossy(&probe.stderr);
            return Err(ExtractionError::malformed(
                FileFormat::Mp4,
                first_line_or(&stderr, "not a readable video container"),
            ));
        }
        Ok(!String::from_utf8_lossy(&probe.stdout).trim().is_empty())
    }
}

#[async_trait]
impl AudioDemuxer for FfmpegDemuxer {
    async fn extract_audio(&self, video: &[u8]) -> Result<Option<AudioClip>, ExtractionError> {
        let scratch = tempfile::TempDir::new()
            .map_err(|e| ExtractionError::transcription(format!("scratch directory: {}", e)))?;
        let input = scratch.path().join("input.mp4");
        let output = scratch.path().join("audio.wav");
        tokio::fs::write(&input, video)
            .await
            .map_err(|e| ExtractionError::transcription(format!("scratch write: {}", e)))?;

        if !self.has_audio_stream(&input).await? {
            return Ok(None);
        }

        let run = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-i"])
            .arg(&input)
            .args(["-vn", "-ac", "1", "-ar"])
            .arg(self.sample_rate.to_string())
            .args(["-f", "wav"])
            .arg(&output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| tool_unavailable(&self.ffmpeg, e))?;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            return Err(ExtractionError::transcription(format!(
                "audio extraction failed: {}",
                first_line_or(&stderr, "ffmpeg exited with an error")
            )));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| ExtractionError::transcription(format!("reading extracted audio: {}", e)))?;
        debug!(bytes = bytes.len(), "extracted audio track");
        Ok(Some(AudioClip::new(bytes, FileFormat::Wav)))
    }
}

fn tool_unavailable(tool: &str, e: std::io::Error) -> ExtractionError {
    ExtractionError::transcription(format!("could not run {}: {}", tool, e))
}

fn first_line_or(text: &str, fallback: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Media-to-text adapter: demux (video only), recognize, time-box.
#[derive(Clone)]
pub struct Transcriber {
    demuxer: Arc<dyn AudioDemuxer>,
    backend: Arc<dyn SpeechBackend>,
    timeout: Duration,
}

impl Transcriber {
    pub fn new(
        demuxer: Arc<dyn AudioDemuxer>,
        backend: Arc<dyn SpeechBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            demuxer,
            backend,
            timeout,
        }
    }

    /// ffmpeg demuxer plus the configured speech backend.
    pub fn from_config(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let backend: Arc<dyn SpeechBackend> = Arc::from(create_backend(config)?);
        Ok(Self::new(
            Arc::new(FfmpegDemuxer::from_config(config)),
            backend,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub async fn video_to_text(&self, video: &[u8]) -> Result<String, ExtractionError> {
        self.bounded(async {
            let clip = self
                .demuxer
                .extract_audio(video)
                .await?
                .ok_or(ExtractionError::NoAudioTrack)?;
            self.recognize(&clip, FileFormat::Mp4).await
        })
        .await
    }

    pub async fn audio_to_text(
        &self,
        audio: &[u8],
        format: FileFormat,
    ) -> Result<String, ExtractionError> {
        self.bounded(async {
            let clip = AudioClip::new(audio.to_vec(), format);
            self.recognize(&clip, format).await
        })
        .await
    }

    async fn recognize(
        &self,
        clip: &AudioClip,
        source: FileFormat,
    ) -> Result<String, ExtractionError> {
        let text = self.backend.recognize(clip).await.map_err(|e| {
            warn!(backend = self.backend.name(), error = %e, "speech recognition failed");
            ExtractionError::transcription(format!("{:#}", e))
        })?;
        info!(backend = self.backend.name(), chars = text.chars().count(), "transcribed {}", source);
        require_text(text.trim().to_string(), source)
    }

    async fn bounded<F>(&self, work: F) -> Result<String, ExtractionError>
    where
        F: std::future::Future<Output = Result<String, ExtractionError>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "transcription timed out");
                Err(ExtractionError::transcription(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}
