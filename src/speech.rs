//! Speech-recognition backends.
//!
//! Defines the [`SpeechBackend`] trait and its implementations:
//! - **[`DisabledBackend`]**: always errors; used when transcription is not configured.
//! - **[`WhisperBackend`]**: calls an OpenAI-compatible `/audio/transcriptions`
//!   endpoint with a multipart upload, retry, and backoff.
//!
//! Use [`create_backend`] to pick one from configuration.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TranscriptionConfig;
use crate::models::FileFormat;

/// An audio payload ready for recognition.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// `Wav` or `Mp3`.
    pub format: FileFormat,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, format: FileFormat) -> Self {
        Self { bytes, format }
    }

    /// Upload name; some servers sniff the codec from the suffix.
    pub fn file_name(&self) -> String {
        format!("audio.{}", self.format.extension())
    }
}

/// A speech-to-text service.
///
/// `recognize` may return an empty string; the caller decides what that means.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, clip: &AudioClip) -> Result<String>;
}

// ============ Disabled Backend ============

pub struct DisabledBackend;

#[async_trait]
impl SpeechBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn recognize(&self, _clip: &AudioClip) -> Result<String> {
        bail!("speech recognition is disabled (set transcription.provider)")
    }
}

// ============ Whisper Backend ============

/// OpenAI-compatible transcription endpoint (`POST {url}/audio/transcriptions`).
pub struct WhisperBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    language: Option<String>,
    api_key: String,
    max_retries: u32,
}

impl WhisperBackend {
    /// # Errors
    ///
    /// Fails if the API-key variable named by `api_key_env` is not set or the
    /// HTTP client cannot be built.
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/audio/transcriptions", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            language: config.language.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    fn form(&self, clip: &AudioClip) -> Result<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(clip.bytes.clone())
            .file_name(clip.file_name())
            .mime_str(clip.format.mime())?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl SpeechBackend for WhisperBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn recognize(&self, clip: &AudioClip) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), "retrying transcription request");
                tokio::time::sleep(delay).await;
            }

            // Multipart forms are consumed by send; rebuild per attempt.
            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .multipart(self.form(clip)?)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_transcription_response(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, attempt, "transient transcription API error");
                        last_err = Some(anyhow::anyhow!(
                            "transcription API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("transcription API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "transcription request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("transcription failed after retries")))
    }
}

/// Pull `text` out of a `{"text": "..."}` response.
fn parse_transcription_response(json: &serde_json::Value) -> Result<String> {
    json.get("text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid transcription response: missing text"))
}

/// Create the [`SpeechBackend`] named by `transcription.provider`.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledBackend`] |
/// | `"whisper"` | [`WhisperBackend`] |
pub fn create_backend(config: &TranscriptionConfig) -> Result<Box<dyn SpeechBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledBackend)),
        "whisper" => Ok(Box::new(WhisperBackend::new(config)?)),
        other => bail!("Unknown transcription provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_backend_errors() {
        let backend = create_backend(&TranscriptionConfig::default()).unwrap();
        assert_eq!(backend.name(), "disabled");
        let clip = AudioClip::new(vec![0; 4], FileFormat::Wav);
        let err = backend.recognize(&clip).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn whisper_requires_api_key() {
        let config = TranscriptionConfig {
            provider: "whisper".into(),
            api_key_env: "DOC_INTAKE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let err = create_backend(&config).err().unwrap();
        assert!(err
            .to_string()
            .contains("DOC_INTAKE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = TranscriptionConfig {
            provider: "vosk".into(),
            ..Default::default()
        };
        assert!(create_backend(&config).is_err());
    }

    #[test]
    fn parses_text_field() {
        let json = serde_json::json!({ "text": "hello world" });
        assert_eq!(parse_transcription_response(&json).unwrap(), "hello world");
        assert!(parse_transcription_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn clip_file_name_carries_codec() {
        assert_eq!(AudioClip::new(vec![], FileFormat::Mp3).file_name(), "audio.mp3");
    }
}
