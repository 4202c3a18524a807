use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration. Every section is optional.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Raw bytes above this size are dropped once a file is finalized.
    #[serde(default = "default_max_preview_bytes")]
    pub max_preview_bytes: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_preview_bytes: default_max_preview_bytes(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_preview_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_preview_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub clear_conversation_on_ingest: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clear_conversation_on_ingest: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResponderConfig {
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_excerpt_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_url")]
    pub url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: default_url(),
            api_key_env: default_api_key_env(),
            language: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "whisper-1".to_string()
}
fn default_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe() -> String {
    "ffprobe".to_string()
}
fn default_sample_rate() -> u32 {
    16_000
}

impl TranscriptionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.ingest.preview_chars == 0 {
            anyhow::bail!("ingest.preview_chars must be > 0");
        }
        if self.responder.excerpt_chars == 0 {
            anyhow::bail!("responder.excerpt_chars must be > 0");
        }
        if self.transcription.timeout_secs == 0 {
            anyhow::bail!("transcription.timeout_secs must be > 0");
        }
        if self.transcription.sample_rate == 0 {
            anyhow::bail!("transcription.sample_rate must be > 0");
        }

        match self.transcription.provider.as_str() {
            "disabled" | "whisper" => {}
            other => anyhow::bail!(
                "Unknown transcription provider: '{}'. Must be disabled or whisper.",
                other
            ),
        }

        if self.transcription.is_enabled() && self.transcription.url.trim().is_empty() {
            anyhow::bail!(
                "transcription.url must be set when provider is '{}'",
                self.transcription.provider
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(toml: &str) -> Result<Config> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("intake.toml");
        std::fs::write(&path, toml).unwrap();
        load_config(&path)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config.ingest.max_preview_bytes, 10_485_760);
        assert_eq!(config.ingest.preview_chars, 1000);
        assert!(config.session.clear_conversation_on_ingest);
        assert_eq!(config.responder.excerpt_chars, 100);
        assert_eq!(config.transcription.provider, "disabled");
        assert_eq!(config.transcription.timeout_secs, 300);
        assert!(config.transcription.language.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = load_str(
            r#"
[session]
clear_conversation_on_ingest = false

[transcription]
provider = "whisper"
language = "en"
timeout_secs = 30
"#,
        )
        .unwrap();
        assert!(!config.session.clear_conversation_on_ingest);
        assert!(config.transcription.is_enabled());
        assert_eq!(config.transcription.language.as_deref(), Some("en"));
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(config.transcription.ffprobe, "ffprobe");
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = load_str("[transcription]\nprovider = \"vosk\"\n").unwrap_err();
        assert!(err.to_string().contains("vosk"));
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(load_str("[ingest]\npreview_chars = 0\n").is_err());
        assert!(load_str("[responder]\nexcerpt_chars = 0\n").is_err());
        assert!(load_str("[transcription]\ntimeout_secs = 0\n").is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Path::new("/nonexistent/intake.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/intake.toml"));
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }
}
