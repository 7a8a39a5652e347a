use async_trait::async_trait;
use bytes::Bytes;
use coach_core::model::{Language, VoiceId};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Serialize;

use crate::backend::SpeechSynthesizer;
use crate::error::{BackendError, ServicesError};

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

#[derive(Clone, Debug, PartialEq)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub stability: f32,
    pub similarity: f32,
    pub style: f32,
}

impl ElevenLabsConfig {
    /// Read `ELEVENLABS_*` settings; `None` without an API key.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError::Config` when a voice setting is not a number.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ServicesError> {
        let Some(api_key) = lookup("ELEVENLABS_API_KEY").filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let setting = |key: &'static str, default: f32| -> Result<f32, ServicesError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ServicesError::Config { key, value: raw }),
            }
        };
        Ok(Some(Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: lookup("ELEVENLABS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            stability: setting("ELEVENLABS_STABILITY", 0.5)?,
            similarity: setting("ELEVENLABS_SIMILARITY", 0.75)?,
            style: setting("ELEVENLABS_STYLE", 0.75)?,
            api_key,
        }))
    }
}

/// Speech synthesis over the ElevenLabs text-to-speech API. Returns MPEG audio.
#[derive(Clone)]
pub struct ElevenLabsSynthesizer {
    client: Client,
    config: Option<ElevenLabsConfig>,
}

impl ElevenLabsSynthesizer {
    #[must_use]
    pub fn new(config: Option<ElevenLabsConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _language: Language,
        voice: &VoiceId,
    ) -> Result<Bytes, BackendError> {
        let config = self.config.as_ref().ok_or(BackendError::Disabled)?;

        let url = format!(
            "{}/text-to-speech/{}",
            config.base_url.trim_end_matches('/'),
            voice
        );
        let payload = SpeechRequest {
            text,
            model_id: &config.model,
            voice_settings: VoiceSettings {
                stability: config.stability,
                similarity_boost: config.similarity,
                style: config.style,
                use_speaker_boost: true,
            },
        };

        let response = self
            .client
            .post(url)
            .header("xi-api-key", &config.api_key)
            .header(ACCEPT, "audio/mpeg")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status().as_u16()));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(audio)
    }

    fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_and_parse() {
        let config = ElevenLabsConfig::from_lookup(|key| match key {
            "ELEVENLABS_API_KEY" => Some("xi".into()),
            "ELEVENLABS_STABILITY" => Some("0.3".into()),
            _ => None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!((config.stability - 0.3).abs() < f32::EPSILON);
        assert!((config.similarity - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn bad_setting_is_a_config_error() {
        let err = ElevenLabsConfig::from_lookup(|key| match key {
            "ELEVENLABS_API_KEY" => Some("xi".into()),
            "ELEVENLABS_STYLE" => Some("loud".into()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ServicesError::Config {
                key: "ELEVENLABS_STYLE",
                ..
            }
        ));
    }

    #[test]
    fn missing_key_disables_synthesis() {
        assert_eq!(ElevenLabsConfig::from_lookup(|_| None).unwrap(), None);
        assert!(!ElevenLabsSynthesizer::new(None).enabled());
    }
}
