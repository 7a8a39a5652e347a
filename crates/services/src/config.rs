//! Environment-driven settings for assembling the coach.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use coach_core::model::{CharacterId, VoiceId, builtin_characters};

use crate::ai::{ChatCompletionsConfig, ElevenLabsConfig};
use crate::error::ServicesError;
use crate::narration::DEFAULT_SYNTHESIS_TIMEOUT;
use crate::resolver::DEFAULT_GENERATION_TIMEOUT;

pub const DEFAULT_QUESTIONS_DIR: &str = "questions";
const VOICE_PREFIX: &str = "ELEVENLABS_VOICE_ID_";
/// Older deployments configured the practical character's voice under this name.
const LEGACY_OJISAN_VOICE: &str = "ELEVENLABS_VOICE_ID_USER";

#[derive(Debug, Clone, PartialEq)]
pub struct CoachConfig {
    /// `None` disables question and explanation generation.
    pub generation: Option<ChatCompletionsConfig>,
    /// `None` disables narration.
    pub synthesis: Option<ElevenLabsConfig>,
    pub voice_overrides: HashMap<CharacterId, VoiceId>,
    pub generation_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub questions_dir: PathBuf,
    /// SQLite URL for learning history; in-memory when absent.
    pub db_url: Option<String>,
    pub session_length: Option<u32>,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            generation: None,
            synthesis: None,
            voice_overrides: HashMap::new(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            questions_dir: PathBuf::from(DEFAULT_QUESTIONS_DIR),
            db_url: None,
            session_length: None,
        }
    }
}

impl CoachConfig {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError::Config` for malformed numeric values.
    pub fn from_env() -> Result<Self, ServicesError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError::Config` for malformed numeric values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServicesError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut voice_overrides = HashMap::new();
        for character in builtin_characters() {
            let key = format!("{VOICE_PREFIX}{}", character.id().as_str().to_ascii_uppercase());
            let voice = get(&key).or_else(|| {
                (character.id().as_str() == "ojisan")
                    .then(|| get(LEGACY_OJISAN_VOICE))
                    .flatten()
            });
            if let Some(voice) = voice {
                voice_overrides.insert(character.id().clone(), VoiceId::new(voice.trim()));
            }
        }

        Ok(Self {
            generation: ChatCompletionsConfig::from_lookup(&get),
            synthesis: ElevenLabsConfig::from_lookup(&get)?,
            voice_overrides,
            generation_timeout: parse_var(&get, "COACH_GENERATION_TIMEOUT_SECS")?
                .map_or(DEFAULT_GENERATION_TIMEOUT, Duration::from_secs),
            synthesis_timeout: parse_var(&get, "COACH_SYNTHESIS_TIMEOUT_SECS")?
                .map_or(DEFAULT_SYNTHESIS_TIMEOUT, Duration::from_secs),
            questions_dir: get("COACH_QUESTIONS_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_QUESTIONS_DIR), PathBuf::from),
            db_url: get("COACH_DB_URL"),
            session_length: parse_var(&get, "COACH_SESSION_LENGTH")?,
        })
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ServicesError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServicesError::Config { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<CoachConfig, ServicesError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CoachConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, CoachConfig::default());
        assert!(config.generation.is_none());
        assert!(config.synthesis.is_none());
    }

    #[test]
    fn reads_backends_timeouts_and_paths() {
        let config = from_pairs(&[
            ("COACH_AI_API_KEY", "sk"),
            ("COACH_AI_MODEL", "local-model"),
            ("ELEVENLABS_API_KEY", "xi"),
            ("COACH_GENERATION_TIMEOUT_SECS", "5"),
            ("COACH_QUESTIONS_DIR", "/srv/banks"),
            ("COACH_DB_URL", "sqlite://coach.db"),
            ("COACH_SESSION_LENGTH", "12"),
        ])
        .unwrap();
        assert_eq!(config.generation.unwrap().model, "local-model");
        assert!(config.synthesis.is_some());
        assert_eq!(config.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.synthesis_timeout, DEFAULT_SYNTHESIS_TIMEOUT);
        assert_eq!(config.questions_dir, PathBuf::from("/srv/banks"));
        assert_eq!(config.db_url.as_deref(), Some("sqlite://coach.db"));
        assert_eq!(config.session_length, Some(12));
    }

    #[test]
    fn voice_overrides_by_character_with_legacy_name() {
        let config = from_pairs(&[
            ("ELEVENLABS_VOICE_ID_YURI", "yuri-voice"),
            ("ELEVENLABS_VOICE_ID_USER", "uncle-voice"),
        ])
        .unwrap();
        assert_eq!(
            config.voice_overrides.get(&CharacterId::new("yuri")),
            Some(&VoiceId::new("yuri-voice"))
        );
        assert_eq!(
            config.voice_overrides.get(&CharacterId::new("ojisan")),
            Some(&VoiceId::new("uncle-voice"))
        );
        assert_eq!(config.voice_overrides.len(), 2);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = from_pairs(&[("COACH_SESSION_LENGTH", "ten")]).unwrap_err();
        assert!(matches!(
            err,
            ServicesError::Config {
                key: "COACH_SESSION_LENGTH",
                ..
            }
        ));
    }
}
