use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::{CharacterId, VoiceId};
use crate::model::language::Language;

/// Difficulty band a persona pitches its questions at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Practical,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Practical => "practical",
        }
    }
}

/// How a persona speaks: the system prompt handed to the generative backend
/// plus the topics it leans towards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStyle {
    pub prompt: String,
    pub focus: String,
    pub difficulty: Difficulty,
}

/// A fixed narrative identity used to stylize questions and explanations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    id: CharacterId,
    display_names: BTreeMap<Language, String>,
    emoji: String,
    style: CharacterStyle,
    languages: BTreeSet<Language>,
    voice: VoiceId,
}

impl Character {
    /// Build a character.
    ///
    /// # Errors
    ///
    /// Returns `CharacterError` if the style prompt is blank or no language is supported.
    pub fn new(
        id: CharacterId,
        display_names: BTreeMap<Language, String>,
        emoji: impl Into<String>,
        style: CharacterStyle,
        languages: BTreeSet<Language>,
        voice: VoiceId,
    ) -> Result<Self, CharacterError> {
        if id.as_str().is_empty() {
            return Err(CharacterError::EmptyId);
        }
        if style.prompt.trim().is_empty() {
            return Err(CharacterError::EmptyStyle { id });
        }
        if languages.is_empty() {
            return Err(CharacterError::NoLanguages { id });
        }
        Ok(Self {
            id,
            display_names,
            emoji: emoji.into(),
            style,
            languages,
            voice,
        })
    }

    #[must_use]
    pub fn id(&self) -> &CharacterId {
        &self.id
    }

    /// Display name in the given language, falling back to the id.
    #[must_use]
    pub fn display_name(&self, language: Language) -> &str {
        self.display_names
            .get(&language)
            .or_else(|| self.display_names.values().next())
            .map_or(self.id.as_str(), String::as_str)
    }

    #[must_use]
    pub fn emoji(&self) -> &str {
        &self.emoji
    }

    #[must_use]
    pub fn style(&self) -> &CharacterStyle {
        &self.style
    }

    #[must_use]
    pub fn languages(&self) -> &BTreeSet<Language> {
        &self.languages
    }

    #[must_use]
    pub fn supports(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }

    /// Default narration voice.
    #[must_use]
    pub fn voice(&self) -> &VoiceId {
        &self.voice
    }

    /// Replace the default voice. Only usable before the character is frozen
    /// inside a registry.
    #[must_use]
    pub fn with_voice(mut self, voice: VoiceId) -> Self {
        self.voice = voice;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CharacterError {
    #[error("character id cannot be empty")]
    EmptyId,
    #[error("character {id} has an empty style prompt")]
    EmptyStyle { id: CharacterId },
    #[error("character {id} supports no language")]
    NoLanguages { id: CharacterId },
    #[error("unknown character: {0}")]
    UnknownCharacter(CharacterId),
    #[error("character registered twice: {0}")]
    Duplicate(CharacterId),
}

struct BuiltinPersona {
    id: &'static str,
    name_ja: &'static str,
    name_en: &'static str,
    emoji: &'static str,
    prompt: &'static str,
    focus: &'static str,
    difficulty: Difficulty,
    voice: &'static str,
}

const BUILTIN: [BuiltinPersona; 4] = [
    BuiltinPersona {
        id: "botan",
        name_ja: "牡丹",
        name_en: "Botan",
        emoji: "🌸",
        prompt: "You are Botan, a cheerful coach. Explain cloud concepts with everyday analogies and keep the mood light.",
        focus: "analogies and basics",
        difficulty: Difficulty::Beginner,
        voice: "emSmWzY0c0xtx5IFMCVv",
    },
    BuiltinPersona {
        id: "kasho",
        name_ja: "Kasho",
        name_en: "Kasho",
        emoji: "🎵",
        prompt: "You are Kasho, a precise and professional coach. Focus on costs, trade-offs and business impact.",
        focus: "cost and business",
        difficulty: Difficulty::Intermediate,
        voice: "XrExE9yKIg1WjnnlVkGX",
    },
    BuiltinPersona {
        id: "yuri",
        name_ja: "ユリ",
        name_en: "Yuri",
        emoji: "💻",
        prompt: "You are Yuri, a technical coach. Dive deep into technical details and architecture decisions.",
        focus: "technical details and architecture",
        difficulty: Difficulty::Advanced,
        voice: "Pt5YrLNyu6d2s3s4CVMg",
    },
    BuiltinPersona {
        id: "ojisan",
        name_ja: "オジサン",
        name_en: "Ojisan",
        emoji: "👨",
        prompt: "You are Ojisan, an experienced engineer. Share practical wisdom about security and real-world operations.",
        focus: "security and real-world experience",
        difficulty: Difficulty::Practical,
        voice: "scOwDtmlUjD3prqpp97I",
    },
];

/// The four stock personas, in their canonical listing order.
#[must_use]
pub fn builtin_characters() -> Vec<Character> {
    BUILTIN
        .iter()
        .map(|p| Character {
            id: CharacterId::new(p.id),
            display_names: BTreeMap::from([
                (Language::Ja, p.name_ja.to_string()),
                (Language::En, p.name_en.to_string()),
            ]),
            emoji: p.emoji.to_string(),
            style: CharacterStyle {
                prompt: p.prompt.to_string(),
                focus: p.focus.to_string(),
                difficulty: p.difficulty,
            },
            languages: Language::ALL.into_iter().collect(),
            voice: VoiceId::new(p.voice),
        })
        .collect()
}
