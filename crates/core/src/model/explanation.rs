use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CharacterId, Language, QuestionId, Source};

/// Character-voiced explanation of a question's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    pub language: Language,
    pub body: String,
    pub source: Source,
    /// Set only for generated explanations.
    pub generated_at: Option<DateTime<Utc>>,
}

impl Explanation {
    #[must_use]
    pub fn authored(
        question_id: QuestionId,
        character_id: CharacterId,
        language: Language,
        body: impl Into<String>,
    ) -> Self {
        Self {
            question_id,
            character_id,
            language,
            body: body.into(),
            source: Source::Static,
            generated_at: None,
        }
    }

    #[must_use]
    pub fn generated(
        question_id: QuestionId,
        character_id: CharacterId,
        language: Language,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id,
            character_id,
            language,
            body: body.into(),
            source: Source::Generated,
            generated_at: Some(at),
        }
    }

    #[must_use]
    pub fn key(&self) -> ExplanationKey {
        ExplanationKey {
            question_id: self.question_id.clone(),
            character_id: self.character_id.clone(),
            language: self.language,
        }
    }
}

/// The `(question, character, language)` tuple explanations are cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExplanationKey {
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    pub language: Language,
}

impl ExplanationKey {
    #[must_use]
    pub fn new(question_id: QuestionId, character_id: CharacterId, language: Language) -> Self {
        Self {
            question_id,
            character_id,
            language,
        }
    }
}
