use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::{CharacterId, QuestionId};
use crate::model::language::Language;
use crate::model::tag::TagName;

/// Smallest option list that still makes a multiple-choice question.
pub const MIN_OPTIONS: usize = 2;

//
// ─── SOURCE ────────────────────────────────────────────────────────────────────
//

/// Where a question or explanation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Pre-authored offline bank.
    Static,
    /// Produced on demand by the generative backend.
    Generated,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Static => "static",
            Source::Generated => "generated",
        }
    }
}

//
// ─── QUESTION TYPES ────────────────────────────────────────────────────────────
//

/// One language variant of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionText {
    pub stem: String,
    /// Options in presentation order; fixed once the question is created.
    pub options: Vec<String>,
    /// Pre-written explanation shipped with the question, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionText {
    #[must_use]
    pub fn new(stem: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            stem: stem.into(),
            options,
            explanation: None,
        }
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub variants: BTreeMap<Language, QuestionText>,
    pub correct_index: usize,
    pub tags: Vec<TagName>,
    pub source: Source,
    pub character_id: CharacterId,
}

impl QuestionDraft {
    /// Check every invariant and produce an immutable `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when a variant is blank, variants disagree on
    /// option count, the correct index is out of bounds, or no tags are set.
    pub fn validate(self) -> Result<Question, QuestionError> {
        if self.id.as_str().trim().is_empty() {
            return Err(QuestionError::EmptyId);
        }
        let mut option_count: Option<usize> = None;
        for (language, text) in &self.variants {
            if text.stem.trim().is_empty() {
                return Err(QuestionError::EmptyStem {
                    language: *language,
                });
            }
            if text.options.len() < MIN_OPTIONS {
                return Err(QuestionError::TooFewOptions {
                    language: *language,
                    count: text.options.len(),
                });
            }
            if let Some(index) = text.options.iter().position(|o| o.trim().is_empty()) {
                return Err(QuestionError::EmptyOption {
                    language: *language,
                    index,
                });
            }
            match option_count {
                None => option_count = Some(text.options.len()),
                Some(expected) if expected != text.options.len() => {
                    return Err(QuestionError::OptionCountMismatch {
                        language: *language,
                        expected,
                        found: text.options.len(),
                    });
                }
                Some(_) => {}
            }
        }
        let Some(count) = option_count else {
            return Err(QuestionError::NoVariants);
        };
        if self.correct_index >= count {
            return Err(QuestionError::CorrectIndexOutOfBounds {
                index: self.correct_index,
                count,
            });
        }
        let tags: BTreeSet<TagName> = self.tags.into_iter().collect();
        if tags.is_empty() {
            return Err(QuestionError::NoTags);
        }

        Ok(Question {
            id: self.id,
            variants: self.variants,
            correct_index: self.correct_index,
            tags,
            source: self.source,
            character_id: self.character_id,
        })
    }
}

/// A validated multiple-choice question.
///
/// Deserialization goes through [`QuestionDraft::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    variants: BTreeMap<Language, QuestionText>,
    correct_index: usize,
    tags: BTreeSet<TagName>,
    source: Source,
    character_id: CharacterId,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self, language: Language) -> Option<&QuestionText> {
        self.variants.get(&language)
    }

    /// Text in the requested language, falling back to any available variant.
    #[must_use]
    pub fn text_or_fallback(&self, language: Language) -> Option<&QuestionText> {
        self.variants
            .get(&language)
            .or_else(|| self.variants.get(&Language::En))
            .or_else(|| self.variants.values().next())
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.variants.keys().copied()
    }

    #[must_use]
    pub fn has_language(&self, language: Language) -> bool {
        self.variants.contains_key(&language)
    }

    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.variants
            .values()
            .next()
            .map_or(0, |text| text.options.len())
    }

    #[must_use]
    pub fn is_correct(&self, selected: usize) -> bool {
        selected == self.correct_index
    }

    #[must_use]
    pub fn correct_option(&self, language: Language) -> Option<&str> {
        self.text(language)
            .and_then(|text| text.options.get(self.correct_index))
            .map(String::as_str)
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<TagName> {
        &self.tags
    }

    /// True when `filter` is empty or shares at least one tag with this question.
    #[must_use]
    pub fn matches_any_tag(&self, filter: &BTreeSet<TagName>) -> bool {
        filter.is_empty() || filter.iter().any(|tag| self.tags.contains(tag))
    }

    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    #[must_use]
    pub fn character_id(&self) -> &CharacterId {
        &self.character_id
    }

    #[must_use]
    pub fn static_explanation(&self, language: Language) -> Option<&str> {
        self.text(language)
            .and_then(|text| text.explanation.as_deref())
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            variants: question.variants,
            correct_index: question.correct_index,
            tags: question.tags.into_iter().collect(),
            source: question.source,
            character_id: question.character_id,
        }
    }
}

/// Letter label for an option index (`0 -> 'A'`).
#[must_use]
pub fn option_label(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .and_then(|i| b'A'.checked_add(i))
        .filter(u8::is_ascii_uppercase)
        .map_or('?', char::from)
}

//
// ─── QUESTION VALIDATION ERRORS ────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question has no language variants")]
    NoVariants,

    #[error("question stem is empty for {language}")]
    EmptyStem { language: Language },

    #[error("question needs at least {MIN_OPTIONS} options, {language} has {count}")]
    TooFewOptions { language: Language, count: usize },

    #[error("option {index} is empty for {language}")]
    EmptyOption { language: Language, index: usize },

    #[error("{language} variant has {found} options, expected {expected}")]
    OptionCountMismatch {
        language: Language,
        expected: usize,
        found: usize,
    },

    #[error("correct option {index} is out of bounds for {count} options")]
    CorrectIndexOutOfBounds { index: usize, count: usize },

    #[error("question must carry at least one tag")]
    NoTags,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options(prefix: &str) -> Vec<String> {
        (1..=4).map(|i| format!("{prefix} {i}")).collect()
    }

    fn draft() -> QuestionDraft {
        let mut variants = BTreeMap::new();
        variants.insert(Language::En, QuestionText::new("Which service stores objects?", options("en")));
        variants.insert(Language::Ja, QuestionText::new("オブジェクトを保存するサービスは？", options("ja")));
        QuestionDraft {
            id: QuestionId::new("yuri-001"),
            variants,
            correct_index: 2,
            tags: vec![TagName::new("S3").unwrap()],
            source: Source::Static,
            character_id: CharacterId::new("yuri"),
        }
    }

    #[test]
    fn valid_draft_validates() {
        let q = draft().validate().unwrap();
        assert_eq!(q.option_count(), 4);
        assert!(q.is_correct(2));
        assert!(!q.is_correct(0));
        assert_eq!(q.correct_option(Language::En), Some("en 3"));
        assert_eq!(q.languages().collect::<Vec<_>>(), vec![Language::Ja, Language::En]);
    }

    #[test]
    fn rejects_out_of_bounds_answer() {
        let mut d = draft();
        d.correct_index = 4;
        assert_eq!(
            d.validate().unwrap_err(),
            QuestionError::CorrectIndexOutOfBounds { index: 4, count: 4 }
        );
    }

    #[test]
    fn rejects_mismatched_variants() {
        let mut d = draft();
        d.variants
            .get_mut(&Language::Ja)
            .unwrap()
            .options
            .pop();
        assert!(matches!(
            d.validate().unwrap_err(),
            QuestionError::OptionCountMismatch { .. }
        ));
    }

    #[test]
    fn rejects_missing_tags_and_variants() {
        let mut d = draft();
        d.tags.clear();
        assert_eq!(d.validate().unwrap_err(), QuestionError::NoTags);

        let mut d = draft();
        d.variants.clear();
        assert_eq!(d.validate().unwrap_err(), QuestionError::NoVariants);
    }

    #[test]
    fn tag_filter_is_any_of() {
        let q = draft().validate().unwrap();
        let mut filter = BTreeSet::new();
        assert!(q.matches_any_tag(&filter));
        filter.insert(TagName::new("IAM").unwrap());
        assert!(!q.matches_any_tag(&filter));
        filter.insert(TagName::new("S3").unwrap());
        assert!(q.matches_any_tag(&filter));
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let q = draft().validate().unwrap();
        let mut json = serde_json::to_value(&q).unwrap();
        let back: Question = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, q);

        json["correct_index"] = serde_json::json!(7);
        assert!(serde_json::from_value::<Question>(json.clone()).is_err());

        json["correct_index"] = serde_json::json!(0);
        json["tags"] = serde_json::json!([]);
        assert!(serde_json::from_value::<Question>(json).is_err());
    }

    #[test]
    fn option_labels() {
        assert_eq!(option_label(0), 'A');
        assert_eq!(option_label(3), 'D');
        assert_eq!(option_label(40), '?');
    }
}
