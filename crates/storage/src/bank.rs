//! Loads the offline question bank from JSON files on disk.
//!
//! Each character may ship `<character>_questions.json`; characters without
//! their own file share `saa_questions.json` when present.

use coach_core::model::{
    CharacterId, Language, Question, QuestionDraft, QuestionError, QuestionId, QuestionText,
    Source, TagError, TagName,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const FALLBACK_BANK_FILE: &str = "saa_questions.json";
const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BankLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("question {id} in {path}: {reason}")]
    Invalid {
        path: PathBuf,
        id: String,
        reason: String,
    },
}

impl BankLoadError {
    fn invalid(path: &Path, id: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

//
// ─── FILE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: RawId,
    question: Localized,
    options: RawOptions,
    correct: RawCorrect,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    explanation: Option<Localized>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn render(&self) -> String {
        match self {
            RawId::Number(n) => format!("{n:03}"),
            RawId::Text(s) => s.trim().to_string(),
        }
    }
}

/// Either one string for every language or a map keyed by language code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Localized {
    Plain(String),
    PerLanguage(BTreeMap<String, String>),
}

impl Localized {
    fn languages(&self) -> Vec<Language> {
        match self {
            Localized::Plain(_) => Language::ALL.to_vec(),
            Localized::PerLanguage(map) => {
                let mut langs: Vec<Language> =
                    map.keys().filter_map(|k| k.parse().ok()).collect();
                langs.sort();
                langs.dedup();
                langs
            }
        }
    }

    /// Text for `language`, falling back to English and then to any entry.
    fn get(&self, language: Language) -> Option<&str> {
        match self {
            Localized::Plain(text) => Some(text),
            Localized::PerLanguage(map) => map
                .get(language.code())
                .or_else(|| map.get(Language::En.code()))
                .or_else(|| map.values().next())
                .map(String::as_str),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Keyed(BTreeMap<String, Localized>),
    Listed(Vec<Localized>),
}

impl RawOptions {
    /// Options in display order with their letter keys.
    fn ordered(&self) -> Vec<(String, &Localized)> {
        match self {
            RawOptions::Keyed(map) => map
                .iter()
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
                .collect(),
            RawOptions::Listed(list) => list
                .iter()
                .enumerate()
                .map(|(i, v)| (coach_core::model::option_label(i).to_string(), v))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCorrect {
    Index(usize),
    Letter(String),
}

//
// ─── CONVERSION ────────────────────────────────────────────────────────────────
//

fn convert(
    path: &Path,
    character: &CharacterId,
    raw: &RawQuestion,
) -> Result<Question, BankLoadError> {
    let raw_id = raw.id.render();
    let options = raw.options.ordered();

    let correct_index = match &raw.correct {
        RawCorrect::Index(i) => *i,
        RawCorrect::Letter(letter) => {
            let wanted = letter.trim().to_ascii_uppercase();
            options
                .iter()
                .position(|(key, _)| *key == wanted)
                .ok_or_else(|| {
                    BankLoadError::invalid(path, &raw_id, format!("no option keyed {wanted}"))
                })?
        }
    };

    let tag_names: Vec<String> = match (&raw.tags, &raw.category) {
        (Some(tags), _) if !tags.is_empty() => tags.clone(),
        (_, Some(category)) => vec![category.clone()],
        _ => vec![DEFAULT_CATEGORY.to_string()],
    };
    let tags = tag_names
        .into_iter()
        .map(TagName::new)
        .collect::<Result<Vec<_>, TagError>>()
        .map_err(|e| BankLoadError::invalid(path, &raw_id, e))?;

    let mut variants = BTreeMap::new();
    for language in raw.question.languages() {
        let Some(stem) = raw.question.get(language) else {
            continue;
        };
        let option_texts = options
            .iter()
            .map(|(_, text)| text.get(language).unwrap_or_default().to_string())
            .collect();
        let mut text = QuestionText::new(stem, option_texts);
        if let Some(explanation) = raw.explanation.as_ref().and_then(|e| e.get(language)) {
            text = text.with_explanation(explanation);
        }
        variants.insert(language, text);
    }

    QuestionDraft {
        id: QuestionId::new(format!("{character}-{raw_id}")),
        variants,
        correct_index,
        tags,
        source: Source::Static,
        character_id: character.clone(),
    }
    .validate()
    .map_err(|e: QuestionError| BankLoadError::invalid(path, &raw_id, e))
}

fn read_bank(path: &Path) -> Result<BankFile, BankLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BankLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| BankLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse one bank file, assigning every question to `character`.
///
/// # Errors
///
/// Returns `BankLoadError` if the file cannot be read, is not valid JSON,
/// or contains a question that fails validation.
pub fn load_file(path: &Path, character: &CharacterId) -> Result<Vec<Question>, BankLoadError> {
    let bank = read_bank(path)?;
    bank.questions
        .iter()
        .map(|raw| convert(path, character, raw))
        .collect()
}

/// Load the bank for every character from `dir`.
///
/// A missing directory or missing files yield no questions for that character.
///
/// # Errors
///
/// Returns `BankLoadError` for unreadable or malformed files.
pub fn load_dir<'a>(
    dir: &Path,
    characters: impl IntoIterator<Item = &'a CharacterId>,
) -> Result<Vec<Question>, BankLoadError> {
    let fallback = dir.join(FALLBACK_BANK_FILE);
    let mut out = Vec::new();

    for character in characters {
        let own = dir.join(format!("{character}_questions.json"));
        let path = if own.is_file() {
            own
        } else if fallback.is_file() {
            fallback.clone()
        } else {
            debug!(character = %character, dir = %dir.display(), "no question bank file");
            continue;
        };
        let questions = load_file(&path, character)?;
        info!(
            character = %character,
            file = %path.display(),
            count = questions.len(),
            "loaded question bank"
        );
        out.extend(questions);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const YURI_BANK: &str = r#"{
        "questions": [
            {
                "id": 1,
                "category": "S3",
                "question": {"ja": "S3とは?", "en": "What is S3?"},
                "options": {
                    "B": {"ja": "ブロック", "en": "Block storage"},
                    "A": {"ja": "オブジェクト", "en": "Object storage"}
                },
                "correct": "A",
                "explanation": {"ja": "S3はオブジェクト", "en": "S3 stores objects"}
            },
            {
                "id": "vpc-2",
                "tags": ["VPC", "EC2"],
                "question": "Which spans AZs?",
                "options": ["Subnet", "VPC", "ENI"],
                "correct": 1
            }
        ]
    }"#;

    #[test]
    fn parses_keyed_and_listed_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yuri_questions.json");
        fs::write(&path, YURI_BANK).unwrap();

        let yuri = CharacterId::new("yuri");
        let questions = load_file(&path, &yuri).unwrap();
        assert_eq!(questions.len(), 2);

        let first = &questions[0];
        assert_eq!(first.id().as_str(), "yuri-001");
        assert_eq!(first.correct_index(), 0);
        assert_eq!(first.correct_option(Language::En), Some("Object storage"));
        assert_eq!(first.static_explanation(Language::Ja), Some("S3はオブジェクト"));
        assert_eq!(first.tags().iter().next().unwrap().as_str(), "S3");

        let second = &questions[1];
        assert_eq!(second.id().as_str(), "yuri-vpc-2");
        assert!(second.has_language(Language::Ja) && second.has_language(Language::En));
        assert_eq!(second.correct_option(Language::Ja), Some("VPC"));
        assert_eq!(second.tags().len(), 2);
    }

    #[test]
    fn characters_without_a_file_share_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("yuri_questions.json"), YURI_BANK).unwrap();
        fs::write(
            dir.path().join(FALLBACK_BANK_FILE),
            r#"{"questions":[{"id":7,"question":"Q?","options":["a","b"],"correct":"B"}]}"#,
        )
        .unwrap();

        let ids = [CharacterId::new("yuri"), CharacterId::new("botan")];
        let questions = load_dir(dir.path(), ids.iter()).unwrap();
        let names: Vec<_> = questions.iter().map(|q| q.id().as_str()).collect();
        assert_eq!(names, ["yuri-001", "yuri-vpc-2", "botan-007"]);
        assert_eq!(questions[2].tags().iter().next().unwrap().as_str(), "General");
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ids = [CharacterId::new("kasho")];
        let questions = load_dir(&dir.path().join("absent"), ids.iter()).unwrap();
        assert!(questions.is_empty());
    }

    #[test]
    fn unknown_correct_letter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"questions":[{"id":1,"question":"Q?","options":["a","b"],"correct":"D"}]}"#,
        )
        .unwrap();
        let err = load_file(&path, &CharacterId::new("yuri")).unwrap_err();
        assert!(matches!(err, BankLoadError::Invalid { .. }));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"questions":[{"id":1,"question":"Q?","options":["a","b"],"correct":5}]}"#,
        )
        .unwrap();
        assert!(load_file(&path, &CharacterId::new("yuri")).is_err());
    }
}
