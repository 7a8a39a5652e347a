//! Prompt assembly for question and explanation generation.

use coach_core::model::{Character, Language, Question, TagName, option_label};

use crate::backend::GenerationRequest;

pub const QUESTION_MAX_TOKENS: u32 = 1500;
pub const EXPLANATION_MAX_TOKENS: u32 = 300;
const QUESTION_TEMPERATURE: f32 = 0.8;
const EXPLANATION_TEMPERATURE: f32 = 0.7;

const ENGLISH_OUTPUT: &str = "IMPORTANT: Generate all output in English. \
The character's personality should still shine through, but the content must be in English.";

const QUESTION_SCHEMA: &str = r#"{"question": "...", "options": {"A": "...", "B": "...", "C": "...", "D": "..."}, "correct": "A", "tags": ["..."], "explanation": "..."}"#;

fn system_prompt(character: &Character, language: Language) -> String {
    let style = character.style();
    let mut system = format!(
        "{}\nDifficulty: {}. Focus: {}.",
        style.prompt.trim(),
        style.difficulty.as_str(),
        style.focus
    );
    if language == Language::En {
        system.push_str("\n\n");
        system.push_str(ENGLISH_OUTPUT);
    }
    system
}

/// Request for one multiple-choice question about `focus`.
#[must_use]
pub fn question_request(
    character: &Character,
    language: Language,
    focus: &[TagName],
) -> GenerationRequest {
    let topics = focus
        .iter()
        .map(TagName::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = Vec::with_capacity(4);
    match language {
        Language::En => {
            if !topics.is_empty() {
                lines.push(format!("Focus on these topics: {topics}"));
            }
            lines.push(
                "Generate one multiple-choice certification question with four options, \
                 the correct option, topic tags and a short explanation, in English."
                    .to_string(),
            );
            lines.push(format!("Output only JSON in this shape: {QUESTION_SCHEMA}"));
        }
        Language::Ja => {
            if !topics.is_empty() {
                lines.push(format!("特に以下のタグに関連する問題を出題してください: {topics}"));
            }
            lines.push(
                "4択の認定試験問題を1問、正解、タグ、短い解説とともに日本語で生成してください。"
                    .to_string(),
            );
            lines.push(format!("必ず次の形のJSONのみを出力してください: {QUESTION_SCHEMA}"));
        }
    }

    GenerationRequest {
        system: system_prompt(character, language),
        prompt: lines.join("\n"),
        language,
        max_tokens: QUESTION_MAX_TOKENS,
        temperature: QUESTION_TEMPERATURE,
    }
}

/// Request for a short in-character explanation of `question`'s answer.
#[must_use]
pub fn explanation_request(
    character: &Character,
    question: &Question,
    language: Language,
) -> GenerationRequest {
    let text = question.text_or_fallback(language);
    let stem = text.map_or("", |t| t.stem.as_str());
    let options = text
        .map(|t| {
            t.options
                .iter()
                .enumerate()
                .map(|(i, option)| format!("{}. {option}", option_label(i)))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let correct = text
        .and_then(|t| t.options.get(question.correct_index()))
        .map(|option| format!("{}. {option}", option_label(question.correct_index())))
        .unwrap_or_default();
    let base = text
        .and_then(|t| t.explanation.as_deref())
        .unwrap_or_default();

    let prompt = match language {
        Language::En => format!(
            "A learner is studying this certification question.\n\n\
             Question: {stem}\nOptions:\n{options}\nCorrect answer: {correct}\n\
             Base explanation: {base}\n\n\
             Explain in 2-3 sentences, in English and in your own voice, why the correct answer is right."
        ),
        Language::Ja => format!(
            "学習者が次の認定試験問題に取り組んでいます。\n\n\
             問題: {stem}\n選択肢:\n{options}\n正解: {correct}\n\
             参考解説: {base}\n\n\
             日本語で、キャラクターらしく2-3文で正解の理由を解説してください。"
        ),
    };

    GenerationRequest {
        system: system_prompt(character, language),
        prompt,
        language,
        max_tokens: EXPLANATION_MAX_TOKENS,
        temperature: EXPLANATION_TEMPERATURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::CharacterRegistry;
    use coach_core::model::{CharacterId, QuestionDraft, QuestionId, QuestionText, Source};
    use std::collections::BTreeMap;

    fn yuri() -> Character {
        CharacterRegistry::builtin()
            .get(&CharacterId::new("yuri"))
            .unwrap()
            .clone()
    }

    #[test]
    fn english_question_prompt_names_topics_and_forces_english() {
        let request = question_request(&yuri(), Language::En, &[TagName::new("S3").unwrap()]);
        assert!(request.prompt.contains("Focus on these topics: S3"));
        assert!(request.system.contains("You are Yuri"));
        assert!(request.system.contains(ENGLISH_OUTPUT));
        assert_eq!(request.max_tokens, QUESTION_MAX_TOKENS);
    }

    #[test]
    fn japanese_prompt_omits_english_instruction() {
        let request = question_request(&yuri(), Language::Ja, &[]);
        assert!(!request.system.contains(ENGLISH_OUTPUT));
        assert!(request.prompt.contains("JSON"));
    }

    #[test]
    fn explanation_prompt_carries_correct_option() {
        let question = QuestionDraft {
            id: QuestionId::new("yuri-001"),
            variants: BTreeMap::from([(
                Language::En,
                QuestionText::new("What is S3?", vec!["Block".into(), "Object".into()])
                    .with_explanation("S3 is object storage."),
            )]),
            correct_index: 1,
            tags: vec![TagName::new("S3").unwrap()],
            source: Source::Static,
            character_id: CharacterId::new("yuri"),
        }
        .validate()
        .unwrap();

        let request = explanation_request(&yuri(), &question, Language::En);
        assert!(request.prompt.contains("Correct answer: B. Object"));
        assert!(request.prompt.contains("Base explanation: S3 is object storage."));
        assert_eq!(request.max_tokens, EXPLANATION_MAX_TOKENS);
    }
}
