#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coach_core::model::{
    CharacterId, Language, Question, QuestionDraft, QuestionId, QuestionText, Source, TagName,
    VoiceId,
};
use coach_core::time::fixed_clock;
use coach_core::CharacterRegistry;
use services::backend::{GenerationRequest, SpeechSynthesizer, TextGenerator};
use services::prompts::QUESTION_MAX_TOKENS;
use services::{BackendError, CoachConfig, CoachServices};

/// Text backend that counts calls and answers with canned JSON or prose.
#[derive(Default)]
pub struct StubGenerator {
    pub question_calls: AtomicUsize,
    pub explanation_calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub failure: Option<BackendError>,
    pub question_reply: Option<String>,
}

impl StubGenerator {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn replying_to_questions_with(raw: &str) -> Self {
        Self {
            question_reply: Some(raw.to_string()),
            ..Self::default()
        }
    }

    pub fn questions(&self) -> usize {
        self.question_calls.load(Ordering::SeqCst)
    }

    pub fn explanations(&self) -> usize {
        self.explanation_calls.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.questions() + self.explanations()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let is_question = request.max_tokens == QUESTION_MAX_TOKENS;
        let n = if is_question {
            self.question_calls.fetch_add(1, Ordering::SeqCst)
        } else {
            self.explanation_calls.fetch_add(1, Ordering::SeqCst)
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if let (true, Some(reply)) = (is_question, &self.question_reply) {
            return Ok(reply.clone());
        }
        if is_question {
            Ok(format!(
                "Here you go:\n```json\n{{\"question\": \"Generated question {n}?\", \
                 \"options\": {{\"A\": \"one\", \"B\": \"two\", \"C\": \"three\", \"D\": \"four\"}}, \
                 \"correct\": \"B\", \"tags\": [\"S3\"], \"explanation\": \"Two is right.\"}}\n```"
            ))
        } else {
            Ok(format!("Generated explanation {n}."))
        }
    }
}

/// Speech backend that counts calls and echoes the text as audio.
#[derive(Default)]
pub struct StubSynthesizer {
    pub calls: AtomicUsize,
}

impl StubSynthesizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _language: Language,
        voice: &VoiceId,
    ) -> Result<Bytes, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(format!("{voice}:{text}")))
    }
}

pub fn tag(name: &str) -> TagName {
    TagName::new(name).unwrap()
}

/// An English bank question owned by `character`; option B is correct.
pub fn bank_question(character: &str, raw_id: &str, tags: &[&str]) -> Question {
    QuestionDraft {
        id: QuestionId::new(format!("{character}-{raw_id}")),
        variants: BTreeMap::from([(
            Language::En,
            QuestionText::new(
                format!("Bank question {raw_id}?"),
                vec!["a".into(), "b".into(), "c".into(), "d".into()],
            )
            .with_explanation(format!("Static explanation {raw_id}.")),
        )]),
        correct_index: 1,
        tags: tags.iter().map(|t| tag(t)).collect(),
        source: Source::Static,
        character_id: CharacterId::new(character),
    }
    .validate()
    .unwrap()
}

pub async fn services_with(
    questions: Vec<Question>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: CoachConfig,
) -> CoachServices {
    CoachServices::assemble(
        config,
        fixed_clock(),
        Arc::new(CharacterRegistry::builtin()),
        questions,
        generator,
        synthesizer,
    )
    .await
    .unwrap()
}
