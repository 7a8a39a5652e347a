use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use coach_core::digest::content_digest;
use coach_core::model::{
    Character, CharacterId, ContentMode, Explanation, ExplanationKey, Language, Question,
    QuestionDraft, QuestionId, QuestionText, SessionFilters, Source, TagName,
};
use coach_core::{CharacterRegistry, Clock};
use storage::repository::{QuestionQuery, QuestionStore, StorageError};
use tracing::{debug, info, warn};

use crate::backend::{TextGenerator, with_timeout};
use crate::error::{BackendError, ResolveError};
use crate::explanations::ExplanationCache;
use crate::generated::{GeneratedQuestion, parse_generated_question};
use crate::picker::QuestionPicker;
use crate::prompts;
use crate::single_flight::SingleFlight;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
const GENERATED_FOCUS_TOPICS: usize = 2;
const GENERATED_DIGEST_LEN: usize = 12;

type ExplanationFlights = SingleFlight<ExplanationKey, Result<Explanation, BackendError>>;

/// Everything `next_question` needs to know about the asking session.
#[derive(Debug, Clone, Copy)]
pub struct QuestionRequest<'a> {
    pub filters: &'a SessionFilters,
    pub mode: ContentMode,
    /// Ids the session has already seen.
    pub exclude: &'a BTreeSet<QuestionId>,
    /// Topics to steer generation when the session has no tag filter.
    pub focus_hint: &'a [TagName],
}

/// Single entry point for questions and explanations, whatever their source.
#[derive(Clone)]
pub struct ContentResolver {
    clock: Clock,
    questions: Arc<dyn QuestionStore>,
    characters: Arc<CharacterRegistry>,
    generator: Arc<dyn TextGenerator>,
    explanations: Arc<ExplanationCache>,
    flights: Arc<ExplanationFlights>,
    generation_timeout: Duration,
}

impl ContentResolver {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionStore>,
        characters: Arc<CharacterRegistry>,
        generator: Arc<dyn TextGenerator>,
        explanations: Arc<ExplanationCache>,
    ) -> Self {
        Self {
            clock,
            questions,
            characters,
            generator,
            explanations,
            flights: Arc::new(SingleFlight::new()),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn characters(&self) -> &CharacterRegistry {
        &self.characters
    }

    #[must_use]
    pub fn explanations(&self) -> &ExplanationCache {
        &self.explanations
    }

    /// Resolve the character a session asked for and check it speaks `language`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::UnknownCharacter` or `ResolveError::UnsupportedLanguage`.
    pub fn character_for(
        &self,
        id: &CharacterId,
        language: Language,
    ) -> Result<&Character, ResolveError> {
        let character = self.characters.get(id)?;
        if !character.supports(language) {
            return Err(ResolveError::UnsupportedLanguage {
                character: id.clone(),
                language,
            });
        }
        Ok(character)
    }

    /// Number of bank questions a session with these filters could still see.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Storage` if the store cannot be read.
    pub async fn remaining_in_bank(
        &self,
        filters: &SessionFilters,
        exclude: &BTreeSet<QuestionId>,
    ) -> Result<usize, ResolveError> {
        let query = bank_query(filters, exclude);
        Ok(self.questions.count(&query).await?)
    }

    /// Next question for a session.
    ///
    /// Bank candidates come first unless the mode is generative-only; the
    /// picker chooses among them. When the filtered bank is empty or
    /// exhausted, generation takes over if the mode allows it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if an offline-only session matches no bank question at all.
    /// - `ExhaustedAndUnavailable` if the bank is exhausted and no generation
    ///   fallback exists.
    /// - `GenerationUnavailable` if the backend fails, times out or returns
    ///   something unusable.
    pub async fn next_question(
        &self,
        request: QuestionRequest<'_>,
        picker: &mut QuestionPicker,
    ) -> Result<Question, ResolveError> {
        let filters = request.filters;
        let character = self.character_for(&filters.character_id, filters.language)?;

        if request.mode.uses_bank() {
            let query = bank_query(filters, request.exclude);
            match self.questions.query(&query).await {
                Ok(candidates) => {
                    if let Some(index) = picker.pick(candidates.len()) {
                        if let Some(question) = candidates.into_iter().nth(index) {
                            debug!(question = %question.id(), "serving bank question");
                            return Ok(question);
                        }
                    }
                    if !request.mode.allows_generation() {
                        info!(character = %filters.character_id, "question bank exhausted");
                        return Err(ResolveError::ExhaustedAndUnavailable);
                    }
                }
                Err(StorageError::NotFound) if !request.mode.allows_generation() => {
                    return Err(ResolveError::NotFound);
                }
                Err(StorageError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            debug!(character = %filters.character_id, "bank has no candidates, generating");
        }

        match self.generate_question(character, request, picker).await {
            Err(BackendError::Disabled) if request.mode.uses_bank() => {
                Err(ResolveError::ExhaustedAndUnavailable)
            }
            Err(e) => {
                warn!(error = %e, "question generation failed");
                Err(ResolveError::GenerationUnavailable(e))
            }
            Ok(question) => Ok(question),
        }
    }

    async fn generate_question(
        &self,
        character: &Character,
        request: QuestionRequest<'_>,
        picker: &mut QuestionPicker,
    ) -> Result<Question, BackendError> {
        let filters = request.filters;
        let focus: Vec<TagName> = if !filters.tags.is_empty() {
            filters.tags.iter().cloned().collect()
        } else if !request.focus_hint.is_empty() {
            request.focus_hint.to_vec()
        } else {
            picker.sample_categories(GENERATED_FOCUS_TOPICS)
        };

        let prompt = prompts::question_request(character, filters.language, &focus);
        let raw = with_timeout(self.generation_timeout, self.generator.generate(&prompt)).await?;
        let mut generated = parse_generated_question(&raw, &focus)?;

        // Keep generated questions inside the session's tag filter.
        if !filters.tags.is_empty() && !generated.tags.iter().any(|t| filters.tags.contains(t)) {
            generated.tags.extend(filters.tags.iter().cloned());
        }

        let now = self.clock.now();
        let id = mint_question_id(
            &generated,
            filters.language,
            self.clock.stamp_millis(),
            request.exclude,
        );
        let explanation = generated.explanation.clone();
        let question = QuestionDraft {
            id: id.clone(),
            variants: BTreeMap::from([(
                filters.language,
                QuestionText::new(generated.stem, generated.options)
                    .with_explanation(explanation.clone()),
            )]),
            correct_index: generated.correct_index,
            tags: generated.tags,
            source: Source::Generated,
            character_id: character.id().clone(),
        }
        .validate()
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        self.explanations.insert(Explanation::generated(
            id,
            character.id().clone(),
            filters.language,
            explanation,
            now,
        ));
        info!(question = %question.id(), character = %character.id(), "generated question");
        Ok(question)
    }

    /// Explanation of `question` in `character`'s voice.
    ///
    /// Served from the cache when possible. Concurrent misses for the same
    /// `(question, character, language)` share one backend call.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCharacter` for an unregistered character and
    /// `GenerationUnavailable` when the backend fails or times out.
    pub async fn explanation_for(
        &self,
        question: &Question,
        character_id: &CharacterId,
        language: Language,
    ) -> Result<Explanation, ResolveError> {
        let character = self.characters.get(character_id)?.clone();
        let key = ExplanationKey::new(question.id().clone(), character_id.clone(), language);

        let lookup = || {
            if let Some(hit) = self.explanations.get(&key) {
                debug!(question = %key.question_id, "explanation cache hit");
                return Some(Ok(hit));
            }
            let authored = (question.character_id() == character_id)
                .then(|| question.static_explanation(language))
                .flatten()?;
            let explanation = Explanation::authored(
                key.question_id.clone(),
                key.character_id.clone(),
                language,
                authored,
            );
            self.explanations.insert(explanation.clone());
            Some(Ok(explanation))
        };

        let make = || {
            let generator = Arc::clone(&self.generator);
            let cache = Arc::clone(&self.explanations);
            let clock = self.clock;
            let timeout = self.generation_timeout;
            let question = question.clone();
            async move {
                let request = prompts::explanation_request(&character, &question, language);
                let body = with_timeout(timeout, generator.generate(&request)).await?;
                let body = body.trim();
                if body.is_empty() {
                    return Err(BackendError::EmptyResponse);
                }
                let explanation = Explanation::generated(
                    question.id().clone(),
                    character.id().clone(),
                    language,
                    body,
                    clock.now(),
                );
                cache.insert(explanation.clone());
                Ok(explanation)
            }
        };

        self.flights
            .run(key.clone(), lookup, make)
            .await
            .map_err(|e| {
                warn!(question = %key.question_id, error = %e, "explanation generation failed");
                ResolveError::GenerationUnavailable(e)
            })
    }
}

fn bank_query(filters: &SessionFilters, exclude: &BTreeSet<QuestionId>) -> QuestionQuery {
    QuestionQuery {
        tags: filters.tags.clone(),
        character: Some(filters.character_id.clone()),
        language: filters.language,
        exclude: exclude.clone(),
    }
}

/// `gen-<digest>-<millis>`, suffixed if the session has somehow seen it already.
fn mint_question_id(
    generated: &GeneratedQuestion,
    language: Language,
    stamp_millis: i64,
    exclude: &BTreeSet<QuestionId>,
) -> QuestionId {
    let digest = content_digest(
        std::iter::once(language.code())
            .chain(std::iter::once(generated.stem.as_str()))
            .chain(generated.options.iter().map(String::as_str)),
    );
    let base = format!(
        "gen-{}-{}",
        &digest[..GENERATED_DIGEST_LEN],
        stamp_millis
    );
    let mut id = QuestionId::new(base.clone());
    let mut n = 1;
    while exclude.contains(&id) {
        id = QuestionId::new(format!("{base}-{n}"));
        n += 1;
    }
    id
}
