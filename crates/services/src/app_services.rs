use std::sync::Arc;

use coach_core::model::Question;
use coach_core::{CharacterRegistry, Clock};
use storage::bank;
use storage::repository::{InMemoryQuestionBank, Storage};
use tracing::info;

use crate::ai::{ChatCompletionsGenerator, ElevenLabsSynthesizer};
use crate::backend::{SpeechSynthesizer, TextGenerator};
use crate::config::CoachConfig;
use crate::error::ServicesError;
use crate::explanations::ExplanationCache;
use crate::history::LearningHistoryService;
use crate::narration::{NarrationCache, NarrationDispatcher};
use crate::resolver::ContentResolver;
use crate::sessions::SessionHub;

/// Assembles the coach from configuration and hands out its services.
#[derive(Clone)]
pub struct CoachServices {
    config: CoachConfig,
    characters: Arc<CharacterRegistry>,
    history: LearningHistoryService,
    hub: SessionHub,
    bank_size: usize,
}

impl CoachServices {
    /// Load the question bank from disk and wire the HTTP backends described
    /// by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError` if the bank cannot be loaded or storage fails
    /// to initialize.
    pub async fn from_config(config: CoachConfig, clock: Clock) -> Result<Self, ServicesError> {
        let characters = Arc::new(CharacterRegistry::builtin_with_voices(
            &config.voice_overrides,
        ));
        let questions = bank::load_dir(&config.questions_dir, characters.ids())?;
        let generator = Arc::new(ChatCompletionsGenerator::new(config.generation.clone()));
        let synthesizer = Arc::new(ElevenLabsSynthesizer::new(config.synthesis.clone()));
        Self::assemble(config, clock, characters, questions, generator, synthesizer).await
    }

    /// Build services over explicit questions and backends.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError` for duplicate question ids or storage
    /// initialization failures.
    pub async fn assemble(
        config: CoachConfig,
        clock: Clock,
        characters: Arc<CharacterRegistry>,
        questions: Vec<Question>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self, ServicesError> {
        let explanations = Arc::new(ExplanationCache::new());
        let seeded = explanations.seed_static(&questions);
        let bank_size = questions.len();
        let bank = InMemoryQuestionBank::from_questions(questions)?;

        let storage = match &config.db_url {
            Some(url) => Storage::sqlite(bank, url).await?,
            None => Storage::in_memory(bank),
        };
        info!(
            questions = bank_size,
            explanations = seeded,
            generation = generator.enabled(),
            narration = synthesizer.enabled(),
            persistent_history = config.db_url.is_some(),
            "coach services ready"
        );

        let resolver = ContentResolver::new(
            clock,
            Arc::clone(&storage.questions),
            Arc::clone(&characters),
            generator,
            explanations,
        )
        .with_generation_timeout(config.generation_timeout);
        let narration = NarrationDispatcher::new(clock, synthesizer, Arc::new(NarrationCache::new()))
            .with_timeout(config.synthesis_timeout);
        let history = LearningHistoryService::new(Arc::clone(&storage.history));
        let hub = SessionHub::new(clock, resolver, narration, history.clone());

        Ok(Self {
            config,
            characters,
            history,
            hub,
            bank_size,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    #[must_use]
    pub fn characters(&self) -> Arc<CharacterRegistry> {
        Arc::clone(&self.characters)
    }

    #[must_use]
    pub fn history(&self) -> &LearningHistoryService {
        &self.history
    }

    #[must_use]
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Number of pre-written questions loaded at startup.
    #[must_use]
    pub fn bank_size(&self) -> usize {
        self.bank_size
    }
}
