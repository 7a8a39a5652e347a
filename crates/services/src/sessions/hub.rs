use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use coach_core::Clock;
use coach_core::model::{Explanation, Question, SessionId, SessionSnapshot};
use storage::repository::AnswerRecord;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::progress::SessionProgress;
use super::tracker::{AnswerOutcome, SessionConfig, SessionTracker};
use crate::error::{ResolveError, SessionError};
use crate::history::LearningHistoryService;
use crate::narration::{Narration, NarrationDispatcher};
use crate::resolver::ContentResolver;

const FOCUS_HINT_TAGS: usize = 2;

/// Sessions that ended on their own and are kept for late callers.
pub const DEFAULT_RETAINED_ENDED: usize = 64;

struct LiveSession {
    tracker: SessionTracker,
    summary_recorded: bool,
}

type SessionSlot = Arc<Mutex<LiveSession>>;

#[derive(Default)]
struct SessionTable {
    live: HashMap<SessionId, SessionSlot>,
    ended: HashMap<SessionId, SessionSlot>,
    ended_order: VecDeque<SessionId>,
}

impl SessionTable {
    fn get(&self, id: SessionId) -> Option<SessionSlot> {
        self.live.get(&id).or_else(|| self.ended.get(&id)).cloned()
    }

    /// Moves a live session into the ended set, evicting the oldest beyond
    /// `capacity`.
    fn retire(&mut self, id: SessionId, capacity: usize) {
        let Some(slot) = self.live.remove(&id) else {
            return;
        };
        self.ended.insert(id, slot);
        self.ended_order.push_back(id);
        while self.ended_order.len() > capacity {
            if let Some(oldest) = self.ended_order.pop_front() {
                self.ended.remove(&oldest);
                debug!(session = %oldest, "ended session evicted");
            }
        }
    }

    fn remove(&mut self, id: SessionId) {
        if self.live.remove(&id).is_none() && self.ended.remove(&id).is_some() {
            self.ended_order.retain(|other| *other != id);
        }
    }
}

/// Owns every live session and serializes calls per session.
///
/// Sessions that end on their own move to a bounded ended set: they keep
/// answering `SessionEnded` until the caller ends them through the hub or
/// newer ended sessions push them out.
#[derive(Clone)]
pub struct SessionHub {
    clock: Clock,
    resolver: ContentResolver,
    narration: NarrationDispatcher,
    history: LearningHistoryService,
    sessions: Arc<RwLock<SessionTable>>,
    retained_ended: usize,
}

impl SessionHub {
    #[must_use]
    pub fn new(
        clock: Clock,
        resolver: ContentResolver,
        narration: NarrationDispatcher,
        history: LearningHistoryService,
    ) -> Self {
        Self {
            clock,
            resolver,
            narration,
            history,
            sessions: Arc::new(RwLock::new(SessionTable::default())),
            retained_ended: DEFAULT_RETAINED_ENDED,
        }
    }

    /// How many self-ended sessions stay addressable.
    #[must_use]
    pub fn with_retained_ended(mut self, capacity: usize) -> Self {
        self.retained_ended = capacity;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &ContentResolver {
        &self.resolver
    }

    #[must_use]
    pub fn narration(&self) -> &NarrationDispatcher {
        &self.narration
    }

    #[must_use]
    pub fn history(&self) -> &LearningHistoryService {
        &self.history
    }

    /// Active sessions, not counting ended ones still retained.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    #[must_use]
    pub fn retained_ended_sessions(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ended
            .len()
    }

    fn slot(&self, id: SessionId) -> Result<SessionSlot, SessionError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .ok_or(SessionError::UnknownSession(id))
    }

    /// Start a session and register it.
    ///
    /// # Errors
    ///
    /// - `Resolve(UnknownCharacter)` / `Resolve(UnsupportedLanguage)` for a
    ///   bad character or language.
    /// - `Resolve(NotFound)` when an offline-only session matches no question.
    pub async fn start(&self, config: SessionConfig) -> Result<SessionSnapshot, SessionError> {
        let filters = &config.filters;
        self.resolver
            .character_for(&filters.character_id, filters.language)?;

        if !config.mode.allows_generation()
            && self
                .resolver
                .remaining_in_bank(filters, &BTreeSet::new())
                .await?
                == 0
        {
            return Err(ResolveError::NotFound.into());
        }

        let focus_hint = if filters.tags.is_empty() && config.mode.allows_generation() {
            self.history
                .suggested_tags(&config.learner_id, FOCUS_HINT_TAGS)
                .await
                .unwrap_or_else(|e| {
                    warn!(learner = %config.learner_id, error = %e, "could not load focus tags");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let id = SessionId::generate();
        let tracker =
            SessionTracker::start(id, config, self.clock.now()).with_focus_hint(focus_hint);
        let snapshot = tracker.snapshot();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .insert(
                id,
                Arc::new(Mutex::new(LiveSession {
                    tracker,
                    summary_recorded: false,
                })),
            );
        Ok(snapshot)
    }

    /// # Errors
    ///
    /// `UnknownSession`, or whatever `SessionTracker::advance` returns.
    pub async fn advance(&self, id: SessionId) -> Result<Question, SessionError> {
        let slot = self.slot(id)?;
        let mut live = slot.lock().await;
        let result = live
            .tracker
            .advance(&self.resolver, self.clock.now())
            .await
            .cloned();
        self.settle(id, &mut live).await;
        result
    }

    /// Answer the current question and record it in learning history.
    ///
    /// # Errors
    ///
    /// `UnknownSession`, or whatever `SessionTracker::answer` returns.
    pub async fn answer(&self, id: SessionId, selected: usize) -> Result<AnswerOutcome, SessionError> {
        let slot = self.slot(id)?;
        let mut live = slot.lock().await;
        let now = self.clock.now();
        let outcome = live.tracker.answer(selected, now)?;

        let config = live.tracker.config();
        let record = AnswerRecord {
            learner_id: config.learner_id.clone(),
            question_id: outcome.question_id.clone(),
            character_id: config.filters.character_id.clone(),
            tags: outcome.tags.clone(),
            correct: outcome.correct,
            language: config.filters.language,
            mode: config.mode,
            source: outcome.source,
            answered_at: now,
        };
        self.history.record_answer(&record).await;
        self.settle(id, &mut live).await;
        Ok(outcome)
    }

    /// Explanation of the session's current question in its character's voice.
    ///
    /// # Errors
    ///
    /// `UnknownSession`, `NoActiveQuestion` before the first `advance`, or
    /// `Resolve(GenerationUnavailable)`.
    pub async fn explanation(&self, id: SessionId) -> Result<Explanation, SessionError> {
        let slot = self.slot(id)?;
        let live = slot.lock().await;
        let tracker = &live.tracker;
        let question = tracker
            .current_question()
            .ok_or(SessionError::NoActiveQuestion)?;
        let filters = tracker.filters();
        Ok(self
            .resolver
            .explanation_for(question, &filters.character_id, filters.language)
            .await?)
    }

    /// Speak `text` in the session character's voice.
    ///
    /// The session lock is released before synthesis starts.
    ///
    /// # Errors
    ///
    /// `UnknownSession` or `Narration(..)`.
    pub async fn narrate(&self, id: SessionId, text: &str) -> Result<Narration, SessionError> {
        let filters = {
            let slot = self.slot(id)?;
            let live = slot.lock().await;
            live.tracker.filters().clone()
        };
        let character = self
            .resolver
            .character_for(&filters.character_id, filters.language)?;
        Ok(self
            .narration
            .narrate_as(text, filters.language, character)
            .await?)
    }

    /// # Errors
    ///
    /// `UnknownSession`.
    pub async fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, SessionError> {
        let slot = self.slot(id)?;
        let live = slot.lock().await;
        Ok(live.tracker.snapshot())
    }

    /// # Errors
    ///
    /// `UnknownSession`.
    pub async fn progress(&self, id: SessionId) -> Result<SessionProgress, SessionError> {
        let slot = self.slot(id)?;
        let live = slot.lock().await;
        Ok(live.tracker.progress())
    }

    /// End the session, persist its summary and forget it.
    ///
    /// # Errors
    ///
    /// `UnknownSession`.
    pub async fn end(&self, id: SessionId) -> Result<SessionSnapshot, SessionError> {
        let slot = self.slot(id)?;
        let snapshot = {
            let mut live = slot.lock().await;
            let snapshot = live.tracker.end(self.clock.now());
            self.record_summary_if_ended(&mut live).await;
            snapshot
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        debug!(session = %id, "session released");
        Ok(snapshot)
    }

    /// Persists the summary of a session that just ended and retires it.
    async fn settle(&self, id: SessionId, live: &mut LiveSession) {
        if live.tracker.is_active() || live.summary_recorded {
            return;
        }
        self.record_summary_if_ended(live).await;
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retire(id, self.retained_ended);
    }

    async fn record_summary_if_ended(&self, live: &mut LiveSession) {
        if live.summary_recorded {
            return;
        }
        match live.tracker.summary() {
            Ok(Some(summary)) => {
                self.history.record_session(&summary).await;
                live.summary_recorded = true;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(session = %live.tracker.id(), error = %e, "could not build session summary");
                live.summary_recorded = true;
            }
        }
    }
}
