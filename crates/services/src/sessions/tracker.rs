use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use coach_core::model::{
    ContentMode, EndReason, LearnerId, Question, QuestionId, QuestionOrder, Score, SessionFilters,
    SessionId, SessionSnapshot, SessionStatus, SessionSummary, Source, TagName,
};
use tracing::{debug, info};

use super::progress::SessionProgress;
use crate::error::{ResolveError, SessionError};
use crate::picker::QuestionPicker;
use crate::resolver::{ContentResolver, QuestionRequest};

/// Length applied to generative-only sessions that do not set one.
pub const DEFAULT_GENERATED_SESSION_LENGTH: u32 = 10;

//
// ─── CONFIGURATION ─────────────────────────────────────────────────────────────
//

/// Parameters fixed when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub learner_id: LearnerId,
    pub filters: SessionFilters,
    pub mode: ContentMode,
    pub order: QuestionOrder,
    /// End the session after this many answers.
    pub session_length: Option<u32>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(learner_id: LearnerId, filters: SessionFilters) -> Self {
        Self {
            learner_id,
            filters,
            mode: ContentMode::default(),
            order: QuestionOrder::default(),
            session_length: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ContentMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: QuestionOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_session_length(mut self, length: Option<u32>) -> Self {
        self.session_length = length;
        self
    }

    /// Configured length, or the generative-only default.
    #[must_use]
    pub fn effective_length(&self) -> Option<u32> {
        self.session_length.or(match self.mode {
            ContentMode::GenerativeOnly => Some(DEFAULT_GENERATED_SESSION_LENGTH),
            _ => None,
        })
    }
}

/// What happened when the learner answered the current question.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    pub selected_index: usize,
    pub correct_index: usize,
    pub correct: bool,
    pub tags: Vec<TagName>,
    pub source: Source,
    pub score: Score,
    /// Set when this answer completed the session.
    pub ended: Option<EndReason>,
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Progress of one learner session.
///
/// ACTIVE until the caller ends it, the configured length is reached, or the
/// resolver reports the bank exhausted with no fallback; ENDED is terminal.
#[derive(Debug)]
pub struct SessionTracker {
    id: SessionId,
    config: SessionConfig,
    picker: QuestionPicker,
    focus_hint: Vec<TagName>,
    answered: BTreeSet<QuestionId>,
    score: Score,
    current: Option<Question>,
    current_answered: bool,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl SessionTracker {
    /// Start an ACTIVE session with nothing answered.
    ///
    /// `started_at` should come from the services layer clock.
    #[must_use]
    pub fn start(id: SessionId, config: SessionConfig, started_at: DateTime<Utc>) -> Self {
        let picker = QuestionPicker::new(config.order);
        debug!(session = %id, mode = config.mode.as_str(), "session started");
        Self {
            id,
            config,
            picker,
            focus_hint: Vec::new(),
            answered: BTreeSet::new(),
            score: Score::default(),
            current: None,
            current_answered: false,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
        }
    }

    /// Topics to steer generation towards when no tag filter is set.
    #[must_use]
    pub fn with_focus_hint(mut self, tags: Vec<TagName>) -> Self {
        self.focus_hint = tags;
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn filters(&self) -> &SessionFilters {
        &self.config.filters
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    #[must_use]
    pub fn score(&self) -> Score {
        self.score
    }

    #[must_use]
    pub fn answered_ids(&self) -> &BTreeSet<QuestionId> {
        &self.answered
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let target = self.config.effective_length();
        SessionProgress {
            answered: self.score.total,
            correct: self.score.correct,
            target,
            remaining: target.map(|t| t.saturating_sub(self.score.total)),
            is_complete: !self.is_active(),
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SessionError::SessionEnded)
        }
    }

    fn finish(&mut self, reason: EndReason, at: DateTime<Utc>) {
        if self.is_active() {
            self.status = SessionStatus::Ended(reason);
            self.ended_at = Some(at);
            info!(
                session = %self.id,
                reason = reason.as_str(),
                correct = self.score.correct,
                total = self.score.total,
                "session ended"
            );
        }
    }

    /// Move to the next question.
    ///
    /// An unanswered current question is returned again without a new
    /// selection.
    ///
    /// # Errors
    ///
    /// - `SessionEnded` once the session is ENDED.
    /// - `Resolve(ExhaustedAndUnavailable)` or `Resolve(NotFound)` when no
    ///   question can be served; the session ends as exhausted.
    /// - `Resolve(GenerationUnavailable)` leaves the session ACTIVE so the
    ///   caller may retry.
    pub async fn advance(
        &mut self,
        resolver: &ContentResolver,
        now: DateTime<Utc>,
    ) -> Result<&Question, SessionError> {
        self.ensure_active()?;

        if self.current.is_some() && !self.current_answered {
            return self.current.as_ref().ok_or(SessionError::NoActiveQuestion);
        }

        let request = QuestionRequest {
            filters: &self.config.filters,
            mode: self.config.mode,
            exclude: &self.answered,
            focus_hint: &self.focus_hint,
        };
        match resolver.next_question(request, &mut self.picker).await {
            Ok(question) => {
                debug_assert!(!self.answered.contains(question.id()));
                self.current_answered = false;
                Ok(&*self.current.insert(question))
            }
            Err(e @ (ResolveError::ExhaustedAndUnavailable | ResolveError::NotFound)) => {
                self.finish(EndReason::Exhausted, now);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Answer the current question with the option at `selected`.
    ///
    /// # Errors
    ///
    /// - `SessionEnded` once the session is ENDED.
    /// - `NoActiveQuestion` before `advance` or when the current question is
    ///   already answered.
    /// - `InvalidOption` when `selected` is not an option index; nothing changes.
    pub fn answer(
        &mut self,
        selected: usize,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, SessionError> {
        self.ensure_active()?;
        let question = match (&self.current, self.current_answered) {
            (Some(question), false) => question,
            _ => return Err(SessionError::NoActiveQuestion),
        };
        let option_count = question.option_count();
        if selected >= option_count {
            return Err(SessionError::InvalidOption {
                index: selected,
                option_count,
            });
        }

        let correct = question.is_correct(selected);
        let mut outcome = AnswerOutcome {
            question_id: question.id().clone(),
            selected_index: selected,
            correct_index: question.correct_index(),
            correct,
            tags: question.tags().iter().cloned().collect(),
            source: question.source(),
            score: self.score,
            ended: None,
        };

        self.answered.insert(outcome.question_id.clone());
        self.score = self.score.record(correct);
        self.current_answered = true;
        outcome.score = self.score;

        if self
            .config
            .effective_length()
            .is_some_and(|limit| self.score.total >= limit)
        {
            self.finish(EndReason::Completed, now);
            outcome.ended = Some(EndReason::Completed);
        }

        Ok(outcome)
    }

    /// End the session. Ending an ENDED session changes nothing.
    pub fn end(&mut self, now: DateTime<Utc>) -> SessionSnapshot {
        self.finish(EndReason::EndedByCaller, now);
        self.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            learner_id: self.config.learner_id.clone(),
            filters: self.config.filters.clone(),
            mode: self.config.mode,
            order: self.config.order,
            session_length: self.config.effective_length(),
            answered_ids: self.answered.clone(),
            score: self.score,
            current_question_id: self.current.as_ref().map(|q| q.id().clone()),
            current_answered: self.current_answered,
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Summary for learning history; `None` while ACTIVE.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Summary` if the recorded times are inconsistent.
    pub fn summary(&self) -> Result<Option<SessionSummary>, SessionError> {
        let (SessionStatus::Ended(reason), Some(ended_at)) = (self.status, self.ended_at) else {
            return Ok(None);
        };
        Ok(Some(SessionSummary::new(
            self.id,
            self.config.learner_id.clone(),
            self.config.filters.character_id.clone(),
            self.config.mode,
            self.score,
            self.started_at,
            ended_at,
            reason,
        )?))
    }
}
