use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{CharacterId, Language, LearnerId, QuestionId, SessionId, TagName};

/// Filters a session applies to every question request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilters {
    pub tags: BTreeSet<TagName>,
    pub character_id: CharacterId,
    pub language: Language,
}

impl SessionFilters {
    #[must_use]
    pub fn new(character_id: CharacterId, language: Language) -> Self {
        Self {
            tags: BTreeSet::new(),
            character_id,
            language,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagName>) -> Self {
        self.tags.extend(tags);
        self
    }
}

/// Where a session's questions may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Static bank only; exhausting it ends the session.
    OfflineOnly,
    /// Static bank first, generated questions once the filtered bank runs dry.
    #[default]
    StaticFirst,
    /// Every question is generated.
    GenerativeOnly,
}

impl ContentMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentMode::OfflineOnly => "offline_only",
            ContentMode::StaticFirst => "static_first",
            ContentMode::GenerativeOnly => "generative_only",
        }
    }

    #[must_use]
    pub fn allows_generation(self) -> bool {
        !matches!(self, ContentMode::OfflineOnly)
    }

    #[must_use]
    pub fn uses_bank(self) -> bool {
        !matches!(self, ContentMode::GenerativeOnly)
    }
}

impl std::str::FromStr for ContentMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "offline" | "offline_only" => Ok(ContentMode::OfflineOnly),
            "static_first" | "mixed" => Ok(ContentMode::StaticFirst),
            "generative" | "generative_only" | "ai" => Ok(ContentMode::GenerativeOnly),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown content mode: {0}")]
pub struct ParseModeError(pub String);

/// How the next bank question is chosen among the remaining candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "seed")]
pub enum QuestionOrder {
    #[default]
    LowestId,
    /// Uniform pick driven by a per-session RNG seeded with this value.
    Seeded(u64),
}

/// Running tally of answered questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub correct: u32,
    pub total: u32,
}

impl Score {
    #[must_use]
    pub fn record(self, correct: bool) -> Self {
        Self {
            correct: self.correct.saturating_add(u32::from(correct)),
            total: self.total.saturating_add(1),
        }
    }

    /// Fraction answered correctly; `None` before the first answer.
    #[must_use]
    pub fn ratio(self) -> Option<f64> {
        (self.total > 0).then(|| f64::from(self.correct) / f64::from(self.total))
    }

    /// Rounded percentage, `0` before the first answer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent(self) -> u32 {
        // ratio is within [0, 1]
        self.ratio().map_or(0, |r| (r * 100.0).round() as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The configured session length was reached.
    Completed,
    /// No candidates remain and generation is not allowed or failed.
    Exhausted,
    /// The caller ended the session.
    EndedByCaller,
}

impl EndReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::Exhausted => "exhausted",
            EndReason::EndedByCaller => "ended_by_caller",
        }
    }
}

impl std::str::FromStr for EndReason {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(EndReason::Completed),
            "exhausted" => Ok(EndReason::Exhausted),
            "ended_by_caller" => Ok(EndReason::EndedByCaller),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SessionStatus {
    Active,
    Ended(EndReason),
}

impl SessionStatus {
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

/// Serializable view of a live session, suitable for external persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub learner_id: LearnerId,
    pub filters: SessionFilters,
    pub mode: ContentMode,
    pub order: QuestionOrder,
    pub session_length: Option<u32>,
    pub answered_ids: BTreeSet<QuestionId>,
    pub score: Score,
    pub current_question_id: Option<QuestionId>,
    pub current_answered: bool,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

//
// ─── SESSION SUMMARY ───────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("ended_at is before started_at")]
    InvalidTimeRange,

    #[error("correct answers ({correct}) exceed total answers ({total})")]
    CountMismatch { correct: u32, total: u32 },
}

/// Aggregate record of a finished session, kept in learning history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    session_id: SessionId,
    learner_id: LearnerId,
    character_id: CharacterId,
    mode: ContentMode,
    score: Score,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    reason: EndReason,
}

impl SessionSummary {
    /// Build a summary, checking that the time range and counts line up.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `ended_at` precedes `started_at`,
    /// and `SessionSummaryError::CountMismatch` if more answers are correct than given.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        learner_id: LearnerId,
        character_id: CharacterId,
        mode: ContentMode,
        score: Score,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        reason: EndReason,
    ) -> Result<Self, SessionSummaryError> {
        if ended_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        if score.correct > score.total {
            return Err(SessionSummaryError::CountMismatch {
                correct: score.correct,
                total: score.total,
            });
        }
        Ok(Self {
            session_id,
            learner_id,
            character_id,
            mode,
            score,
            started_at,
            ended_at,
            reason,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    #[must_use]
    pub fn character_id(&self) -> &CharacterId {
        &self.character_id
    }

    #[must_use]
    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    #[must_use]
    pub fn score(&self) -> Score {
        self.score
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    #[must_use]
    pub fn reason(&self) -> EndReason {
        self.reason
    }
}
