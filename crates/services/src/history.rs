//! Learner history: best-effort answer recording and weakness analysis.

use std::cmp::Ordering;
use std::sync::Arc;

use coach_core::model::{LearnerId, SessionSummary, TagName};
use storage::repository::{
    AnswerRecord, CharacterStat, HistoryRepository, InMemoryHistory, StorageError, TagStat,
};
use tracing::{debug, warn};

/// Thresholds used to classify per-tag accuracy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsightPolicy {
    /// Fewer answers than this never classify a tag.
    pub min_answers: u32,
    pub weakness_below: f64,
    pub strength_at_least: f64,
    /// Looser weakness threshold used when suggesting focus tags.
    pub suggestion_below: f64,
    pub limit: usize,
}

impl Default for InsightPolicy {
    fn default() -> Self {
        Self {
            min_answers: 3,
            weakness_below: 0.6,
            strength_at_least: 0.8,
            suggestion_below: 0.7,
            limit: 5,
        }
    }
}

/// Everything known about one learner, for a stats screen.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerOverview {
    pub learner_id: LearnerId,
    pub total: u32,
    pub correct: u32,
    pub accuracy: Option<f64>,
    pub by_character: Vec<CharacterStat>,
    pub weaknesses: Vec<TagStat>,
    pub strengths: Vec<TagStat>,
    pub recent_sessions: Vec<SessionSummary>,
}

/// Tags below `threshold` accuracy with enough answers, weakest first.
///
/// Ties on accuracy put the more practiced tag first.
#[must_use]
pub fn weaknesses_from(
    stats: &[TagStat],
    min_answers: u32,
    threshold: f64,
    limit: usize,
) -> Vec<TagStat> {
    let mut weak: Vec<TagStat> = stats
        .iter()
        .filter(|s| s.total >= min_answers && s.accuracy() < threshold)
        .cloned()
        .collect();
    weak.sort_by(|a, b| {
        a.accuracy()
            .partial_cmp(&b.accuracy())
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.total.cmp(&a.total))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    weak.truncate(limit);
    weak
}

/// Tags at or above `threshold` accuracy with enough answers, strongest first.
#[must_use]
pub fn strengths_from(
    stats: &[TagStat],
    min_answers: u32,
    threshold: f64,
    limit: usize,
) -> Vec<TagStat> {
    let mut strong: Vec<TagStat> = stats
        .iter()
        .filter(|s| s.total >= min_answers && s.accuracy() >= threshold)
        .cloned()
        .collect();
    strong.sort_by(|a, b| {
        b.accuracy()
            .partial_cmp(&a.accuracy())
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.total.cmp(&a.total))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    strong.truncate(limit);
    strong
}

#[derive(Clone)]
pub struct LearningHistoryService {
    history: Arc<dyn HistoryRepository>,
    policy: InsightPolicy,
}

impl LearningHistoryService {
    #[must_use]
    pub fn new(history: Arc<dyn HistoryRepository>) -> Self {
        Self {
            history,
            policy: InsightPolicy::default(),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryHistory::new()))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: InsightPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> InsightPolicy {
        self.policy
    }

    /// Record one answer. Failures are logged and swallowed.
    pub async fn record_answer(&self, record: &AnswerRecord) {
        match self.history.record_answer(record).await {
            Ok(()) => debug!(
                learner = %record.learner_id,
                question = %record.question_id,
                correct = record.correct,
                "answer recorded"
            ),
            Err(e) => warn!(
                learner = %record.learner_id,
                question = %record.question_id,
                error = %e,
                "failed to record answer"
            ),
        }
    }

    /// Append a finished session. Failures are logged and swallowed.
    pub async fn record_session(&self, summary: &SessionSummary) {
        if let Err(e) = self.history.append_summary(summary).await {
            warn!(session = %summary.session_id(), error = %e, "failed to record session summary");
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if history cannot be read.
    pub async fn weaknesses(&self, learner: &LearnerId) -> Result<Vec<TagStat>, StorageError> {
        let stats = self.history.tag_stats(learner).await?;
        let p = self.policy;
        Ok(weaknesses_from(
            &stats,
            p.min_answers,
            p.weakness_below,
            p.limit,
        ))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if history cannot be read.
    pub async fn strengths(&self, learner: &LearnerId) -> Result<Vec<TagStat>, StorageError> {
        let stats = self.history.tag_stats(learner).await?;
        let p = self.policy;
        Ok(strengths_from(
            &stats,
            p.min_answers,
            p.strength_at_least,
            p.limit,
        ))
    }

    /// Up to `count` tags worth practicing next.
    ///
    /// Weak tags under the looser suggestion threshold win; without any, the
    /// least practiced tags are suggested. A learner with no history gets none.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if history cannot be read.
    pub async fn suggested_tags(
        &self,
        learner: &LearnerId,
        count: usize,
    ) -> Result<Vec<TagName>, StorageError> {
        let stats = self.history.tag_stats(learner).await?;
        let weak = weaknesses_from(
            &stats,
            self.policy.min_answers,
            self.policy.suggestion_below,
            count,
        );
        if !weak.is_empty() {
            return Ok(weak.into_iter().map(|s| s.tag).collect());
        }

        let mut least: Vec<&TagStat> = stats.iter().collect();
        least.sort_by(|a, b| a.total.cmp(&b.total).then_with(|| a.tag.cmp(&b.tag)));
        Ok(least.into_iter().take(count).map(|s| s.tag.clone()).collect())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if history cannot be read.
    pub async fn overview(&self, learner: &LearnerId) -> Result<LearnerOverview, StorageError> {
        let totals = self.history.learner_totals(learner).await?;
        let stats = self.history.tag_stats(learner).await?;
        let recent_sessions = self
            .history
            .list_summaries(learner, u32::try_from(self.policy.limit).unwrap_or(u32::MAX))
            .await?;
        let p = self.policy;

        Ok(LearnerOverview {
            learner_id: learner.clone(),
            total: totals.total,
            correct: totals.correct,
            accuracy: totals.accuracy(),
            by_character: totals.by_character,
            weaknesses: weaknesses_from(&stats, p.min_answers, p.weakness_below, p.limit),
            strengths: strengths_from(&stats, p.min_answers, p.strength_at_least, p.limit),
            recent_sessions,
        })
    }
}
