use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coach_core::model::{
    CharacterId, ContentMode, Language, LearnerId, Question, QuestionId, SessionSummary, Source,
    TagName,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── QUESTION STORE ────────────────────────────────────────────────────────────
//

/// Filters applied when asking the store for candidate questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionQuery {
    /// Any-of tag filter; empty matches every tag.
    pub tags: BTreeSet<TagName>,
    pub character: Option<CharacterId>,
    pub language: Language,
    pub exclude: BTreeSet<QuestionId>,
}

impl QuestionQuery {
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self {
            tags: BTreeSet::new(),
            character: None,
            language,
            exclude: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagName>) -> Self {
        self.tags.extend(tags);
        self
    }

    #[must_use]
    pub fn for_character(mut self, character: CharacterId) -> Self {
        self.character = Some(character);
        self
    }

    #[must_use]
    pub fn excluding(mut self, ids: impl IntoIterator<Item = QuestionId>) -> Self {
        self.exclude.extend(ids);
        self
    }
}

/// Read-only access to the offline question bank.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Candidates matching `query`, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when nothing matches and no exclusion
    /// was requested. An exhausted filter with exclusions yields an empty list.
    async fn query(&self, query: &QuestionQuery) -> Result<Vec<Question>, StorageError>;

    /// Number of questions matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    async fn count(&self, query: &QuestionQuery) -> Result<usize, StorageError>;
}

/// Immutable question bank indexed by owning character.
#[derive(Debug, Default)]
pub struct InMemoryQuestionBank {
    questions: BTreeMap<QuestionId, Question>,
    by_character: HashMap<CharacterId, BTreeSet<QuestionId>>,
}

impl InMemoryQuestionBank {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a set of validated questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if two questions share an id.
    pub fn from_questions(questions: Vec<Question>) -> Result<Self, StorageError> {
        let mut bank = Self::default();
        for question in questions {
            let id = question.id().clone();
            if bank.questions.contains_key(&id) {
                return Err(StorageError::Conflict(format!("duplicate question id {id}")));
            }
            bank.by_character
                .entry(question.character_id().clone())
                .or_default()
                .insert(id.clone());
            bank.questions.insert(id, question);
        }
        Ok(bank)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// All questions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.values()
    }

    fn candidate_ids(&self, query: &QuestionQuery) -> BTreeSet<&QuestionId> {
        match &query.character {
            Some(c) => self.by_character.get(c).into_iter().flatten().collect(),
            None => self.questions.keys().collect(),
        }
    }

    fn matching(&self, query: &QuestionQuery) -> Vec<&Question> {
        self.candidate_ids(query)
            .into_iter()
            .filter(|id| !query.exclude.contains(*id))
            .filter_map(|id| self.questions.get(id))
            .filter(|q| q.matches_any_tag(&query.tags))
            .filter(|q| q.has_language(query.language))
            .collect()
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionBank {
    async fn query(&self, query: &QuestionQuery) -> Result<Vec<Question>, StorageError> {
        let found: Vec<Question> = self.matching(query).into_iter().cloned().collect();
        if found.is_empty() && query.exclude.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(found)
    }

    async fn count(&self, query: &QuestionQuery) -> Result<usize, StorageError> {
        Ok(self.matching(query).len())
    }
}

//
// ─── LEARNING HISTORY ──────────────────────────────────────────────────────────
//

/// One recorded answer, kept for weakness analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub learner_id: LearnerId,
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    pub tags: Vec<TagName>,
    pub correct: bool,
    pub language: Language,
    pub mode: ContentMode,
    pub source: Source,
    pub answered_at: DateTime<Utc>,
}

/// Answer totals for one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStat {
    pub tag: TagName,
    pub total: u32,
    pub correct: u32,
}

impl TagStat {
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.total)
        }
    }
}

/// Answer totals for one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterStat {
    pub character_id: CharacterId,
    pub total: u32,
    pub correct: u32,
}

/// Aggregate answer statistics for a learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerTotals {
    pub learner_id: LearnerId,
    pub total: u32,
    pub correct: u32,
    /// Ordered by character id.
    pub by_character: Vec<CharacterStat>,
}

impl LearnerTotals {
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| f64::from(self.correct) / f64::from(self.total))
    }
}

/// Persistence for answers, per-tag totals and finished sessions.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Store an answer and fold it into the per-tag totals.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the answer cannot be stored.
    async fn record_answer(&self, record: &AnswerRecord) -> Result<(), StorageError>;

    /// Per-tag totals for a learner, ordered by tag name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn tag_stats(&self, learner: &LearnerId) -> Result<Vec<TagStat>, StorageError>;

    /// Overall and per-character totals for a learner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn learner_totals(&self, learner: &LearnerId) -> Result<LearnerTotals, StorageError>;

    /// Most recent answers first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn recent_answers(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Append a finished session summary.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session was already recorded.
    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError>;

    /// Most recently ended sessions first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_summaries(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError>;
}

#[derive(Default)]
struct HistoryState {
    answers: Vec<AnswerRecord>,
    summaries: Vec<SessionSummary>,
}

/// In-memory history for tests and sessions without a database.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    state: Arc<Mutex<HistoryState>>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HistoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistory {
    async fn record_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        self.lock()?.answers.push(record.clone());
        Ok(())
    }

    async fn tag_stats(&self, learner: &LearnerId) -> Result<Vec<TagStat>, StorageError> {
        let guard = self.lock()?;
        let mut totals: BTreeMap<TagName, (u32, u32)> = BTreeMap::new();
        for answer in guard.answers.iter().filter(|a| &a.learner_id == learner) {
            for tag in &answer.tags {
                let entry = totals.entry(tag.clone()).or_default();
                entry.0 += 1;
                entry.1 += u32::from(answer.correct);
            }
        }
        Ok(totals
            .into_iter()
            .map(|(tag, (total, correct))| TagStat {
                tag,
                total,
                correct,
            })
            .collect())
    }

    async fn learner_totals(&self, learner: &LearnerId) -> Result<LearnerTotals, StorageError> {
        let guard = self.lock()?;
        let mut total = 0_u32;
        let mut correct = 0_u32;
        let mut per_character: BTreeMap<CharacterId, (u32, u32)> = BTreeMap::new();
        for answer in guard.answers.iter().filter(|a| &a.learner_id == learner) {
            total += 1;
            correct += u32::from(answer.correct);
            let entry = per_character.entry(answer.character_id.clone()).or_default();
            entry.0 += 1;
            entry.1 += u32::from(answer.correct);
        }
        Ok(LearnerTotals {
            learner_id: learner.clone(),
            total,
            correct,
            by_character: per_character
                .into_iter()
                .map(|(character_id, (total, correct))| CharacterStat {
                    character_id,
                    total,
                    correct,
                })
                .collect(),
        })
    }

    async fn recent_answers(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .iter()
            .rev()
            .filter(|a| &a.learner_id == learner)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard
            .summaries
            .iter()
            .any(|s| s.session_id() == summary.session_id())
        {
            return Err(StorageError::Conflict(format!(
                "session {} already recorded",
                summary.session_id()
            )));
        }
        guard.summaries.push(summary.clone());
        Ok(())
    }

    async fn list_summaries(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<SessionSummary> = guard
            .summaries
            .iter()
            .filter(|s| s.learner_id() == learner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.ended_at().cmp(&a.ended_at()));
        found.truncate(limit as usize);
        Ok(found)
    }
}

/// Aggregates the question bank and history behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionStore>,
    pub history: Arc<dyn HistoryRepository>,
}

impl Storage {
    /// In-memory history over the given bank.
    #[must_use]
    pub fn in_memory(bank: InMemoryQuestionBank) -> Self {
        Self {
            questions: Arc::new(bank),
            history: Arc::new(InMemoryHistory::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::model::{QuestionDraft, QuestionText, SessionId};
    use coach_core::time::fixed_now;

    fn tag(name: &str) -> TagName {
        TagName::new(name).unwrap()
    }

    fn question(id: &str, character: &str, tags: &[&str], languages: &[Language]) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            variants: languages
                .iter()
                .map(|lang| {
                    (
                        *lang,
                        QuestionText::new(format!("{id} stem"), vec!["a".into(), "b".into()]),
                    )
                })
                .collect(),
            correct_index: 1,
            tags: tags.iter().map(|t| tag(t)).collect(),
            source: Source::Static,
            character_id: CharacterId::new(character),
        }
        .validate()
        .unwrap()
    }

    fn bank() -> InMemoryQuestionBank {
        InMemoryQuestionBank::from_questions(vec![
            question("q3", "yuri", &["S3"], &[Language::Ja, Language::En]),
            question("q1", "yuri", &["S3", "IAM"], &[Language::Ja, Language::En]),
            question("q2", "botan", &["EC2"], &[Language::Ja]),
            question("q4", "yuri", &["VPC"], &[Language::En]),
        ])
        .unwrap()
    }

    fn ids(questions: &[Question]) -> Vec<&str> {
        questions.iter().map(|q| q.id().as_str()).collect()
    }

    #[tokio::test]
    async fn query_orders_by_id_and_applies_any_of_tags() {
        let bank = bank();
        let query = QuestionQuery::new(Language::Ja).with_tags([tag("S3"), tag("EC2")]);
        let found = bank.query(&query).await.unwrap();
        assert_eq!(ids(&found), ["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn query_filters_character_and_language() {
        let bank = bank();
        let query = QuestionQuery::new(Language::En).for_character(CharacterId::new("yuri"));
        let found = bank.query(&query).await.unwrap();
        assert_eq!(ids(&found), ["q1", "q3", "q4"]);
    }

    #[tokio::test]
    async fn character_and_tag_filters_combine() {
        let bank = bank();
        let query = QuestionQuery::new(Language::En)
            .for_character(CharacterId::new("yuri"))
            .with_tags([tag("VPC"), tag("IAM")]);
        let found = bank.query(&query).await.unwrap();
        assert_eq!(ids(&found), ["q1", "q4"]);
        assert_eq!(bank.count(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_filter_is_empty_not_missing() {
        let bank = bank();
        let query = QuestionQuery::new(Language::Ja)
            .with_tags([tag("S3")])
            .excluding([QuestionId::new("q1"), QuestionId::new("q3")]);
        assert!(bank.query(&query).await.unwrap().is_empty());
        assert_eq!(bank.count(&query).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_match_without_exclusion_is_not_found() {
        let bank = bank();
        let query = QuestionQuery::new(Language::Ja).with_tags([tag("Lambda")]);
        assert!(matches!(
            bank.query(&query).await,
            Err(StorageError::NotFound)
        ));
        let empty = InMemoryQuestionBank::empty();
        assert!(matches!(
            empty.query(&QuestionQuery::new(Language::En)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn duplicate_ids_conflict() {
        let err = InMemoryQuestionBank::from_questions(vec![
            question("q1", "yuri", &["S3"], &[Language::En]),
            question("q1", "kasho", &["S3"], &[Language::En]),
        ])
        .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    fn answer(learner: &str, character: &str, tags: &[&str], correct: bool) -> AnswerRecord {
        AnswerRecord {
            learner_id: LearnerId::new(learner),
            question_id: QuestionId::new("q1"),
            character_id: CharacterId::new(character),
            tags: tags.iter().map(|t| tag(t)).collect(),
            correct,
            language: Language::Ja,
            mode: ContentMode::OfflineOnly,
            source: Source::Static,
            answered_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn history_aggregates_per_tag_and_character() {
        let history = InMemoryHistory::new();
        history.record_answer(&answer("l1", "yuri", &["S3", "IAM"], true)).await.unwrap();
        history.record_answer(&answer("l1", "botan", &["S3"], false)).await.unwrap();
        history.record_answer(&answer("l2", "yuri", &["S3"], true)).await.unwrap();

        let learner = LearnerId::new("l1");
        let stats = history.tag_stats(&learner).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].tag.as_str(), "IAM");
        assert_eq!((stats[1].total, stats[1].correct), (2, 1));

        let totals = history.learner_totals(&learner).await.unwrap();
        assert_eq!((totals.total, totals.correct), (2, 1));
        assert_eq!(totals.by_character[0].character_id.as_str(), "botan");
        assert_eq!(history.recent_answers(&learner, 1).await.unwrap()[0].character_id.as_str(), "botan");
    }

    #[tokio::test]
    async fn summaries_are_unique_per_session() {
        use coach_core::model::{EndReason, Score};
        let history = InMemoryHistory::new();
        let summary = SessionSummary::new(
            SessionId::generate(),
            LearnerId::new("l1"),
            CharacterId::new("yuri"),
            ContentMode::OfflineOnly,
            Score { correct: 1, total: 2 },
            fixed_now(),
            fixed_now(),
            EndReason::Exhausted,
        )
        .unwrap();
        history.append_summary(&summary).await.unwrap();
        assert!(matches!(
            history.append_summary(&summary).await,
            Err(StorageError::Conflict(_))
        ));
        assert_eq!(history.list_summaries(&LearnerId::new("l1"), 10).await.unwrap().len(), 1);
    }
}
