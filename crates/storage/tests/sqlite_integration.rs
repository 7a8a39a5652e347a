use chrono::Duration;
use coach_core::model::{
    CharacterId, ContentMode, EndReason, Language, LearnerId, QuestionId, Score, SessionId,
    SessionSummary, Source, TagName,
};
use coach_core::time::fixed_now;
use storage::repository::{AnswerRecord, HistoryRepository, StorageError};
use storage::sqlite::{LATEST_SCHEMA_VERSION, SqliteRepository};

fn answer(learner: &str, character: &str, tags: &[&str], correct: bool, minutes: i64) -> AnswerRecord {
    AnswerRecord {
        learner_id: LearnerId::new(learner),
        question_id: QuestionId::new(format!("{character}-{minutes:03}")),
        character_id: CharacterId::new(character),
        tags: tags.iter().map(|t| TagName::new(*t).unwrap()).collect(),
        correct,
        language: Language::En,
        mode: ContentMode::StaticFirst,
        source: Source::Static,
        answered_at: fixed_now() + Duration::minutes(minutes),
    }
}

async fn open(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_folds_answers_into_tag_stats() {
    let repo = open("memdb_tag_stats").await;

    repo.record_answer(&answer("l1", "yuri", &["S3", "IAM"], true, 1)).await.unwrap();
    repo.record_answer(&answer("l1", "yuri", &["S3"], false, 2)).await.unwrap();
    repo.record_answer(&answer("l1", "botan", &["S3"], false, 3)).await.unwrap();
    repo.record_answer(&answer("l2", "yuri", &["S3"], true, 4)).await.unwrap();

    let learner = LearnerId::new("l1");
    let stats = repo.tag_stats(&learner).await.unwrap();
    let flat: Vec<_> = stats
        .iter()
        .map(|s| (s.tag.as_str().to_string(), s.total, s.correct))
        .collect();
    assert_eq!(
        flat,
        vec![("IAM".to_string(), 1, 1), ("S3".to_string(), 3, 1)]
    );

    let totals = repo.learner_totals(&learner).await.unwrap();
    assert_eq!((totals.total, totals.correct), (3, 1));
    assert_eq!(totals.by_character.len(), 2);
    assert_eq!(totals.by_character[0].character_id.as_str(), "botan");

    let recent = repo.recent_answers(&learner, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].character_id.as_str(), "botan");
    assert_eq!(recent[1].tags.len(), 1);
    assert!(!recent[1].correct);
}

#[tokio::test]
async fn sqlite_session_summaries_round_trip() {
    let repo = open("memdb_summaries").await;
    let learner = LearnerId::new("l1");

    let earlier = SessionSummary::new(
        SessionId::generate(),
        learner.clone(),
        CharacterId::new("kasho"),
        ContentMode::OfflineOnly,
        Score { correct: 2, total: 3 },
        fixed_now(),
        fixed_now() + Duration::minutes(5),
        EndReason::Exhausted,
    )
    .unwrap();
    let later = SessionSummary::new(
        SessionId::generate(),
        learner.clone(),
        CharacterId::new("yuri"),
        ContentMode::GenerativeOnly,
        Score { correct: 10, total: 10 },
        fixed_now() + Duration::minutes(10),
        fixed_now() + Duration::minutes(30),
        EndReason::Completed,
    )
    .unwrap();

    repo.append_summary(&earlier).await.unwrap();
    repo.append_summary(&later).await.unwrap();
    assert!(matches!(
        repo.append_summary(&earlier).await,
        Err(StorageError::Conflict(_))
    ));

    let listed = repo.list_summaries(&learner, 10).await.unwrap();
    assert_eq!(listed, vec![later, earlier]);
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = open("memdb_migrate_twice").await;
    assert_eq!(repo.schema_version().await.unwrap(), Some(LATEST_SCHEMA_VERSION));
    repo.migrate().await.expect("second migrate");
    assert_eq!(repo.schema_version().await.unwrap(), Some(LATEST_SCHEMA_VERSION));
    let stats = repo.tag_stats(&LearnerId::new("nobody")).await.unwrap();
    assert!(stats.is_empty());
}
