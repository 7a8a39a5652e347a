use chrono::Utc;
use coach_core::model::{CharacterId, LearnerId, SessionSummary, TagName};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    map_answer_row, map_summary_row, ser, source_to_str, tags_to_json, u32_from_i64,
};
use crate::repository::{
    AnswerRecord, CharacterStat, HistoryRepository, LearnerTotals, StorageError, TagStat,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl HistoryRepository for SqliteRepository {
    async fn record_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO answer_history (
                    learner_id, question_id, character_id, tags, is_correct,
                    language, mode, source, answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(record.learner_id.as_str())
        .bind(record.question_id.as_str())
        .bind(record.character_id.as_str())
        .bind(tags_to_json(&record.tags)?)
        .bind(i64::from(record.correct))
        .bind(record.language.code())
        .bind(record.mode.as_str())
        .bind(source_to_str(record.source))
        .bind(record.answered_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let now = Utc::now();
        for tag in &record.tags {
            sqlx::query(
                r"
                    INSERT INTO tag_stats (learner_id, tag, total_count, correct_count, last_updated)
                    VALUES (?1, ?2, 1, ?3, ?4)
                    ON CONFLICT(learner_id, tag) DO UPDATE SET
                        total_count = total_count + 1,
                        correct_count = correct_count + excluded.correct_count,
                        last_updated = excluded.last_updated
                ",
            )
            .bind(record.learner_id.as_str())
            .bind(tag.as_str())
            .bind(i64::from(record.correct))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)
    }

    async fn tag_stats(&self, learner: &LearnerId) -> Result<Vec<TagStat>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT tag, total_count, correct_count
                FROM tag_stats
                WHERE learner_id = ?1
                ORDER BY tag ASC
            ",
        )
        .bind(learner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TagStat {
                tag: TagName::new(row.try_get::<String, _>("tag").map_err(ser)?).map_err(ser)?,
                total: u32_from_i64("total_count", row.try_get("total_count").map_err(ser)?)?,
                correct: u32_from_i64(
                    "correct_count",
                    row.try_get("correct_count").map_err(ser)?,
                )?,
            });
        }
        Ok(out)
    }

    async fn learner_totals(&self, learner: &LearnerId) -> Result<LearnerTotals, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT character_id, COUNT(*) AS total, SUM(is_correct) AS correct
                FROM answer_history
                WHERE learner_id = ?1
                GROUP BY character_id
                ORDER BY character_id ASC
            ",
        )
        .bind(learner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut totals = LearnerTotals {
            learner_id: learner.clone(),
            total: 0,
            correct: 0,
            by_character: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            let stat = CharacterStat {
                character_id: CharacterId::new(
                    row.try_get::<String, _>("character_id").map_err(ser)?,
                ),
                total: u32_from_i64("total", row.try_get("total").map_err(ser)?)?,
                correct: u32_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
            };
            totals.total += stat.total;
            totals.correct += stat.correct;
            totals.by_character.push(stat);
        }
        Ok(totals)
    }

    async fn recent_answers(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    learner_id, question_id, character_id, tags, is_correct,
                    language, mode, source, answered_at
                FROM answer_history
                WHERE learner_id = ?1
                ORDER BY answered_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(learner.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }

    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO session_summaries (
                    session_id, learner_id, character_id, mode, answered, correct,
                    started_at, ended_at, end_reason
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(summary.learner_id().as_str())
        .bind(summary.character_id().as_str())
        .bind(summary.mode().as_str())
        .bind(i64::from(summary.score().total))
        .bind(i64::from(summary.score().correct))
        .bind(summary.started_at())
        .bind(summary.ended_at())
        .bind(summary.reason().as_str())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StorageError::Conflict(format!("session {} already recorded", summary.session_id())),
            ),
            Err(e) => Err(conn(e)),
        }
    }

    async fn list_summaries(
        &self,
        learner: &LearnerId,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    session_id, learner_id, character_id, mode, answered, correct,
                    started_at, ended_at, end_reason
                FROM session_summaries
                WHERE learner_id = ?1
                ORDER BY ended_at DESC, session_id DESC
                LIMIT ?2
            ",
        )
        .bind(learner.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_summary_row).collect()
    }
}
