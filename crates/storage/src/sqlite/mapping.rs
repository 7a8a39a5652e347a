use coach_core::model::{
    CharacterId, ContentMode, EndReason, Language, LearnerId, QuestionId, Score, SessionId,
    SessionSummary, Source, TagName,
};
use sqlx::Row;

use crate::repository::{AnswerRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn source_to_str(source: Source) -> &'static str {
    source.as_str()
}

pub(crate) fn parse_source(s: &str) -> Result<Source, StorageError> {
    match s {
        "static" => Ok(Source::Static),
        "generated" => Ok(Source::Generated),
        _ => Err(StorageError::Serialization(format!("invalid source: {s}"))),
    }
}

pub(crate) fn tags_to_json(tags: &[TagName]) -> Result<String, StorageError> {
    serde_json::to_string(tags).map_err(ser)
}

pub(crate) fn tags_from_json(raw: &str) -> Result<Vec<TagName>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    let language: String = row.try_get("language").map_err(ser)?;
    let mode: String = row.try_get("mode").map_err(ser)?;
    let source: String = row.try_get("source").map_err(ser)?;
    let tags: String = row.try_get("tags").map_err(ser)?;

    Ok(AnswerRecord {
        learner_id: LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        question_id: QuestionId::new(row.try_get::<String, _>("question_id").map_err(ser)?),
        character_id: CharacterId::new(row.try_get::<String, _>("character_id").map_err(ser)?),
        tags: tags_from_json(&tags)?,
        correct: row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
        language: language.parse::<Language>().map_err(ser)?,
        mode: mode.parse::<ContentMode>().map_err(ser)?,
        source: parse_source(&source)?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}

pub(crate) fn map_summary_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionSummary, StorageError> {
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let mode: String = row.try_get("mode").map_err(ser)?;
    let reason: String = row.try_get("end_reason").map_err(ser)?;
    let score = Score {
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        total: u32_from_i64("answered", row.try_get::<i64, _>("answered").map_err(ser)?)?,
    };

    SessionSummary::new(
        session_id.parse::<SessionId>().map_err(ser)?,
        LearnerId::new(row.try_get::<String, _>("learner_id").map_err(ser)?),
        CharacterId::new(row.try_get::<String, _>("character_id").map_err(ser)?),
        mode.parse::<ContentMode>().map_err(ser)?,
        score,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("ended_at").map_err(ser)?,
        reason.parse::<EndReason>().map_err(ser)?,
    )
    .map_err(ser)
}
