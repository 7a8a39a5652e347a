use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

/// Highest version in [`MIGRATIONS`].
pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// History schema, one transaction per version.
const MIGRATIONS: &[(i64, &[&str])] = &[
    (
        1,
        &[
            r"
            CREATE TABLE IF NOT EXISTS answer_history (
                id INTEGER PRIMARY KEY,
                learner_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                tags TEXT NOT NULL,
                is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                language TEXT NOT NULL,
                mode TEXT NOT NULL,
                source TEXT NOT NULL,
                answered_at TEXT NOT NULL
            );
            ",
            r"
            CREATE TABLE IF NOT EXISTS tag_stats (
                learner_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                total_count INTEGER NOT NULL CHECK (total_count >= 0),
                correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                last_updated TEXT NOT NULL,
                PRIMARY KEY (learner_id, tag)
            );
            ",
            r"
            CREATE TABLE IF NOT EXISTS session_summaries (
                session_id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                answered INTEGER NOT NULL CHECK (answered >= 0),
                correct INTEGER NOT NULL CHECK (correct >= 0),
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                end_reason TEXT NOT NULL
            );
            ",
        ],
    ),
    (
        2,
        &[
            r"
            CREATE INDEX IF NOT EXISTS idx_answer_history_learner_answered
                ON answer_history (learner_id, answered_at);
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_answer_history_learner_character
                ON answer_history (learner_id, character_id);
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_session_summaries_learner_ended
                ON session_summaries (learner_id, ended_at);
            ",
        ],
    ),
];

/// Applies every migration newer than the recorded schema version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    let current = applied_version(pool).await?.unwrap_or(0);
    for &(version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        apply(pool, version, statements)
            .await
            .map_err(|source| SqliteInitError::Migration { version, source })?;
        info!(version, "history schema migrated");
    }
    Ok(())
}

pub async fn applied_version(pool: &SqlitePool) -> Result<Option<i64>, SqliteInitError> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

async fn apply(pool: &SqlitePool, version: i64, statements: &[&str]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
            ",
    )
    .bind(version)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_end_at_latest() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.last(), Some(&LATEST_SCHEMA_VERSION));
    }
}
