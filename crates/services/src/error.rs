//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use coach_core::model::{CharacterError, CharacterId, Language, SessionId, SessionSummaryError};
use storage::bank::BankLoadError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Failure of a generative-text or speech-synthesis backend.
///
/// Cloneable so a single failed call can be handed to every waiter of a
/// collapsed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    #[error("backend is not configured")]
    Disabled,
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend request failed with status {0}")]
    HttpStatus(u16),
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}

/// Errors emitted by `ContentResolver`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("no questions match the requested filters")]
    NotFound,
    #[error("unknown character: {0}")]
    UnknownCharacter(CharacterId),
    #[error("character {character} does not speak {language}")]
    UnsupportedLanguage {
        character: CharacterId,
        language: Language,
    },
    #[error("question bank exhausted and generation is not available")]
    ExhaustedAndUnavailable,
    #[error("content generation unavailable: {0}")]
    GenerationUnavailable(#[source] BackendError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Character(CharacterError),
}

impl From<StorageError> for ResolveError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => ResolveError::NotFound,
            other => ResolveError::Storage(other),
        }
    }
}

impl From<CharacterError> for ResolveError {
    fn from(e: CharacterError) -> Self {
        match e {
            CharacterError::UnknownCharacter(id) => ResolveError::UnknownCharacter(id),
            other => ResolveError::Character(other),
        }
    }
}

/// Errors emitted by `NarrationDispatcher`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NarrationError {
    #[error("nothing to narrate")]
    EmptyText,
    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(#[source] BackendError),
}

/// Errors emitted by session tracking.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has ended")]
    SessionEnded,
    #[error("no active question; call advance first")]
    NoActiveQuestion,
    #[error("option {index} is out of range for a question with {option_count} options")]
    InvalidOption { index: usize, option_count: usize },
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error(transparent)]
    Narration(#[from] NarrationError),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bank(#[from] BankLoadError),
    #[error(transparent)]
    Character(#[from] CharacterError),
    #[error("invalid configuration value for {key}: {value}")]
    Config { key: &'static str, value: String },
}
