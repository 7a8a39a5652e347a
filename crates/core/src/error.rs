use thiserror::Error;

use crate::model::{CharacterError, QuestionError, SessionSummaryError, TagError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Character(#[from] CharacterError),
    #[error(transparent)]
    SessionSummary(#[from] SessionSummaryError),
}
