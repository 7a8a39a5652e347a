#![forbid(unsafe_code)]

pub mod bank;
pub mod repository;
pub mod sqlite;

pub use repository::{
    AnswerRecord, CharacterStat, HistoryRepository, InMemoryHistory, InMemoryQuestionBank,
    LearnerTotals, QuestionQuery, QuestionStore, Storage, StorageError, TagStat,
};
