mod character;
mod explanation;
mod ids;
mod language;
mod question;
mod session;
mod tag;

pub use ids::{CharacterId, LearnerId, ParseIdError, QuestionId, SessionId, VoiceId};
pub use language::{Language, UnsupportedLanguage};
pub use tag::{CERTIFICATION_CATEGORIES, TagError, TagName, parse_tag_list};

pub use character::{Character, CharacterError, CharacterStyle, Difficulty, builtin_characters};
pub use explanation::{Explanation, ExplanationKey};
pub use question::{
    MIN_OPTIONS, Question, QuestionDraft, QuestionError, QuestionText, Source, option_label,
};
pub use session::{
    ContentMode, EndReason, ParseModeError, QuestionOrder, Score, SessionFilters,
    SessionSnapshot, SessionStatus, SessionSummary, SessionSummaryError,
};
