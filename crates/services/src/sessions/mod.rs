mod hub;
mod progress;
mod tracker;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use hub::{DEFAULT_RETAINED_ENDED, SessionHub};
pub use progress::SessionProgress;
pub use tracker::{AnswerOutcome, DEFAULT_GENERATED_SESSION_LENGTH, SessionConfig, SessionTracker};
