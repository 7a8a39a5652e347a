#![forbid(unsafe_code)]

pub mod ai;
pub mod app_services;
pub mod backend;
pub mod config;
pub mod error;
pub mod explanations;
pub mod generated;
pub mod history;
pub mod narration;
pub mod picker;
pub mod prompts;
pub mod resolver;
pub mod sessions;
pub mod single_flight;

pub use coach_core::Clock;

pub use app_services::CoachServices;
pub use backend::{GenerationRequest, SpeechSynthesizer, TextGenerator};
pub use config::CoachConfig;
pub use error::{BackendError, NarrationError, ResolveError, ServicesError, SessionError};
pub use history::{LearnerOverview, LearningHistoryService};
pub use narration::{Narration, NarrationDispatcher};
pub use resolver::{ContentResolver, QuestionRequest};
pub use sessions::{AnswerOutcome, SessionConfig, SessionHub, SessionProgress, SessionTracker};
