//! HTTP adapters for the generation and speech backends.

pub mod elevenlabs;
pub mod openai;

pub use elevenlabs::{ElevenLabsConfig, ElevenLabsSynthesizer};
pub use openai::{ChatCompletionsConfig, ChatCompletionsGenerator};
