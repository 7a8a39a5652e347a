//! Contracts for the external generative-text and speech-synthesis backends.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coach_core::model::{Language, VoiceId};
use tracing::warn;

use crate::error::BackendError;

/// One request to the text-generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub language: Language,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for `request`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend is unconfigured, unreachable or
    /// returns nothing usable.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError>;

    /// Whether calls can succeed at all.
    fn enabled(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning encoded audio.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend is unconfigured, unreachable or
    /// returns no audio.
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceId,
    ) -> Result<Bytes, BackendError>;

    fn enabled(&self) -> bool {
        true
    }
}

/// Run a backend call with a hard deadline.
///
/// # Errors
///
/// Returns `BackendError::Timeout` when `limit` elapses first, otherwise the
/// call's own result.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = limit.as_millis(), "backend call timed out");
            Err(BackendError::Timeout(limit))
        }
    }
}

/// Generator used when no text backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, BackendError> {
        Err(BackendError::Disabled)
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// Synthesizer used when no speech backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DisabledSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _language: Language,
        _voice: &VoiceId,
    ) -> Result<Bytes, BackendError> {
        Err(BackendError::Disabled)
    }

    fn enabled(&self) -> bool {
        false
    }
}
