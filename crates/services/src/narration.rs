use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use coach_core::Clock;
use coach_core::digest::{content_digest, normalize_text};
use coach_core::model::{Character, Language, VoiceId};
use tracing::{debug, warn};

use crate::backend::{SpeechSynthesizer, with_timeout};
use crate::error::{BackendError, NarrationError};
use crate::single_flight::SingleFlight;

pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Synthesized audio for one `(text, language, voice)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationCacheEntry {
    pub key: String,
    pub audio: Bytes,
    pub created_at: DateTime<Utc>,
}

/// Cache key over whitespace-normalized text, language and voice.
#[must_use]
pub fn narration_key(text: &str, language: Language, voice: &VoiceId) -> String {
    let normalized = normalize_text(text);
    content_digest([normalized.as_str(), language.code(), voice.as_str()])
}

/// Process-wide audio cache. Each key is written at most once.
#[derive(Debug, Default)]
pub struct NarrationCache {
    entries: RwLock<HashMap<String, NarrationCacheEntry>>,
}

impl NarrationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<NarrationCacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Store `entry` unless its key is already present; returns the stored entry.
    pub fn insert(&self, entry: NarrationCacheEntry) -> NarrationCacheEntry {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(entry.key.clone()).or_insert(entry).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a narration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub entry: NarrationCacheEntry,
    /// True when no synthesis was needed for this call.
    pub cached: bool,
}

/// Decides whether speech must be synthesized and caches the audio.
#[derive(Clone)]
pub struct NarrationDispatcher {
    clock: Clock,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<NarrationCache>,
    flights: Arc<SingleFlight<String, Result<NarrationCacheEntry, BackendError>>>,
    timeout: Duration,
}

impl NarrationDispatcher {
    #[must_use]
    pub fn new(
        clock: Clock,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<NarrationCache>,
    ) -> Self {
        Self {
            clock,
            synthesizer,
            cache,
            flights: Arc::new(SingleFlight::new()),
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.synthesizer.enabled()
    }

    #[must_use]
    pub fn cache(&self) -> &NarrationCache {
        &self.cache
    }

    /// Narrate `text` in the character's default voice.
    ///
    /// # Errors
    ///
    /// See [`NarrationDispatcher::narrate`].
    pub async fn narrate_as(
        &self,
        text: &str,
        language: Language,
        character: &Character,
    ) -> Result<Narration, NarrationError> {
        self.narrate(text, language, character.voice()).await
    }

    /// Audio for `text`, synthesized at most once per key.
    ///
    /// # Errors
    ///
    /// Returns `NarrationError::EmptyText` for blank text and
    /// `NarrationError::SynthesisUnavailable` when the backend fails or times out.
    pub async fn narrate(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceId,
    ) -> Result<Narration, NarrationError> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(NarrationError::EmptyText);
        }
        let key = narration_key(&normalized, language, voice);

        let mut hit = false;
        let lookup = || {
            let cached = self.cache.get(&key)?;
            hit = true;
            Some(Ok(cached))
        };

        let make = || {
            let synthesizer = Arc::clone(&self.synthesizer);
            let cache = Arc::clone(&self.cache);
            let clock = self.clock;
            let timeout = self.timeout;
            let voice = voice.clone();
            let key = key.clone();
            async move {
                let audio =
                    with_timeout(timeout, synthesizer.synthesize(&normalized, language, &voice))
                        .await?;
                if audio.is_empty() {
                    return Err(BackendError::EmptyResponse);
                }
                Ok(cache.insert(NarrationCacheEntry {
                    key,
                    audio,
                    created_at: clock.now(),
                }))
            }
        };

        let entry = self
            .flights
            .run(key.clone(), lookup, make)
            .await
            .map_err(|e| {
                warn!(error = %e, "speech synthesis failed");
                NarrationError::SynthesisUnavailable(e)
            })?;
        debug!(key = %key, cached = hit, bytes = entry.audio.len(), "narration ready");
        Ok(Narration { entry, cached: hit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DisabledSynthesizer;
    use async_trait::async_trait;
    use coach_core::time::fixed_clock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSynth {
        calls: AtomicUsize,
        delay: Option<std::time::Duration>,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(
            &self,
            text: &str,
            _language: Language,
            _voice: &VoiceId,
        ) -> Result<Bytes, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Bytes::from(format!("mp3:{text}")))
        }
    }

    fn dispatcher(synth: Arc<dyn SpeechSynthesizer>) -> NarrationDispatcher {
        NarrationDispatcher::new(fixed_clock(), synth, Arc::new(NarrationCache::new()))
    }

    #[test]
    fn key_ignores_whitespace_differences() {
        let voice = VoiceId::new("v");
        assert_eq!(
            narration_key("Hello  world ", Language::En, &voice),
            narration_key("Hello world", Language::En, &voice)
        );
        assert_ne!(
            narration_key("Hello world", Language::En, &voice),
            narration_key("Hello world", Language::Ja, &voice)
        );
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let synth = Arc::new(CountingSynth::default());
        let narration = dispatcher(synth.clone());
        let voice = VoiceId::new("yuri-voice");

        let first = narration.narrate("S3 is object storage", Language::En, &voice).await.unwrap();
        let second = narration.narrate("S3 is object storage", Language::En, &voice).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.entry, second.entry);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(narration.cache().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_for_one_key_share_a_synthesis() {
        let synth = Arc::new(CountingSynth {
            delay: Some(std::time::Duration::from_millis(50)),
            ..CountingSynth::default()
        });
        let narration = dispatcher(synth.clone());
        let voice = VoiceId::new("botan-voice");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let narration = narration.clone();
                let voice = voice.clone();
                tokio::spawn(async move {
                    narration
                        .narrate("IAM roles grant temporary credentials", Language::En, &voice)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut keys = std::collections::BTreeSet::new();
        for task in tasks {
            keys.insert(task.await.unwrap().entry.key);
        }

        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(keys.len(), 1);
        assert_eq!(narration.cache().len(), 1);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_call() {
        let synth = Arc::new(CountingSynth::default());
        let narration = dispatcher(synth.clone());
        let err = narration
            .narrate("   ", Language::Ja, &VoiceId::new("v"))
            .await
            .unwrap_err();
        assert_eq!(err, NarrationError::EmptyText);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_backend_is_unavailable_and_caches_nothing() {
        let narration = dispatcher(Arc::new(DisabledSynthesizer));
        assert!(!narration.enabled());
        let err = narration
            .narrate("hello", Language::En, &VoiceId::new("v"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NarrationError::SynthesisUnavailable(BackendError::Disabled)
        );
        assert!(narration.cache().is_empty());
    }
}
