use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use coach_core::model::{Explanation, ExplanationKey, Language, Question, Source};

/// Process-wide store of explanations, shared by every session.
///
/// Several explanations may exist per key; `get` prefers a static one, then
/// the earliest generated one.
#[derive(Debug, Default)]
pub struct ExplanationCache {
    entries: RwLock<HashMap<ExplanationKey, Vec<Explanation>>>,
}

impl ExplanationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, explanation: Explanation) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(explanation.key()).or_default().push(explanation);
    }

    #[must_use]
    pub fn get(&self, key: &ExplanationKey) -> Option<Explanation> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(|candidates| {
            candidates
                .iter()
                .min_by_key(|e| (e.source != Source::Static, e.generated_at))
                .cloned()
        })
    }

    /// Register the pre-written explanations shipped with `questions` under
    /// each question's owning character. Returns how many were added.
    pub fn seed_static<'a>(&self, questions: impl IntoIterator<Item = &'a Question>) -> usize {
        let mut added = 0;
        for question in questions {
            for language in Language::ALL {
                if let Some(body) = question.static_explanation(language) {
                    self.insert(Explanation::authored(
                        question.id().clone(),
                        question.character_id().clone(),
                        language,
                        body,
                    ));
                    added += 1;
                }
            }
        }
        added
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
