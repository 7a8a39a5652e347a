use coach_core::model::{CERTIFICATION_CATEGORIES, QuestionOrder, TagName};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

/// Per-session selection policy.
///
/// Seeded pickers replay the same choices for the same seed and bank, which
/// keeps sessions reproducible in tests.
#[derive(Debug, Clone)]
pub struct QuestionPicker {
    order: QuestionOrder,
    rng: StdRng,
}

impl QuestionPicker {
    #[must_use]
    pub fn new(order: QuestionOrder) -> Self {
        let rng = match order {
            QuestionOrder::Seeded(seed) => StdRng::seed_from_u64(seed),
            QuestionOrder::LowestId => StdRng::from_rng(&mut rand::rng()),
        };
        Self { order, rng }
    }

    #[must_use]
    pub fn order(&self) -> QuestionOrder {
        self.order
    }

    /// Index of the next candidate among `len` id-ordered candidates.
    pub fn pick(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self.order {
            QuestionOrder::LowestId => Some(0),
            QuestionOrder::Seeded(_) => Some(self.rng.random_range(0..len)),
        }
    }

    /// Pick `count` distinct certification categories as generation topics.
    pub fn sample_categories(&mut self, count: usize) -> Vec<TagName> {
        CERTIFICATION_CATEGORIES
            .choose_multiple(&mut self.rng, count)
            .filter_map(|name| TagName::new(*name).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_id_always_takes_the_first_candidate() {
        let mut picker = QuestionPicker::new(QuestionOrder::LowestId);
        assert_eq!(picker.pick(5), Some(0));
        assert_eq!(picker.pick(0), None);
    }

    #[test]
    fn seeded_pickers_replay() {
        let mut a = QuestionPicker::new(QuestionOrder::Seeded(7));
        let mut b = QuestionPicker::new(QuestionOrder::Seeded(7));
        let left: Vec<_> = (0..20).map(|_| a.pick(10)).collect();
        let right: Vec<_> = (0..20).map(|_| b.pick(10)).collect();
        assert_eq!(left, right);
        assert!(left.iter().all(|i| i.is_some_and(|i| i < 10)));
    }

    #[test]
    fn category_sample_is_distinct() {
        let mut picker = QuestionPicker::new(QuestionOrder::Seeded(1));
        let topics = picker.sample_categories(2);
        assert_eq!(topics.len(), 2);
        assert_ne!(topics[0], topics[1]);
    }
}
