use chrono::{DateTime, Utc};

/// Time source injected into every coach service.
///
/// Sessions, generated content and cache entries are stamped through this
/// clock so tests can pin them to one instant.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Millisecond stamp used when minting ids for generated questions.
    #[must_use]
    pub fn stamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// 2023-11-14T22:13:20Z, the instant every fixed test clock starts at.
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_stamps_are_stable() {
        let clock = fixed_clock();
        assert_eq!(clock.now(), fixed_now());
        assert_eq!(clock.stamp_millis(), FIXED_TEST_TIMESTAMP * 1000);
        assert_eq!(clock.stamp_millis(), clock.stamp_millis());
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = Clock::system();
        let before = clock.now();
        assert!(clock.now() >= before);
        assert!(clock.stamp_millis() >= before.timestamp_millis());
    }
}
