use std::time::Duration;

use rand::Rng as _;

/// An exponential backoff strategy.
///
/// This backoff strategy provides backoff durations that increase exponentially based on a user-provided error count,
/// with a minimum and maximum bound on the duration. Additionally, jitter can be added to the backoff duration in order
/// to help avoid multiple callers retrying at the same time.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    min_backoff: Duration,
    max_backoff: Duration,
    min_backoff_factor: f64,
}

impl ExponentialBackoff {
    /// Creates a new `ExponentialBackoff` with the given minimum and maximum backoff durations.
    ///
    /// Jitter is not applied to the calculated backoff durations. A maximum lower than the minimum is raised to the
    /// minimum.
    pub fn new(min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            min_backoff,
            max_backoff: max_backoff.max(min_backoff),
            min_backoff_factor: 1.0,
        }
    }

    /// Creates a new `ExponentialBackoff` with the given minimum and maximum backoff durations, and minimum backoff
    /// factor.
    ///
    /// Jitter is applied to the calculated backoff durations based on the minimum backoff factor, such that any given
    /// backoff duration will be between `D/min_backoff_factor` and `D`, where `D` is the calculated backoff duration
    /// for the given error count. If the minimum backoff factor is set to 1.0 or less, then jitter will be disabled. A
    /// maximum lower than the minimum is raised to the minimum.
    ///
    /// With a minimum backoff duration of 10ms and a minimum backoff factor of 2.0, the duration for an error count of
    /// one would be 20ms without jitter, but anywhere between 10ms and 20ms with jitter.
    pub fn with_jitter(min_backoff: Duration, max_backoff: Duration, min_backoff_factor: f64) -> Self {
        Self {
            min_backoff,
            max_backoff: max_backoff.max(min_backoff),
            min_backoff_factor: min_backoff_factor.max(1.0),
        }
    }

    /// Returns the minimum backoff duration.
    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Calculates the backoff duration for the given error count.
    ///
    /// The error count should be the number of consecutive failures seen so far when retrying an operation.
    pub fn get_backoff_duration(&self, error_count: u32) -> Duration {
        if error_count == 0 {
            return self.min_backoff;
        }

        let mut backoff = self.min_backoff.saturating_mul(2u32.saturating_pow(error_count));

        // Apply jitter if necessary.
        if self.min_backoff_factor > 1.0 {
            let backoff_lower = backoff.div_f64(self.min_backoff_factor);
            let backoff_upper = backoff;
            backoff = rand::rng().random_range(backoff_lower..=backoff_upper);
        }

        backoff.clamp(self.min_backoff, self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::ExponentialBackoff;

    fn arb_exponential_backoff() -> impl Strategy<Value = ExponentialBackoff> {
        (1u64..=u64::MAX / 2, 1u64..u64::MAX / 2).prop_map(|(min_backoff, max_backoff)| {
            let max_backoff = min_backoff.saturating_add(max_backoff);
            ExponentialBackoff::new(Duration::from_nanos(min_backoff), Duration::from_nanos(max_backoff))
        })
    }

    #[test]
    fn doubles_per_error_until_clamped() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(100));

        assert_eq!(backoff.get_backoff_duration(0), Duration::from_millis(10));
        assert_eq!(backoff.get_backoff_duration(1), Duration::from_millis(20));
        assert_eq!(backoff.get_backoff_duration(2), Duration::from_millis(40));
        assert_eq!(backoff.get_backoff_duration(3), Duration::from_millis(80));
        assert_eq!(backoff.get_backoff_duration(4), Duration::from_millis(100));
        assert_eq!(backoff.get_backoff_duration(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn inverted_bounds_collapse_to_minimum() {
        let min_backoff = Duration::from_millis(500);
        let max_backoff = Duration::from_millis(100);

        let backoff = ExponentialBackoff::new(min_backoff, max_backoff);
        assert_eq!(backoff.max_backoff(), min_backoff);
        assert_eq!(backoff.get_backoff_duration(0), min_backoff);
        assert_eq!(backoff.get_backoff_duration(1), min_backoff);
        assert_eq!(backoff.get_backoff_duration(10), min_backoff);

        let jittered = ExponentialBackoff::with_jitter(min_backoff, max_backoff, 2.0);
        assert_eq!(jittered.max_backoff(), min_backoff);
        assert_eq!(jittered.get_backoff_duration(3), min_backoff);
    }

    proptest! {
        #[test]
        fn property_test_exponential_backoff_no_jitter(
            backoff in arb_exponential_backoff(),
            error_count in 0..u32::MAX,
            error_count_increase in 1..5u32
        ) {
            // For any error count, the calculated backoff duration should never be larger than the duration calculated
            // for a larger error count.
            let first = backoff.get_backoff_duration(error_count);
            let first_followup = backoff.get_backoff_duration(error_count);
            let second = backoff.get_backoff_duration(error_count.saturating_add(error_count_increase));

            assert_eq!(first, first_followup);
            assert!(first <= second);
            assert!(first >= backoff.min_backoff());
            assert!(first <= backoff.max_backoff());
            assert!(second >= backoff.min_backoff());
            assert!(second <= backoff.max_backoff());
        }

        #[test]
        fn property_test_exponential_backoff_jitter_stays_in_bounds(
            min_backoff_ms in 1u64..1_000,
            max_backoff_extra_ms in 0u64..60_000,
            error_count in 0..64u32,
        ) {
            let min_backoff = Duration::from_millis(min_backoff_ms);
            let max_backoff = min_backoff + Duration::from_millis(max_backoff_extra_ms);
            let backoff = ExponentialBackoff::with_jitter(min_backoff, max_backoff, 2.0);

            let duration = backoff.get_backoff_duration(error_count);
            assert!(duration >= min_backoff);
            assert!(duration <= max_backoff);
        }
    }
}
