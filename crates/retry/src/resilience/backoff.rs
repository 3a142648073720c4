//! Delay calculation between attempts
//!
//! The delay carried between retries starts at the configured base delay.
//! The first retry always waits the unmodified base delay; growth applies
//! from the second retry onwards:
//!
//! | mode | next delay |
//! |------|------------|
//! | linear | `current + delay * factor` |
//! | geometric | `current * factor` |
//!
//! A factor of `0.0` means a constant delay in both modes.

use std::time::Duration;

use crate::config::RetryConfig;

/// Backoff parameters resolved from a [`RetryConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    delay: Duration,
    factor: f64,
    linear: bool,
}

impl Backoff {
    /// Create a backoff from its raw parameters
    pub fn new(delay: Duration, factor: f64, linear: bool) -> Self {
        Self { delay, factor, linear }
    }

    /// Base delay, used before the first retry
    pub fn initial_delay(&self) -> Duration {
        self.delay
    }

    /// Whether growth is arithmetic rather than geometric
    pub fn is_linear(&self) -> bool {
        self.linear
    }

    /// Whether every retry waits the base delay
    pub fn is_constant(&self) -> bool {
        self.factor == 0.0
    }

    /// Delay before the next attempt, given the delay carried so far and the
    /// number of attempts already made
    pub fn next_delay(&self, current: Duration, attempts_made: u32) -> Duration {
        if attempts_made <= 1 || self.is_constant() {
            return current;
        }

        if self.linear {
            current.saturating_add(scale(self.delay, self.factor))
        } else {
            scale(current, self.factor)
        }
    }

    /// Delay before the next attempt computed directly from the number of
    /// attempts already made
    ///
    /// Agrees with folding [`next_delay`](Self::next_delay) over the attempts,
    /// up to nanosecond truncation for fractional geometric factors.
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        match attempts_made {
            0 => Duration::ZERO,
            1 => self.delay,
            _ if self.is_constant() => self.delay,
            n if self.linear => {
                let increment = scale(self.delay, self.factor);
                self.delay.saturating_add(increment.saturating_mul(n - 1))
            }
            n => scale(self.delay, self.factor.powf(f64::from(n - 1))),
        }
    }

    /// Successive delays before the 2nd, 3rd, ... attempt
    pub fn delays(&self) -> Delays {
        Delays { backoff: *self, current: self.delay, attempts_made: 0 }
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.delay, config.backoff, config.linear)
    }
}

/// Iterator over the delays produced by a [`Backoff`]
#[derive(Debug, Clone)]
pub struct Delays {
    backoff: Backoff,
    current: Duration,
    attempts_made: u32,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.attempts_made = self.attempts_made.checked_add(1)?;
        self.current = self.backoff.next_delay(self.current, self.attempts_made);
        Some(self.current)
    }
}

/// Multiply a duration by a non-negative factor with nanosecond precision,
/// truncating fractions and saturating instead of overflowing
fn scale(duration: Duration, factor: f64) -> Duration {
    let nanos = duration.as_nanos() as f64 * factor;
    // `as` saturates out-of-range floats and maps NaN to zero
    Duration::from_nanos(nanos as u64)
}

#[cfg(test)]
mod tests {
    //! Unit tests for the delay calculator.

    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_first_retry_uses_base_delay() {
        for linear in [true, false] {
            let backoff = Backoff::new(ms(500), 2.0, linear);
            assert_eq!(backoff.next_delay(ms(500), 1), ms(500));
            assert_eq!(backoff.delay_for_attempt(1), ms(500));
        }
    }

    #[test]
    fn test_linear_progression() {
        let backoff = Backoff::new(ms(500), 2.0, true);
        let delays: Vec<_> = backoff.delays().take(3).collect();
        assert_eq!(delays, vec![ms(500), ms(1500), ms(2500)]);
    }

    #[test]
    fn test_geometric_progression() {
        let backoff = Backoff::new(ms(500), 2.0, false);
        let delays: Vec<_> = backoff.delays().take(3).collect();
        assert_eq!(delays, vec![ms(500), ms(1000), ms(2000)]);
    }

    #[test]
    fn test_zero_factor_is_constant_in_both_modes() {
        for linear in [true, false] {
            let backoff = Backoff::new(ms(500), 0.0, linear);
            assert!(backoff.is_constant());
            assert!(backoff.delays().take(5).all(|d| d == ms(500)));
            assert_eq!(backoff.delay_for_attempt(4), ms(500));
        }
    }

    #[test]
    fn test_linear_fractional_factor() {
        let backoff = Backoff::new(ms(1000), 1.5, true);
        let delays: Vec<_> = backoff.delays().take(4).collect();
        assert_eq!(delays, vec![ms(1000), ms(2500), ms(4000), ms(5500)]);
    }

    #[test]
    fn test_geometric_factor_below_one_shrinks() {
        let backoff = Backoff::new(ms(1000), 0.5, false);
        let delays: Vec<_> = backoff.delays().take(3).collect();
        assert_eq!(delays, vec![ms(1000), ms(500), ms(250)]);
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        let backoff = Backoff::new(Duration::ZERO, 3.0, false);
        assert!(backoff.delays().take(4).all(|d| d.is_zero()));
    }

    #[test]
    fn test_closed_form_matches_carried_form() {
        for (factor, linear) in [(1.0, true), (2.0, true), (2.0, false), (3.0, false)] {
            let backoff = Backoff::new(ms(1000), factor, linear);
            for (index, carried) in backoff.delays().take(6).enumerate() {
                let attempts_made = index as u32 + 1;
                assert_eq!(
                    backoff.delay_for_attempt(attempts_made),
                    carried,
                    "factor {factor}, linear {linear}, attempt {attempts_made}"
                );
            }
        }
    }

    #[test]
    fn test_no_delay_before_first_attempt() {
        let backoff = Backoff::new(ms(500), 2.0, true);
        assert_eq!(backoff.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_huge_growth_saturates() {
        let backoff = Backoff::new(Duration::from_secs(3600), 1.0e12, false);
        let delay = backoff.next_delay(Duration::from_secs(3600 * 1_000_000), 5);
        assert_eq!(delay, Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig { attempts: 4, delay: ms(250), backoff: 1.0, linear: false };
        let backoff = Backoff::from(&config);
        assert_eq!(backoff.initial_delay(), ms(250));
        assert!(!backoff.is_linear());
    }
}
