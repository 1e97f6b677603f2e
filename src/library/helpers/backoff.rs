//! Exponential backoff implementations

use std::{iter::Iterator, time::Duration};

/// Exponential backoff iterator
///
/// This struct implements the iterator trait and returns monotonically increasing values until
/// a specified limit of iterations, specified by the `limit` field, is reached.
/// Each element in the Iterator is the previous element multiplied by the `multiplier` property.
pub struct Backoff {
    retries: u32,
    limit: u32,
    multiplier: u32,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retries: 0,
            limit: 13,
            multiplier: 2,
            current: Duration::from_millis(25),
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.retries += 1;

        if self.retries > self.limit {
            None
        } else {
            self.current *= self.multiplier;
            Some(self.current)
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn increase_monotonically() {
        let backoff = Backoff::default();
        let mut previous = Duration::default();

        for duration in backoff {
            assert!(previous < duration);
            previous = duration;
        }
    }

    #[test]
    fn terminate_at_the_limit() {
        assert_eq!(Backoff::default().count(), 13);
    }
}
