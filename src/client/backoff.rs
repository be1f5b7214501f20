// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with multiplicative jitter.
///
/// `next()` returns the delay to wait before the *next* attempt and
/// advances internal state; `reset()` is called once a connection
/// succeeds. Attempt counting is separate from delay computation so a
/// caller can apply `max_attempts` (`None` for the unbounded source) on
/// top of this.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self { initial, factor, max, attempt: 0 }
    }

    /// `D0=1s, F=2, Dmax=60s` matches the §4.1 defaults for targets.
    pub fn default_target() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Computes the next delay and advances the attempt counter. The
    /// returned delay is `min(initial * factor^attempt, max)` with +-10%
    /// multiplicative jitter applied, so targets sharing a WAN link don't
    /// all retry in lockstep.
    pub fn next(&mut self) -> Duration {
        let exp = self.factor.powi(self.attempt as i32);
        let base = self.initial.mul_f64(exp).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        jitter(base)
    }
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.9..=1.1);
    base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_capped() {
        let mut b = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(1));
        let d0 = b.next().as_secs_f64();
        let d1 = b.next().as_secs_f64();
        let d2 = b.next().as_secs_f64();
        // allow for jitter: d1 should be roughly double d0, not equal or less
        assert!(d1 > d0 * 1.5, "d0={d0} d1={d1}");
        assert!(d2 > d1 * 1.5, "d1={d1} d2={d2}");
    }

    #[test]
    fn caps_at_max_with_jitter_bound() {
        let mut b = Backoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(10));
        for _ in 0..20 {
            let d = b.next();
            assert!(d <= Duration::from_millis(11_000), "delay {d:?} exceeded cap+jitter");
        }
    }

    #[test]
    fn reset_restarts_growth() {
        let mut b = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(1));
        b.next();
        b.next();
        assert_eq!(b.attempts(), 2);
        b.reset();
        assert_eq!(b.attempts(), 0);
    }
}
