// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{Duration, Instant};

/// Per-target failover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Active,
    Cooling,
    Disabled,
}

/// Consecutive-failure counter and cooldown timer driving the transitions
/// of a target's cooldown lifecycle.
#[derive(Debug, Clone)]
pub struct TargetHealth {
    state: TargetState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    cooling_since: Option<Instant>,
    max_failures: u32,
    recovery_delay: Duration,
}

impl TargetHealth {
    pub fn new(max_failures: u32, recovery_delay: Duration) -> Self {
        Self {
            state: TargetState::Active,
            consecutive_failures: 0,
            last_failure: None,
            cooling_since: None,
            max_failures,
            recovery_delay,
        }
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Manually disabled via a config reload; disabled targets are skipped
    /// entirely until re-enabled the same way.
    pub fn disable(&mut self) {
        self.state = TargetState::Disabled;
    }

    pub fn enable(&mut self) {
        self.state = TargetState::Active;
        self.consecutive_failures = 0;
        self.cooling_since = None;
    }

    /// On success: increment applied counter (caller's job), reset
    /// consecutive-failure count.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == TargetState::Cooling {
            self.state = TargetState::Active;
            self.cooling_since = None;
        }
    }

    /// On failure: increment counter; transition to `Cooling` once
    /// `max_failures` consecutive failures are reached.
    pub fn record_failure(&mut self) {
        if self.state == TargetState::Disabled {
            return;
        }
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
        if self.consecutive_failures >= self.max_failures && self.state != TargetState::Cooling {
            self.state = TargetState::Cooling;
            self.cooling_since = Some(Instant::now());
        }
    }

    /// Called periodically by the health monitor: once `recovery_delay` has
    /// elapsed since entering `Cooling`, transitions back to `Active` with
    /// the counter reset.
    pub fn tick_recovery(&mut self) -> bool {
        if self.state != TargetState::Cooling {
            return false;
        }
        let Some(since) = self.cooling_since else { return false };
        if since.elapsed() >= self.recovery_delay {
            self.state = TargetState::Active;
            self.consecutive_failures = 0;
            self.cooling_since = None;
            true
        } else {
            false
        }
    }

    /// Whether the dispatcher should attempt this target at all right now.
    pub fn is_attemptable(&self) -> bool {
        self.state == TargetState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_to_cooling_after_max_failures() {
        let mut h = TargetHealth::new(3, Duration::from_millis(10));
        assert_eq!(h.state(), TargetState::Active);
        h.record_failure();
        h.record_failure();
        assert_eq!(h.state(), TargetState::Active);
        h.record_failure();
        assert_eq!(h.state(), TargetState::Cooling);
        assert!(!h.is_attemptable());
    }

    #[test]
    fn recovers_after_cooldown_elapses() {
        let mut h = TargetHealth::new(1, Duration::from_millis(5));
        h.record_failure();
        assert_eq!(h.state(), TargetState::Cooling);
        assert!(!h.tick_recovery());
        std::thread::sleep(Duration::from_millis(10));
        assert!(h.tick_recovery());
        assert_eq!(h.state(), TargetState::Active);
        assert_eq!(h.consecutive_failures(), 0);
    }

    #[test]
    fn success_resets_counter_without_waiting_for_cooldown() {
        let mut h = TargetHealth::new(3, Duration::from_secs(120));
        h.record_failure();
        h.record_failure();
        h.record_success();
        assert_eq!(h.consecutive_failures(), 0);
    }

    #[test]
    fn disabled_target_ignores_failures() {
        let mut h = TargetHealth::new(1, Duration::from_millis(5));
        h.disable();
        h.record_failure();
        assert_eq!(h.state(), TargetState::Disabled);
    }
}
