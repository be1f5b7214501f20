// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Health & Failover Monitor (§4.8): drives the per-target state
//! transitions of §4.7 and emits the observable events the status surface
//! consumes. The per-target counters and state machine themselves live in
//! [`crate::model::health::TargetHealth`]; this module is the registry
//! that owns one per configured target plus the periodic recovery tick.

use std::time::Duration;

use dashmap::DashMap;

use crate::{
    event::{EventBus, ReplicationEvent},
    model::health::{TargetHealth, TargetState},
};

/// Owns one [`TargetHealth`] per configured target, keyed by target name.
pub struct HealthMonitor {
    targets: DashMap<String, TargetHealth>,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(
        target_names: impl IntoIterator<Item = String>,
        max_failures: u32,
        recovery_delay: Duration,
        events: EventBus,
    ) -> Self {
        let targets = DashMap::new();
        for name in target_names {
            targets.insert(name, TargetHealth::new(max_failures, recovery_delay));
        }
        Self { targets, events }
    }

    pub fn state(&self, target: &str) -> Option<TargetState> {
        self.targets.get(target).map(|h| h.state())
    }

    pub fn is_attemptable(&self, target: &str) -> bool {
        self.targets.get(target).map(|h| h.is_attemptable()).unwrap_or(false)
    }

    /// Current consecutive-failure count for `target`, `0` for an unknown
    /// or never-failed target. The authoritative counter lives on
    /// [`TargetHealth`]; this is the read side the status surface snapshots.
    pub fn consecutive_failures(&self, target: &str) -> u32 {
        self.targets.get(target).map(|h| h.consecutive_failures()).unwrap_or(0)
    }

    pub fn record_success(&self, target: &str) {
        if let Some(mut h) = self.targets.get_mut(target) {
            let was_cooling = h.state() == TargetState::Cooling;
            h.record_success();
            if was_cooling {
                self.events.emit(ReplicationEvent::TargetUp { target: target.to_string() });
            }
        }
    }

    pub fn record_failure(&self, target: &str, detail: &str) {
        if let Some(mut h) = self.targets.get_mut(target) {
            h.record_failure();
            if h.state() == TargetState::Cooling {
                self.events.emit(ReplicationEvent::TargetCooling {
                    target: target.to_string(),
                    consecutive_failures: h.consecutive_failures(),
                });
            } else {
                self.events.emit(ReplicationEvent::TargetDown {
                    target: target.to_string(),
                    detail: detail.to_string(),
                });
            }
        }
    }

    pub fn disable(&self, target: &str) {
        if let Some(mut h) = self.targets.get_mut(target) {
            h.disable();
        }
    }

    pub fn enable(&self, target: &str) {
        if let Some(mut h) = self.targets.get_mut(target) {
            h.enable();
        }
    }

    /// Called periodically (e.g. alongside the supervisor's health tick):
    /// promotes any `Cooling` target whose `recovery_delay` has elapsed
    /// back to `Active`, emitting `TargetUp`.
    pub fn tick_recovery(&self) {
        for mut entry in self.targets.iter_mut() {
            if entry.value_mut().tick_recovery() {
                self.events.emit(ReplicationEvent::TargetUp { target: entry.key().clone() });
            }
        }
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cooling_after_max_failures_then_recovers() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let monitor =
            HealthMonitor::new(["t1".to_string()], 2, Duration::from_millis(10), events);

        monitor.record_failure("t1", "boom");
        assert!(monitor.is_attemptable("t1"));
        monitor.record_failure("t1", "boom");
        assert!(!monitor.is_attemptable("t1"));

        std::thread::sleep(Duration::from_millis(20));
        monitor.tick_recovery();
        assert!(monitor.is_attemptable("t1"));

        // Drain a couple of events without blocking the test on channel
        // capacity semantics.
        let mut saw_cooling = false;
        let mut saw_up = false;
        while let Ok(ev) = rx.try_recv() {
            match ev.event {
                ReplicationEvent::TargetCooling { .. } => saw_cooling = true,
                ReplicationEvent::TargetUp { .. } => saw_up = true,
                _ => {},
            }
        }
        assert!(saw_cooling && saw_up);
    }

    #[test]
    fn disabled_target_is_never_attemptable() {
        let monitor = HealthMonitor::new(
            ["t1".to_string()],
            10,
            Duration::from_secs(120),
            EventBus::new(8),
        );
        monitor.disable("t1");
        assert!(!monitor.is_attemptable("t1"));
        monitor.record_failure("t1", "ignored");
        assert!(!monitor.is_attemptable("t1"));
    }
}
