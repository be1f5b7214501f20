// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Status Surface (§4.8/§6): in-memory atomic counters and a state
//! snapshot consumed by the external HTTP dashboard. No lock is ever held
//! across I/O here — every field is an independent atomic, and the
//! snapshot is assembled by reading them one at a time.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::model::health::TargetState;

#[derive(Debug, Default)]
pub struct TargetCounters {
    pub applied: AtomicU64,
    pub failed: AtomicU64,
    pub last_error: std::sync::RwLock<Option<String>>,
}

/// Snapshot of one target's counters, safe to serialize for the
/// dashboard.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub state: String,
    pub applied: u64,
    pub failed: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSnapshot {
    pub source_state: String,
    pub driver_state: String,
    /// PSYNC replication offset, `-1` when the active driver is not PSYNC.
    pub psync_offset: i64,
    pub targets: Vec<TargetSnapshot>,
}

/// Process-lifetime counters and current state, built up incrementally by
/// every component and read out as one [`StatusSnapshot`] by the external
/// dashboard.
pub struct StatusSurface {
    source_state: std::sync::RwLock<String>,
    driver_state: std::sync::RwLock<String>,
    psync_offset: AtomicI64,
    per_target: DashMap<String, TargetCounters>,
    health: std::sync::Arc<crate::health::HealthMonitor>,
}

impl StatusSurface {
    pub fn new(
        target_names: impl IntoIterator<Item = String>,
        health: std::sync::Arc<crate::health::HealthMonitor>,
    ) -> Self {
        let per_target = DashMap::new();
        for name in target_names {
            per_target.insert(name, TargetCounters::default());
        }
        Self {
            source_state: std::sync::RwLock::new("reconnecting".to_string()),
            driver_state: std::sync::RwLock::new("init".to_string()),
            psync_offset: AtomicI64::new(-1),
            per_target,
            health,
        }
    }

    pub fn set_source_state(&self, state: &str) {
        *self.source_state.write().expect("status lock poisoned") = state.to_string();
    }

    pub fn set_driver_state(&self, state: &str) {
        *self.driver_state.write().expect("status lock poisoned") = state.to_string();
    }

    pub fn set_psync_offset(&self, offset: u64) {
        self.psync_offset.store(offset as i64, Ordering::Relaxed);
    }

    pub fn record_applied(&self, target: &str) {
        if let Some(c) = self.per_target.get(target) {
            c.applied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failed(&self, target: &str, error: &str) {
        if let Some(c) = self.per_target.get(target) {
            c.failed.fetch_add(1, Ordering::Relaxed);
            *c.last_error.write().expect("status lock poisoned") = Some(error.to_string());
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let targets = self
            .per_target
            .iter()
            .map(|entry| {
                let name = entry.key().clone();
                let state = self
                    .health
                    .state(&name)
                    .map(state_label)
                    .unwrap_or("unknown")
                    .to_string();
                let consecutive_failures = self.health.consecutive_failures(&name) as u64;
                TargetSnapshot {
                    name,
                    state,
                    applied: entry.applied.load(Ordering::Relaxed),
                    failed: entry.failed.load(Ordering::Relaxed),
                    consecutive_failures,
                    last_error: entry.last_error.read().expect("status lock poisoned").clone(),
                }
            })
            .collect();

        StatusSnapshot {
            source_state: self.source_state.read().expect("status lock poisoned").clone(),
            driver_state: self.driver_state.read().expect("status lock poisoned").clone(),
            psync_offset: self.psync_offset.load(Ordering::Relaxed),
            targets,
        }
    }
}

fn state_label(state: TargetState) -> &'static str {
    match state {
        TargetState::Active => "active",
        TargetState::Cooling => "cooling",
        TargetState::Disabled => "disabled",
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{event::EventBus, health::HealthMonitor};

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let health = Arc::new(HealthMonitor::new(
            ["t1".to_string()],
            10,
            Duration::from_secs(120),
            EventBus::new(8),
        ));
        health.record_failure("t1", "boom");
        health.record_failure("t1", "boom");
        let status = StatusSurface::new(["t1".to_string()], health.clone());
        status.record_applied("t1");
        status.record_applied("t1");
        status.record_failed("t1", "boom");
        status.set_source_state("healthy");

        let snap = status.snapshot();
        assert_eq!(snap.source_state, "healthy");
        assert_eq!(snap.targets.len(), 1);
        assert_eq!(snap.targets[0].applied, 2);
        assert_eq!(snap.targets[0].failed, 1);
        assert_eq!(snap.targets[0].consecutive_failures, 2);
        assert_eq!(snap.targets[0].last_error.as_deref(), Some("boom"));

        health.record_success("t1");
        let snap = status.snapshot();
        assert_eq!(snap.targets[0].consecutive_failures, 0);
    }
}
