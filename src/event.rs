// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured events (§7, §4.8) broadcast from every component to the
//! in-process status surface and, through it, the external HTTP
//! dashboard. Closed set per SPEC_FULL §10.6.

use std::time::SystemTime;

use tokio::sync::broadcast;

/// One user-visible occurrence, carrying the fields §7 requires:
/// component, endpoint name, kind, detail — modeled as enum variants
/// instead of a single generic struct so each carries only the fields
/// that make sense for it.
#[derive(Debug, Clone)]
pub enum ReplicationEvent {
    SourceReconnected,
    SourceBroken,
    TargetUp { target: String },
    TargetDown { target: String, detail: String },
    TargetCooling { target: String, consecutive_failures: u32 },
    DriverStateChanged { driver: &'static str, state: String },
    FullSyncComplete { keys_migrated: u64 },
    KeyCodecError { target: String, key: String, detail: String },
}

/// One emitted event plus the wall-clock time it was observed, the shape
/// the status surface and external dashboard actually consume.
#[derive(Debug, Clone)]
pub struct TimestampedEvent {
    pub at: SystemTime,
    pub event: ReplicationEvent,
}

/// Broadcast sender side, cloned into every component that can produce
/// events. Lagging receivers (e.g. a slow dashboard poller) drop old
/// events rather than block producers — events are diagnostic, not a
/// durable log.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TimestampedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.tx.subscribe()
    }

    /// Emits an event. Never blocks; a full channel with no receivers is a
    /// no-op (there is nothing listening, which is fine — logging already
    /// happened via `tracing` at the call site).
    pub fn emit(&self, event: ReplicationEvent) {
        let _ = self.tx.send(TimestampedEvent { at: SystemTime::now(), event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_emitted_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(ReplicationEvent::TargetUp { target: "eu-west".into() });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received.event, ReplicationEvent::TargetUp { target } if target == "eu-west"));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(1);
        bus.emit(ReplicationEvent::SourceReconnected);
    }
}
