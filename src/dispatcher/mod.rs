// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Fan-out Dispatcher (§4.7): for a given change event, concurrently
//! applies it to all enabled targets, tracks per-target success, and
//! drives the per-target failover transitions in
//! [`crate::health::HealthMonitor`].
//!
//! Concurrency across targets is parallel and independent — one slow or
//! broken target must never delay the others — bounded by a worker
//! semaphore (`service.performance.max_workers`, §5's "small pool of
//! worker tasks"). Within a single target, events are applied FIFO
//! because each target's pipeline only ever has one in-flight write at a
//! time (the dispatcher awaits its own `tokio::spawn` per event before
//! returning, and callers drive one event through `dispatch` at a time).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    client::Supervisor,
    codec,
    error::EngineError,
    event::{EventBus, ReplicationEvent},
    filter::{KeyFilter, KeyProbe},
    health::HealthMonitor,
    model::ChangeEvent,
    status::StatusSurface,
};

/// Everything the dispatcher needs to apply one change event to one
/// target.
pub struct TargetPipeline {
    pub name: String,
    pub supervisor: Arc<Supervisor>,
    /// Falls back to the global filter when a target has no override
    /// (§4.7 "Key Filter with target-specific overrides if any").
    pub filter_override: Option<KeyFilter>,
    pub preserve_ttl: bool,
}

pub struct Dispatcher {
    targets: Vec<TargetPipeline>,
    default_filter: KeyFilter,
    health: Arc<HealthMonitor>,
    status: Arc<StatusSurface>,
    events: EventBus,
    workers: Arc<tokio::sync::Semaphore>,
}

impl Dispatcher {
    pub fn new(
        targets: Vec<TargetPipeline>,
        default_filter: KeyFilter,
        health: Arc<HealthMonitor>,
        status: Arc<StatusSurface>,
        events: EventBus,
        max_workers: usize,
    ) -> Self {
        Self {
            targets,
            default_filter,
            health,
            status,
            events,
            workers: Arc::new(tokio::sync::Semaphore::new(max_workers.max(1))),
        }
    }

    /// The per-target supervisors, handed to the engine's health-tick loop
    /// so it can PING every target session alongside the source (§4.1).
    pub fn target_supervisors(&self) -> Vec<Arc<Supervisor>> {
        self.targets.iter().map(|t| t.supervisor.clone()).collect()
    }

    /// Applies `event` to every `Active` target concurrently and returns
    /// once every per-target attempt has terminated (success, recorded
    /// failure, or filtered-out skip).
    ///
    /// Returns `true` if at least one target hit a DUMP/RESTORE version
    /// mismatch on this key, signalling to a full-sync strategy that still
    /// holds the source connection that it should re-read the key via the
    /// kind-specific path and dispatch it again (§4.3's fallback).
    pub async fn dispatch(&self, event: &ChangeEvent) -> bool {
        let mut set = tokio::task::JoinSet::new();

        for target in &self.targets {
            if !self.health.is_attemptable(&target.name) {
                continue;
            }
            let permit = self.workers.clone().acquire_owned().await.expect("semaphore never closed");
            let event = event.clone();
            let name = target.name.clone();
            let supervisor = target.supervisor.clone();
            let filter = target.filter_override.clone().unwrap_or_else(|| self.default_filter.clone());
            let preserve_ttl = target.preserve_ttl;
            let health = self.health.clone();
            let status = self.status.clone();
            let events = self.events.clone();

            set.spawn(async move {
                let _permit = permit;
                apply_to_one(&event, &name, &supervisor, &filter, preserve_ttl, &health, &status, &events)
                    .await
            });
        }

        let mut needs_fallback = false;
        while let Some(res) = set.join_next().await {
            if matches!(res, Ok(true)) {
                needs_fallback = true;
            }
        }
        needs_fallback
    }
}

/// Applies `event` to one target. Returns `true` if the failure was a
/// DUMP/RESTORE version mismatch, the one codec failure the caller can
/// resolve by re-dispatching through a different path.
async fn apply_to_one(
    event: &ChangeEvent,
    name: &str,
    supervisor: &Arc<Supervisor>,
    filter: &KeyFilter,
    preserve_ttl: bool,
    health: &Arc<HealthMonitor>,
    status: &Arc<StatusSurface>,
    events: &EventBus,
) -> bool {
    let probe = KeyProbe {
        key: &event.record.key,
        remaining_ttl_ms: event.record.ttl_ms,
        estimated_size: event.record.estimated_size(),
    };
    if !filter.accepts(&probe) {
        return false;
    }

    let conn = match supervisor.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            debug!(target = name, error = %e, "target session unavailable, skipping this tick");
            health.record_failure(name, &e.to_string());
            status.record_failed(name, &e.to_string());
            return false;
        },
    };

    match codec::write_key(&conn, &event.record, preserve_ttl).await {
        Ok(()) => {
            health.record_success(name);
            status.record_applied(name);
            false
        },
        Err(e) => {
            warn!(target = name, key = %String::from_utf8_lossy(&event.record.key), error = %e, "codec write failed");
            health.record_failure(name, &e.to_string());
            status.record_failed(name, &e.to_string());
            events.emit(ReplicationEvent::KeyCodecError {
                target: name.to_string(),
                key: String::from_utf8_lossy(&event.record.key).to_string(),
                detail: e.to_string(),
            });
            // Only a transport-classed failure means the session itself is
            // no longer good (§7); an ordinary per-key codec error (a bad
            // RESP reply, a version mismatch) leaves a perfectly healthy
            // target session in place.
            if matches!(e, EngineError::Transport { .. }) {
                supervisor.mark_broken().await;
            }
            e.is_dump_version_mismatch()
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::{
        cfg::{config::FilterConfig, enums::DataKind},
        client::Backoff,
        model::{Endpoint, KeyRecord, Payload, key_record::TTL_NONE},
    };

    fn make_event() -> ChangeEvent {
        let record = KeyRecord {
            key: Bytes::from_static(b"user:1"),
            kind: DataKind::String,
            payload: Payload::String(Bytes::from_static(b"alice")),
            ttl_ms: TTL_NONE,
        };
        ChangeEvent::new(record)
    }

    #[tokio::test]
    async fn dispatch_skips_disabled_and_cooling_targets_without_panicking() {
        let events = EventBus::new(8);
        let health = Arc::new(HealthMonitor::new(
            ["t1".to_string()],
            1,
            Duration::from_secs(120),
            events.clone(),
        ));
        health.disable("t1");
        let status = Arc::new(StatusSurface::new(["t1".to_string()], health.clone()));

        let endpoint = Endpoint {
            name: Some("t1".into()),
            host: "127.0.0.1".into(),
            port: 1,
            db: 0,
            password: None,
            connect_timeout: Duration::from_millis(50),
            read_timeout: Duration::from_millis(50),
            keepalive: true,
        };
        let supervisor = Supervisor::new(endpoint, Backoff::default_target(), Some(1));
        let pipeline = TargetPipeline {
            name: "t1".to_string(),
            supervisor,
            filter_override: None,
            preserve_ttl: true,
        };
        let filter = KeyFilter::from_config(&FilterConfig::default());
        let dispatcher = Dispatcher::new(vec![pipeline], filter, health, status, events, 4);

        // Disabled target must be skipped entirely: dispatch must return
        // promptly without attempting to acquire a (dead) connection.
        let start = std::time::Instant::now();
        dispatcher.dispatch(&make_event()).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
