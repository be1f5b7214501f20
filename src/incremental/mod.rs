// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Incremental Engine (§4.6): three interchangeable drivers —
//! periodic `SCAN`, periodic full resync, and `PSYNC` streaming — that
//! all funnel through the same dedup-then-dispatch path regardless of
//! which one is active. The dispatcher sees one producer no matter which
//! driver is running; the driver itself is the only thing that changes
//! at runtime, including mid-flight when PSYNC downgrades to Scan.

pub mod psync_driver;
pub mod scan_driver;
pub mod sync_driver;
pub mod translate;

use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{
    cfg::enums::IncrementalDriver,
    client::Supervisor,
    dedup::DedupCache,
    dispatcher::Dispatcher,
    event::{EventBus, ReplicationEvent},
    filter::{KeyFilter, KeyProbe},
    model::{ChangeEvent, KeyRecord},
    status::StatusSurface,
};

/// Everything a driver needs, bundled so the top-level [`run`] can hand
/// the same context to whichever driver is currently active (including
/// across a PSYNC-to-Scan downgrade).
pub struct DriverContext {
    pub source: Arc<Supervisor>,
    pub filter: KeyFilter,
    pub dispatcher: Arc<Dispatcher>,
    pub dedup: Arc<DedupCache>,
    pub status: Arc<StatusSurface>,
    pub events: EventBus,
    pub shutdown: tokio_util::sync::CancellationToken,
    /// Scan/Sync tick interval (`sync.incremental_sync.interval`).
    pub interval: Duration,
    /// `sync.incremental_sync.max_changes_per_sync`, a safety valve on how
    /// many keys a single tick re-reads; overflow is picked up on the next
    /// tick rather than dropped, since the key stays tracked either way.
    pub max_changes_per_sync: Option<u32>,
}

/// How a driver's run loop ended.
pub enum DriverSignal {
    ShutDown,
    /// Three consecutive PSYNC handshake failures (§7): fall back to the
    /// Scan driver rather than spin forever against a source that refuses
    /// replication.
    Downgrade,
}

/// A per-tick cap on how many keys get re-read and (potentially)
/// dispatched. `None` means unbounded.
pub struct ChangeBudget(Option<u32>);

impl ChangeBudget {
    pub fn new(max: Option<u32>) -> Self {
        Self(max)
    }

    /// Returns `true` if the caller may proceed; decrements the remaining
    /// budget. Once exhausted, always returns `false`.
    pub fn try_consume(&mut self) -> bool {
        match &mut self.0 {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            },
        }
    }
}

/// Runs the configured driver until shutdown, transparently switching to
/// the Scan driver on a PSYNC downgrade. Never returns until `ctx.shutdown`
/// is cancelled.
pub async fn run(initial: IncrementalDriver, ctx: DriverContext) {
    let mut active = initial;
    loop {
        ctx.status.set_driver_state(&format!("{active}:init"));
        let signal = match active {
            IncrementalDriver::Scan => scan_driver::run(&ctx).await,
            IncrementalDriver::Sync => sync_driver::run(&ctx).await,
            IncrementalDriver::Psync => psync_driver::run(&ctx).await,
        };
        match signal {
            DriverSignal::ShutDown => return,
            DriverSignal::Downgrade => {
                warn!(from = %active, to = "scan", "incremental engine: downgrading driver");
                ctx.events.emit(ReplicationEvent::DriverStateChanged {
                    driver: "scan",
                    state: format!("downgraded from {active}"),
                });
                active = IncrementalDriver::Scan;
            },
        }
    }
}

/// Shared by every driver: applies the Key Filter, then the Dedup Cache,
/// then dispatches to every target. This is the single point where a
/// driver-produced record becomes a fanned-out write (§4.4 "shared across
/// the driver and dispatcher").
pub(crate) async fn emit_change(ctx: &DriverContext, record: KeyRecord) {
    let probe =
        KeyProbe { key: &record.key, remaining_ttl_ms: record.ttl_ms, estimated_size: record.estimated_size() };
    if !ctx.filter.accepts(&probe) {
        return;
    }

    let event = ChangeEvent::new(record);
    if ctx.dedup.check_and_insert(event.fingerprint).await {
        return;
    }

    ctx.dispatcher.dispatch(&event).await;
}

/// Sleeps for `delay`, or returns early (with `true`) if shutdown is
/// signaled first. Shared by every driver's backoff/idle wait.
pub(crate) async fn sleep_or_shutdown(ctx: &DriverContext, delay: Duration) -> bool {
    tokio::select! {
        _ = ctx.shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_unbounded_by_default() {
        let mut b = ChangeBudget::new(None);
        for _ in 0..1000 {
            assert!(b.try_consume());
        }
    }

    #[test]
    fn budget_exhausts_at_the_configured_cap() {
        let mut b = ChangeBudget::new(Some(2));
        assert!(b.try_consume());
        assert!(b.try_consume());
        assert!(!b.try_consume());
    }
}
