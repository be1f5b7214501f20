// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Full-Sync Engine (§4.5): the initial materialization of the
//! source's current key set into each target, by one of three
//! strategies. All three funnel into the same
//! [`crate::dispatcher::Dispatcher`] path the incremental engine uses, so
//! bootstrap and steady-state share one fan-out implementation.

pub mod dump_restore;
pub mod rdb;
pub mod rdb_sync;
pub mod scan_walk;

use anyhow::Result;

use crate::{client::RedisConnection, dispatcher::Dispatcher, filter::KeyFilter, model::ChangeEvent};

/// Outcome of a completed full-sync pass, enough to emit the
/// `full-sync-complete` marker (§4.5) that gates the incremental engine
/// in hybrid mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSyncReport {
    pub keys_migrated: u64,
    pub keys_filtered: u64,
    pub keys_failed: u64,
}

/// Runs the configured strategy to completion against `source`, dispatching
/// one [`ChangeEvent`] per surviving key through `dispatcher`.
pub async fn run(
    strategy: crate::cfg::enums::FullSyncStrategy,
    source: &RedisConnection,
    filter: &KeyFilter,
    dispatcher: &Dispatcher,
    batch_size: u32,
) -> Result<FullSyncReport> {
    use crate::cfg::enums::FullSyncStrategy::*;
    match strategy {
        Scan => scan_walk::run(source, filter, dispatcher, batch_size).await,
        Sync => rdb_sync::run(source, filter, dispatcher).await,
        DumpRestore => dump_restore::run(source, filter, dispatcher, batch_size).await,
    }
}

/// Shared by every strategy: applies the filter to a freshly-read key
/// record and, if it passes, dispatches it as a synthetic change event.
/// Returns whether the dispatch hit a DUMP/RESTORE version mismatch on
/// some target, so a dump-restore strategy holding the source connection
/// can re-read and redispatch the key via the kind-specific path.
pub(crate) async fn filter_and_dispatch(
    record: crate::model::KeyRecord,
    filter: &KeyFilter,
    dispatcher: &Dispatcher,
    report: &mut FullSyncReport,
) -> bool {
    let probe = crate::filter::KeyProbe {
        key: &record.key,
        remaining_ttl_ms: record.ttl_ms,
        estimated_size: record.estimated_size(),
    };
    if !filter.accepts(&probe) {
        report.keys_filtered += 1;
        return false;
    }
    let event = ChangeEvent::new(record);
    let needs_fallback = dispatcher.dispatch(&event).await;
    report.keys_migrated += 1;
    needs_fallback
}
