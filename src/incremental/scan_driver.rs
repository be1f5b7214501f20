// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Scan driver (§4.6): every tick, walks the whole keyspace with `SCAN`
//! and treats a key as changed when `OBJECT IDLETIME` is smaller than the
//! tick interval, one unified walk regardless of how many targets are
//! configured. Deletions are inferred by diffing against the previous
//! tick's key set, so a key missed between `SCAN` and its `OBJECT
//! IDLETIME` check is only detected as gone on the tick *after* it
//! actually vanished — an accepted imprecision of this heuristic (§9).

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    cfg::enums::DataKind,
    client::RedisConnection,
    codec,
    incremental::{ChangeBudget, DriverContext, DriverSignal, emit_change, sleep_or_shutdown},
    model::KeyRecord,
    resp::command,
};

/// Slack added to the tick interval when deciding whether a key's idle
/// time means "changed this tick": the scan itself takes nonzero time, so
/// a key idle for exactly `interval` seconds may have been touched just
/// before this tick's scan began.
const IDLE_EPSILON_SECS: u64 = 2;

pub async fn run(ctx: &DriverContext) -> DriverSignal {
    let mut prior_keys: HashSet<Bytes> = HashSet::new();

    loop {
        if sleep_or_shutdown(ctx, ctx.interval).await {
            return DriverSignal::ShutDown;
        }
        ctx.status.set_driver_state("scan");
        prior_keys = run_one_tick(ctx, prior_keys).await;
    }
}

async fn run_one_tick(ctx: &DriverContext, prior_keys: HashSet<Bytes>) -> HashSet<Bytes> {
    let source = match ctx.source.acquire().await {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "scan driver: source unavailable this tick");
            return prior_keys;
        },
    };

    let idle_threshold = ctx.interval.as_secs() + IDLE_EPSILON_SECS;
    let mut budget = ChangeBudget::new(ctx.max_changes_per_sync);
    let mut current_keys = HashSet::with_capacity(prior_keys.len());
    let mut cursor: u64 = 0;

    loop {
        let reply = match source.command(command::scan(cursor, None, 1000)).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "scan driver: SCAN failed, aborting this tick");
                return prior_keys;
            },
        };
        let Some(top) = reply.as_array() else {
            warn!("scan driver: SCAN reply was not an array");
            return prior_keys;
        };
        let [next_cursor, keys] = top else {
            warn!("scan driver: SCAN reply did not have 2 elements");
            return prior_keys;
        };
        let Some(next_cursor) = next_cursor.as_bytes() else { return prior_keys };
        let Some(parsed_cursor) = std::str::from_utf8(next_cursor).ok().and_then(|s| s.parse().ok()) else {
            return prior_keys;
        };
        cursor = parsed_cursor;
        let Some(keys) = keys.as_array() else { return prior_keys };

        for key_frame in keys {
            let Some(key) = key_frame.as_bytes() else { continue };
            let key = Bytes::copy_from_slice(key);
            current_keys.insert(key.clone());

            if !budget.try_consume() {
                continue; // carried to the next tick; still tracked above for deletion detection
            }

            handle_possibly_changed_key(ctx, &source, key, idle_threshold).await;
        }

        if cursor == 0 {
            break;
        }
    }

    for gone in prior_keys.difference(&current_keys) {
        emit_change(ctx, KeyRecord::tombstone(gone.clone(), DataKind::String)).await;
    }

    current_keys
}

async fn handle_possibly_changed_key(
    ctx: &DriverContext,
    source: &RedisConnection,
    key: Bytes,
    idle_threshold: u64,
) {
    let idle_secs = match source.command(command::object_idletime(&key)).await {
        Ok(reply) => reply.as_integer(),
        Err(_) => None, // key vanished between SCAN and this check; picked up by the next tick's diff
    };
    let Some(idle_secs) = idle_secs else { return };
    if idle_secs as u64 >= idle_threshold {
        return; // idle longer than one tick: not newly changed
    }

    match codec::read_key(source, &key).await {
        Ok(Some(record)) => emit_change(ctx, record).await,
        Ok(None) => emit_change(ctx, KeyRecord::tombstone(key, DataKind::String)).await,
        Err(e) => {
            warn!(key = %String::from_utf8_lossy(&key), error = %e, "scan driver: failed to read changed key");
        },
    }
}
