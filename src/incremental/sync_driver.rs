// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sync driver (§4.6): every tick, performs a full `SYNC`-based resync
//! and re-dispatches every surviving key through the same dedup path the
//! other drivers use. The simplest of the three drivers, and the
//! fallback of last resort for sources that speak old-style `SYNC` but
//! not `PSYNC`.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    fullsync::{
        rdb::{RdbItem, RdbParser},
        rdb_sync::receive_rdb_payload,
    },
    incremental::{ChangeBudget, DriverContext, DriverSignal, emit_change, sleep_or_shutdown},
    resp::command,
};

pub async fn run(ctx: &DriverContext) -> DriverSignal {
    loop {
        if sleep_or_shutdown(ctx, ctx.interval).await {
            return DriverSignal::ShutDown;
        }
        ctx.status.set_driver_state("sync");
        if let Err(e) = run_one_tick(ctx).await {
            warn!(error = %e, "sync driver: full resync pass failed, retrying next tick");
        }
    }
}

async fn run_one_tick(ctx: &DriverContext) -> Result<()> {
    let source = ctx.source.acquire().await.context("acquiring source session")?;
    source.send_raw(command::sync()).await.context("SYNC")?;
    let payload = receive_rdb_payload(&source).await.context("receiving RDB payload after SYNC")?;

    let mut parser = RdbParser::new(&payload)?;
    let mut budget = ChangeBudget::new(ctx.max_changes_per_sync);
    let mut migrated = 0u64;
    let mut skipped = 0u64;

    loop {
        match parser.next_item()? {
            Some(RdbItem::Key(record)) => {
                if budget.try_consume() {
                    emit_change(ctx, record).await;
                    migrated += 1;
                }
            },
            Some(RdbItem::Skipped { key, reason }) => {
                warn!(key = %String::from_utf8_lossy(&key), reason, "sync driver: key structurally skipped");
                skipped += 1;
            },
            None => break,
        }
        tokio::task::yield_now().await;
    }

    info!(migrated, skipped, "sync driver: full resync pass complete");
    Ok(())
}
