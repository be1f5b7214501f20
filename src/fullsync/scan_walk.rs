// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::{
    client::RedisConnection,
    codec,
    dispatcher::Dispatcher,
    filter::KeyFilter,
    fullsync::{FullSyncReport, filter_and_dispatch},
    resp::command,
};

/// Strategy 1 (§4.5): iterates `SCAN` on the source with cursor 0 and
/// `COUNT = batch_size`, reading and dispatching every key it sees.
/// Stops once the cursor returns to 0.
///
/// Ordering guarantee: every key present at scan-start either appears at
/// its scan-time value or is superseded by a later incremental update; no
/// ordering is promised between distinct keys.
pub async fn run(
    source: &RedisConnection,
    filter: &KeyFilter,
    dispatcher: &Dispatcher,
    batch_size: u32,
) -> Result<FullSyncReport> {
    let mut report = FullSyncReport::default();
    let mut cursor: u64 = 0;

    loop {
        let reply = source.command(command::scan(cursor, None, batch_size as usize)).await.context("SCAN")?;
        let Some(top) = reply.as_array() else { bail!("SCAN reply was not an array") };
        let [next_cursor, keys] = top else { bail!("SCAN reply did not have 2 elements") };

        let next_cursor = next_cursor.as_bytes().context("SCAN cursor not a bulk string")?;
        cursor = std::str::from_utf8(next_cursor)
            .ok()
            .and_then(|s| s.parse().ok())
            .context("SCAN cursor not a valid integer")?;

        let Some(keys) = keys.as_array() else { bail!("SCAN key list was not an array") };
        for key_frame in keys {
            let Some(key) = key_frame.as_bytes() else { continue };
            match codec::read_key(source, key).await {
                Ok(Some(record)) => {
                    filter_and_dispatch(record, filter, dispatcher, &mut report).await;
                },
                Ok(None) => {}, // deleted between SCAN and read; nothing to migrate
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(key), error = %e, "scan-walk: failed to read key, skipping");
                    report.keys_failed += 1;
                },
            }
        }

        if cursor == 0 {
            break;
        }
    }

    Ok(report)
}
