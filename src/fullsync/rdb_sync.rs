// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::{
    client::RedisConnection,
    dispatcher::Dispatcher,
    filter::KeyFilter,
    fullsync::{
        FullSyncReport, filter_and_dispatch,
        rdb::{RdbItem, RdbParser},
    },
    resp::command,
};

/// Strategy 2 (§4.5): issues `SYNC`, receives the RDB payload that
/// follows as a length-prefixed bulk (no trailing CRLF, unlike an
/// ordinary RESP bulk string), parses it into a stream of key records via
/// [`crate::fullsync::rdb`], and dispatches each. Requires that the
/// source permits replication commands.
///
/// This is also the transition the PSYNC driver's `FullResync` state
/// drives (§4.6): both paths share [`receive_rdb_payload`].
pub async fn run(source: &RedisConnection, filter: &KeyFilter, dispatcher: &Dispatcher) -> Result<FullSyncReport> {
    source.send_raw(command::sync()).await.context("SYNC")?;
    let payload = receive_rdb_payload(source).await.context("receiving RDB payload after SYNC")?;
    dispatch_rdb_payload(&payload, filter, dispatcher).await
}

/// Reads the `$<len>\r\n<payload>` bulk that follows a `SYNC` or a
/// `FULLRESYNC` reply. Unlike an ordinary RESP bulk string, Redis's
/// replication protocol does not terminate this payload with a trailing
/// CRLF, so it cannot be read with [`crate::resp::RespReader::read_frame`].
pub async fn receive_rdb_payload(source: &RedisConnection) -> Result<bytes::Bytes> {
    let mut reader = source.reader_mut().await;
    let header = reader.read_line().await.context("reading RDB bulk length header")?;
    let Some(len_str) = header.strip_prefix(b"$") else { bail!("expected a bulk length header ($<n>)") };
    let len: usize = std::str::from_utf8(len_str)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .context("invalid RDB bulk length")?;
    reader.read_exact_streamed(len).await.context("reading RDB payload body")
}

/// Parses an already-received RDB payload and dispatches every surviving
/// key, yielding to the runtime between records (§5 "the RDB parser must
/// yield between records") so a large payload never blocks a heartbeat.
pub async fn dispatch_rdb_payload(
    payload: &[u8],
    filter: &KeyFilter,
    dispatcher: &Dispatcher,
) -> Result<FullSyncReport> {
    let mut report = FullSyncReport::default();
    let mut parser = RdbParser::new(payload)?;

    loop {
        match parser.next_item() {
            Ok(Some(RdbItem::Key(record))) => {
                filter_and_dispatch(record, filter, dispatcher, &mut report).await;
            },
            Ok(Some(RdbItem::Skipped { key, reason })) => {
                warn!(key = %String::from_utf8_lossy(&key), reason, "rdb-sync: key structurally skipped");
                report.keys_failed += 1;
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "rdb-sync: RDB parse error, aborting this pass");
                return Err(e);
            },
        }
        tokio::task::yield_now().await;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_rdb_payload_yields_zero_migrated_keys() {
        let payload = b"REDIS0011\xFF";
        let filter = KeyFilter::from_config(&crate::cfg::config::FilterConfig::default());
        // No real dispatcher/targets needed: an empty payload never calls
        // filter_and_dispatch, so constructing one isn't necessary here —
        // exercise the parser path directly instead.
        let mut parser = RdbParser::new(payload).unwrap();
        assert!(parser.next_item().unwrap().is_none());
        let _ = filter; // keep the import meaningful without a dispatcher in this narrow test
    }
}
