// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PSYNC driver (§4.6, the design focal point): `Init -> Handshake ->
//! FullResync -> Streaming -> Backoff -> Handshake`. Advertises a
//! listening port and EOF/PSYNC2 capabilities, requests a full or partial
//! resync depending on whether a cursor survives from a previous
//! connection, consumes the RDB bulk on `FULLRESYNC` the same way the
//! `Sync` full-sync strategy does, then streams and translates inline
//! commands while sending a `REPLCONF ACK` every second.
//!
//! Three consecutive handshake failures signal [`DriverSignal::Downgrade`]
//! to the caller, which falls back to the Scan driver (§7).

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::{
    cfg::enums::DataKind,
    client::{Backoff, RedisConnection},
    codec,
    event::ReplicationEvent,
    fullsync::rdb_sync,
    incremental::{
        DriverContext, DriverSignal, emit_change, sleep_or_shutdown,
        translate::{Translated, classify},
    },
    model::{KeyRecord, ReplicationCursor},
    resp::{RespFrame, command},
};

/// Purely advisory: this engine never accepts inbound connections from
/// the source, so the exact value doesn't matter, only that `REPLCONF
/// listening-port` is sent per the handshake contract.
const ADVERTISED_LISTENING_PORT: u16 = 0;

const MAX_CONSECUTIVE_HANDSHAKE_FAILURES: u32 = 3;

enum StreamOutcome {
    ShutDown,
    /// The connection was lost (or ACK failed) after a successful
    /// handshake; retry with the surviving cursor rather than counting
    /// this against the handshake-failure streak.
    Disconnected,
}

pub async fn run(ctx: &DriverContext) -> DriverSignal {
    let mut cursor = ReplicationCursor::unknown();
    let mut consecutive_handshake_failures = 0u32;
    let mut backoff = Backoff::default_target();

    loop {
        ctx.status.set_driver_state("psync:handshake");
        match handshake_and_stream(ctx, &mut cursor).await {
            Ok(StreamOutcome::ShutDown) => return DriverSignal::ShutDown,
            Ok(StreamOutcome::Disconnected) => {
                consecutive_handshake_failures = 0;
                backoff.reset();
                ctx.status.set_driver_state("psync:backoff");
                if sleep_or_shutdown(ctx, backoff.next()).await {
                    return DriverSignal::ShutDown;
                }
            },
            Err(e) => {
                consecutive_handshake_failures += 1;
                warn!(
                    error = %e,
                    attempt = consecutive_handshake_failures,
                    "psync driver: handshake failed"
                );
                ctx.events.emit(ReplicationEvent::DriverStateChanged {
                    driver: "psync",
                    state: format!("handshake-failed (attempt {consecutive_handshake_failures})"),
                });

                if consecutive_handshake_failures >= MAX_CONSECUTIVE_HANDSHAKE_FAILURES {
                    warn!(
                        "psync driver: giving up after {MAX_CONSECUTIVE_HANDSHAKE_FAILURES} \
                         consecutive handshake failures, downgrading to scan driver"
                    );
                    return DriverSignal::Downgrade;
                }

                ctx.status.set_driver_state("psync:backoff");
                if sleep_or_shutdown(ctx, backoff.next()).await {
                    return DriverSignal::ShutDown;
                }
            },
        }
    }
}

async fn handshake_and_stream(ctx: &DriverContext, cursor: &mut ReplicationCursor) -> Result<StreamOutcome> {
    let source = ctx.source.acquire().await.context("acquiring source session for PSYNC")?;

    source
        .command(command::replconf_listening_port(ADVERTISED_LISTENING_PORT))
        .await
        .context("REPLCONF listening-port")?;
    source.command(command::replconf_capa_eof()).await.context("REPLCONF capa")?;

    let psync_cmd = if cursor.is_known() {
        command::psync(&cursor.replid, cursor.offset as i64)
    } else {
        command::psync("?", -1)
    };
    source.send_raw(psync_cmd).await.context("PSYNC")?;

    let reply_line = {
        let mut reader = source.reader_mut().await;
        reader.read_line().await.context("reading PSYNC reply line")?
    };
    let reply_text = String::from_utf8_lossy(&reply_line);
    let reply_text = reply_text.trim_start_matches('+').trim();

    if let Some(rest) = reply_text.strip_prefix("FULLRESYNC") {
        let mut parts = rest.split_whitespace();
        let replid = parts.next().context("FULLRESYNC reply missing replid")?.to_string();
        let offset: u64 = parts
            .next()
            .context("FULLRESYNC reply missing offset")?
            .parse()
            .context("FULLRESYNC offset not numeric")?;
        cursor.on_fullresync(replid, offset);

        let payload =
            rdb_sync::receive_rdb_payload(&source).await.context("receiving FULLRESYNC RDB payload")?;
        let report = rdb_sync::dispatch_rdb_payload(&payload, &ctx.filter, &ctx.dispatcher)
            .await
            .context("applying FULLRESYNC RDB payload")?;
        ctx.events.emit(ReplicationEvent::FullSyncComplete { keys_migrated: report.keys_migrated });
        info!(
            keys_migrated = report.keys_migrated,
            replid = %cursor.replid,
            offset = cursor.offset,
            "psync driver: FULLRESYNC applied"
        );
    } else if let Some(rest) = reply_text.strip_prefix("CONTINUE") {
        let replid = rest.trim();
        if !replid.is_empty() {
            cursor.replid = replid.to_string();
        }
        info!(replid = %cursor.replid, offset = cursor.offset, "psync driver: partial resync accepted");
    } else {
        bail!("unrecognized PSYNC reply: {reply_text}");
    }

    ctx.status.set_driver_state("psync:streaming");
    ctx.status.set_psync_offset(cursor.offset);
    stream_commands(ctx, cursor, &source).await
}

async fn stream_commands(
    ctx: &DriverContext,
    cursor: &mut ReplicationCursor,
    source: &RedisConnection,
) -> Result<StreamOutcome> {
    let mut ack_interval = tokio::time::interval(std::time::Duration::from_secs(1));
    ack_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ack_interval.tick().await; // the first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => return Ok(StreamOutcome::ShutDown),
            _ = ack_interval.tick() => {
                if let Err(e) = source.send_raw(command::replconf_ack(cursor.offset)).await {
                    warn!(error = %e, "psync driver: REPLCONF ACK failed");
                    return Ok(StreamOutcome::Disconnected);
                }
            },
            frame = source.read_stream_frame_counted() => {
                let (frame, consumed) = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "psync driver: stream read failed");
                        return Ok(StreamOutcome::Disconnected);
                    },
                };
                cursor.advance(consumed as u64);
                ctx.status.set_psync_offset(cursor.offset);
                apply_streamed_command(ctx, source, &frame).await;
            },
        }
    }
}

async fn apply_streamed_command(ctx: &DriverContext, source: &RedisConnection, frame: &RespFrame) {
    match classify(frame) {
        Translated::Touched(key) => match codec::read_key(source, &key).await {
            Ok(Some(record)) => emit_change(ctx, record).await,
            Ok(None) => emit_change(ctx, KeyRecord::tombstone(key, DataKind::String)).await,
            Err(e) => {
                warn!(key = %String::from_utf8_lossy(&key), error = %e, "psync driver: failed to re-read touched key");
            },
        },
        Translated::Removed(key) => emit_change(ctx, KeyRecord::tombstone(key, DataKind::String)).await,
        Translated::Global => {
            debug!("psync driver: observed a keyspace-wide command; convergence deferred to the next full sync");
        },
        Translated::Unsupported => {
            if let Some(name) = frame.as_array().and_then(|items| items.first()).and_then(|f| f.as_bytes()) {
                debug!(command = %String::from_utf8_lossy(name), "psync driver: unsupported replication command, skipping");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn advertised_port_is_a_placeholder_not_a_real_listener() {
        // Documents intent rather than behavior: this engine never binds
        // ADVERTISED_LISTENING_PORT to anything.
        assert_eq!(ADVERTISED_LISTENING_PORT, 0);
    }

    #[test]
    fn fullresync_reply_parses_replid_and_offset() {
        let line = "FULLRESYNC abc123def 555";
        let rest = line.strip_prefix("FULLRESYNC").unwrap();
        let mut parts = rest.split_whitespace();
        assert_eq!(parts.next(), Some("abc123def"));
        assert_eq!(parts.next(), Some("555"));
    }

    #[test]
    fn tombstone_from_removed_key_carries_no_ttl() {
        let r = KeyRecord::tombstone(Bytes::from_static(b"gone"), DataKind::String);
        assert!(r.is_tombstone());
    }
}
