// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The opaque `DUMP`/`RESTORE` fast path (§4.3): bypasses the per-kind
//! encode/decode switch entirely. Requires source and target to run
//! compatible serialization versions; callers are expected to fall back
//! to the kind-specific codec for a key when [`write`] returns an error
//! whose message indicates a version/checksum mismatch (see
//! [`is_version_mismatch`]).

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{client::RedisConnection, error::EngineError, model::key_record::TTL_MISSING, resp::command};

/// One key's opaque `DUMP` payload plus the metadata RESTORE needs to
/// reproduce it faithfully on the target.
pub struct DumpedKey {
    pub payload: Bytes,
    pub ttl_ms: i64,
    pub idle_seconds: u64,
}

/// Reads `DUMP`, `PTTL`, and `OBJECT IDLETIME` for one key. Returns
/// `Ok(None)` if the key no longer exists.
pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Option<DumpedKey>> {
    let dump_reply = source.command(command::dump(key)).await.context("DUMP")?;
    let Some(payload) = dump_reply.as_bytes() else { return Ok(None) };
    let payload = Bytes::copy_from_slice(payload);

    let ttl_reply = source.command(command::pttl(key)).await.context("PTTL")?;
    let ttl_ms = ttl_reply.as_integer().context("PTTL reply not an integer")?;
    if ttl_ms == TTL_MISSING {
        return Ok(None);
    }

    let idle_reply = source.command(command::object_idletime(key)).await.context("OBJECT IDLETIME")?;
    let idle_seconds = idle_reply.as_integer().unwrap_or(0).max(0) as u64;

    Ok(Some(DumpedKey { payload, ttl_ms, idle_seconds }))
}

/// Applies a `DumpedKey` with `RESTORE ... REPLACE IDLETIME`. `ttl_ms` of
/// `0`/`-1` (no expiry/persistent) is passed through as a `0` TTL argument
/// to RESTORE, which Redis treats as "no expiry".
pub async fn write(target: &RedisConnection, key: &[u8], dumped: &DumpedKey) -> Result<()> {
    let ttl_arg = dumped.ttl_ms.max(0) as u64;
    let reply = target
        .command(command::restore_replace_idletime(key, ttl_arg, &dumped.payload, dumped.idle_seconds))
        .await
        .context("RESTORE")?;
    if reply.is_error() {
        bail!("RESTORE failed");
    }
    Ok(())
}

/// Writes a pre-fetched `DUMP` payload without the IDLETIME preservation,
/// used by the streaming incremental path where a blob arrives without a
/// separately-measured idle time.
pub async fn write_key(
    target: &RedisConnection,
    key: &[u8],
    payload: &Bytes,
    ttl_ms: i64,
) -> Result<(), EngineError> {
    let ttl_arg = ttl_ms.max(0) as u64;
    target.command(command::restore_replace(key, ttl_arg, payload)).await?;
    Ok(())
}

/// Heuristic classification of a RESTORE failure as a serialization
/// version/checksum mismatch (as opposed to e.g. a transport error),
/// matching the wording Redis uses for this specific failure.
pub fn is_version_mismatch(err: &EngineError) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("bad data format") || msg.contains("dump payload version or checksum")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_version_mismatch_wording() {
        let e = EngineError::Protocol("ERR Bad data format".to_string());
        assert!(is_version_mismatch(&e));
        let e = EngineError::Protocol("DUMP payload version or checksum are wrong".to_string());
        assert!(is_version_mismatch(&e));
        let e = EngineError::Protocol("connection reset by peer".to_string());
        assert!(!is_version_mismatch(&e));
    }
}
