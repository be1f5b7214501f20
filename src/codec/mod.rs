// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Value Codec (§4.3): reads a key's type and value from the source
//! and applies it to a target, preserving TTL. One submodule per Redis
//! data kind, plus an opaque DUMP/RESTORE fallback that short-circuits
//! the kind switch entirely.

pub mod dump;
pub mod hash;
pub mod list;
pub mod set;
pub mod sorted_set;
pub mod string;
pub mod stream;

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{
    cfg::enums::DataKind,
    client::RedisConnection,
    error::EngineError,
    model::key_record::{KeyRecord, Payload, TTL_MISSING, TTL_NONE, TTL_PERSISTENT},
    resp::command,
};

/// Reads one key's current type, value, and remaining TTL off `source`.
/// Returns `Ok(None)` when the key no longer exists (caller should emit a
/// tombstone instead).
pub async fn read_key(source: &RedisConnection, key: &[u8]) -> Result<Option<KeyRecord>> {
    let type_reply = source.command(command::ttype(key)).await.context("TYPE")?;
    let Some(type_name) = type_reply.as_bytes() else { bail!("TYPE returned no data") };
    let type_name = std::str::from_utf8(type_name).context("TYPE reply not utf8")?;
    if type_name == "none" {
        return Ok(None);
    }
    let Some(kind) = DataKind::from_type_reply(type_name) else {
        bail!("unsupported data kind from TYPE: {type_name}");
    };

    let ttl_ms = read_pttl(source, key).await?;
    if ttl_ms == TTL_MISSING {
        return Ok(None);
    }

    let payload = match kind {
        DataKind::String => string::read(source, key).await?,
        DataKind::Hash => hash::read(source, key).await?,
        DataKind::List => list::read(source, key).await?,
        DataKind::Set => set::read(source, key).await?,
        DataKind::SortedSet => sorted_set::read(source, key).await?,
        DataKind::Stream => stream::read(source, key).await?,
    };

    Ok(Some(KeyRecord { key: Bytes::copy_from_slice(key), kind, payload, ttl_ms }))
}

/// Applies one key record to `target`, preserving TTL per the table in
/// §4.3: a positive PTTL becomes PEXPIRE, -1 (persistent) suppresses it,
/// -2 (missing) turns the write into a DEL.
///
/// A plain RESP `-ERR` reply from any of the per-kind writes is
/// reclassified into [`EngineError::Codec`] here so the dispatcher can
/// tell a per-key write failure apart from [`EngineError::Transport`]
/// (§7's "per-key codec errors" vs. "transport error" taxonomy entries).
/// A DUMP/RESTORE version mismatch gets the distinguished
/// `dump_version_mismatch` kind so the full-sync caller that still holds
/// the source connection can fall back to the kind-specific path for
/// that key (§4.3).
pub async fn write_key(target: &RedisConnection, record: &KeyRecord, preserve_ttl: bool) -> Result<(), EngineError> {
    write_key_inner(target, record, preserve_ttl).await.map_err(|e| match e {
        EngineError::Protocol(detail) => {
            EngineError::Codec { key: String::from_utf8_lossy(&record.key).to_string(), kind: "write", detail }
        },
        other => other,
    })
}

async fn write_key_inner(
    target: &RedisConnection,
    record: &KeyRecord,
    preserve_ttl: bool,
) -> Result<(), EngineError> {
    if record.is_tombstone() {
        target.command(command::del(&record.key)).await?;
        return Ok(());
    }

    match &record.payload {
        Payload::String(v) => string::write(target, &record.key, v).await?,
        Payload::Hash(fields) => hash::write(target, &record.key, fields).await?,
        Payload::List(items) => list::write(target, &record.key, items).await?,
        Payload::Set(members) => set::write(target, &record.key, members).await?,
        Payload::SortedSet(members) => sorted_set::write(target, &record.key, members).await?,
        Payload::Stream(entries) => stream::write(target, &record.key, entries).await?,
        Payload::Dump(blob) => {
            return dump::write_key(target, &record.key, blob, record.ttl_ms).await.map_err(|e| {
                if dump::is_version_mismatch(&e) {
                    EngineError::Codec {
                        key: String::from_utf8_lossy(&record.key).to_string(),
                        kind: "dump_version_mismatch",
                        detail: e.to_string(),
                    }
                } else {
                    e
                }
            });
        },
        Payload::Tombstone => unreachable!("is_tombstone() already handled above"),
    }

    if preserve_ttl {
        apply_ttl(target, &record.key, record.ttl_ms).await?;
    }
    Ok(())
}

/// Translates a source `PTTL` reply into the record's `ttl_ms` sentinel:
/// `-1` (persistent) becomes [`TTL_NONE`], `-2` (missing) stays
/// [`TTL_MISSING`], and any non-negative value passes through unchanged.
async fn read_pttl(source: &RedisConnection, key: &[u8]) -> Result<i64> {
    let reply = source.command(command::pttl(key)).await.context("PTTL")?;
    let ms = reply.as_integer().context("PTTL reply not an integer")?;
    Ok(match ms {
        TTL_PERSISTENT => TTL_NONE,
        other => other,
    })
}

/// Shared by every multi-valued kind's `read()` to pull a `Bytes` out of a
/// bulk/simple-string reply element, rejecting anything else.
pub(crate) fn bytes_of(frame: &crate::resp::RespFrame) -> Result<Bytes> {
    frame.as_bytes().map(Bytes::copy_from_slice).context("expected a bulk string element")
}

async fn apply_ttl(target: &RedisConnection, key: &[u8], ttl_ms: i64) -> Result<(), EngineError> {
    match ttl_ms {
        TTL_NONE => {
            target.command(command::persist(key)).await?;
        },
        TTL_MISSING => {
            target.command(command::del(key)).await?;
        },
        positive if positive > 0 => {
            target.command(command::pexpire(key, positive as u64)).await?;
        },
        other => {
            return Err(EngineError::Protocol(format!("unexpected ttl_ms sentinel: {other}")));
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_sentinels_are_distinct() {
        assert_ne!(TTL_NONE, TTL_MISSING);
        assert_ne!(TTL_NONE, TTL_PERSISTENT);
    }
}
