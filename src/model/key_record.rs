// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::cfg::enums::DataKind;

/// TTL sentinel meaning "no expiry".
pub const TTL_NONE: i64 = 0;
/// TTL sentinel meaning "key missing / tombstone".
pub const TTL_MISSING: i64 = -2;
/// TTL sentinel meaning "persistent" emitted by a Redis `PTTL` of -1 before
/// it is translated into [`TTL_NONE`] by the codec.
pub const TTL_PERSISTENT: i64 = -1;

/// Kind-specific serialized payload for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    String(Bytes),
    Hash(Vec<(Bytes, Bytes)>),
    List(Vec<Bytes>),
    Set(Vec<Bytes>),
    SortedSet(Vec<(Bytes, f64)>),
    Stream(Vec<StreamEntry>),
    /// Opaque `DUMP` blob carried by the dump-restore fast path, bypassing
    /// the per-kind encode/decode switch entirely.
    Dump(Bytes),
    /// The key no longer exists on the source. Used together with
    /// `ttl_ms == TTL_MISSING`.
    Tombstone,
}

/// One `XRANGE`/`XADD` entry: a stream ID plus its field/value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// One key's current value as read from the source, transient for the
/// lifetime of a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub key: Bytes,
    pub kind: DataKind,
    pub payload: Payload,
    /// Remaining TTL in milliseconds. `0` = no expiry, `>0` = milliseconds
    /// remaining, `TTL_MISSING` = tombstone.
    pub ttl_ms: i64,
}

impl KeyRecord {
    pub fn tombstone(key: impl Into<Bytes>, kind: DataKind) -> Self {
        Self { key: key.into(), kind, payload: Payload::Tombstone, ttl_ms: TTL_MISSING }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.payload, Payload::Tombstone) || self.ttl_ms == TTL_MISSING
    }

    /// Rough serialized-size estimate used by the key filter's
    /// `max_value_bytes` check. Cheap and approximate: an exact count would
    /// require a second pass over the payload on every key.
    pub fn estimated_size(&self) -> usize {
        let body = match &self.payload {
            Payload::String(b) => b.len(),
            Payload::Hash(pairs) => pairs.iter().map(|(k, v)| k.len() + v.len()).sum(),
            Payload::List(items) | Payload::Set(items) => {
                items.iter().map(|i| i.len()).sum()
            },
            Payload::SortedSet(pairs) => pairs.iter().map(|(m, _)| m.len() + 8).sum(),
            Payload::Stream(entries) => entries
                .iter()
                .map(|e| e.id.len() + e.fields.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>())
                .sum(),
            Payload::Dump(b) => b.len(),
            Payload::Tombstone => 0,
        };
        self.key.len() + body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_is_tombstone() {
        let r = KeyRecord::tombstone(Bytes::from_static(b"user:1"), DataKind::String);
        assert!(r.is_tombstone());
        assert_eq!(r.ttl_ms, TTL_MISSING);
    }

    #[test]
    fn estimated_size_counts_key_and_value() {
        let r = KeyRecord {
            key: Bytes::from_static(b"k"),
            kind: DataKind::String,
            payload: Payload::String(Bytes::from_static(b"value")),
            ttl_ms: TTL_NONE,
        };
        assert_eq!(r.estimated_size(), 1 + 5);
    }
}
