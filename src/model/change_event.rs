// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::SystemTime;

use bytes::Bytes;
use md5::{Digest, Md5};

use crate::model::key_record::KeyRecord;

/// A 128-bit digest of `(key, kind, value-bytes)`.
///
/// Two events with equal fingerprints within the dedup window are
/// considered equivalent for deduplication purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn compute(key: &[u8], kind_tag: &str, value_bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(key);
        hasher.update(b"\0");
        hasher.update(kind_tag.as_bytes());
        hasher.update(b"\0");
        hasher.update(value_bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        Fingerprint(out)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// One change ready to be fanned out to every enabled target.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub record: KeyRecord,
    pub origin: SystemTime,
    pub fingerprint: Fingerprint,
}

impl ChangeEvent {
    pub fn new(record: KeyRecord) -> Self {
        let value_bytes = canonical_value_bytes(&record);
        let fingerprint =
            Fingerprint::compute(&record.key, record.kind.to_string().as_str(), &value_bytes);
        Self { record, origin: SystemTime::now(), fingerprint }
    }
}

/// Renders a payload into a flat byte sequence suitable for fingerprinting.
/// Not a wire format: only required to be deterministic for identical
/// payloads, not to round-trip.
fn canonical_value_bytes(record: &KeyRecord) -> Bytes {
    use crate::model::key_record::Payload;
    let mut buf = Vec::new();
    match &record.payload {
        Payload::String(b) => buf.extend_from_slice(b),
        Payload::Hash(pairs) => {
            for (k, v) in pairs {
                buf.extend_from_slice(k);
                buf.push(b'=');
                buf.extend_from_slice(v);
                buf.push(b';');
            }
        },
        Payload::List(items) | Payload::Set(items) => {
            for i in items {
                buf.extend_from_slice(i);
                buf.push(b';');
            }
        },
        Payload::SortedSet(pairs) => {
            for (m, score) in pairs {
                buf.extend_from_slice(m);
                buf.extend_from_slice(format!(":{score};").as_bytes());
            }
        },
        Payload::Stream(entries) => {
            for e in entries {
                buf.extend_from_slice(e.id.as_bytes());
                for (k, v) in &e.fields {
                    buf.extend_from_slice(k);
                    buf.push(b'=');
                    buf.extend_from_slice(v);
                }
                buf.push(b';');
            }
        },
        Payload::Dump(b) => buf.extend_from_slice(b),
        Payload::Tombstone => buf.extend_from_slice(b"\0tombstone\0"),
    }
    buf.extend_from_slice(format!(":ttl={}", record.ttl_ms).as_bytes());
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use crate::cfg::enums::DataKind;
    use crate::model::key_record::{Payload, TTL_NONE};

    use super::*;

    #[test]
    fn identical_payloads_fingerprint_identically() {
        let a = KeyRecord {
            key: Bytes::from_static(b"user:1"),
            kind: DataKind::String,
            payload: Payload::String(Bytes::from_static(b"alice")),
            ttl_ms: TTL_NONE,
        };
        let b = a.clone();
        assert_eq!(ChangeEvent::new(a).fingerprint, ChangeEvent::new(b).fingerprint);
    }

    #[test]
    fn different_values_fingerprint_differently() {
        let a = KeyRecord {
            key: Bytes::from_static(b"user:1"),
            kind: DataKind::String,
            payload: Payload::String(Bytes::from_static(b"alice")),
            ttl_ms: TTL_NONE,
        };
        let mut b = a.clone();
        b.payload = Payload::String(Bytes::from_static(b"bob"));
        assert_ne!(ChangeEvent::new(a).fingerprint, ChangeEvent::new(b).fingerprint);
    }
}
