// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A minimal RDB payload parser (§4.5 "rdb-sync"): turns the byte blob a
//! source sends after `FULLRESYNC`/`SYNC` into a stream of [`KeyRecord`]s.
//!
//! This is not a byte-exact reimplementation of every RDB encoding Redis
//! has ever shipped. It fully decodes the object types that matter for
//! the six data kinds this crate migrates (plain string/list/set/
//! hash/zset, the `ZSET_2` double-precision variant, `intset`-encoded
//! sets, and ziplist/listpack-encoded list/hash/zset/set blobs). Stream
//! entries stored as listpacks and Redis modules are structurally
//! skipped (the parser still advances past them correctly) rather than
//! decoded into [`crate::model::key_record::Payload::Stream`] — see
//! `DESIGN.md` for the reasoning; this mirrors the spec's own open
//! question about streams and consumer-group metadata.

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;

use crate::{
    cfg::enums::DataKind,
    model::key_record::{KeyRecord, Payload, TTL_NONE, TTL_PERSISTENT},
};

const OP_SLOT_INFO: u8 = 0xF4;
const OP_FUNCTION2: u8 = 0xF5;
const OP_FUNCTION: u8 = 0xF6;
const OP_MODULE_AUX: u8 = 0xF7;
const OP_IDLE: u8 = 0xF8;
const OP_FREQ: u8 = 0xF9;
const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_EXPIRETIME_MS: u8 = 0xFC;
const OP_EXPIRETIME: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;
const TYPE_ZSET_2: u8 = 5;
const TYPE_MODULE: u8 = 6;
const TYPE_MODULE_2: u8 = 7;
const TYPE_HASH_ZIPMAP: u8 = 9;
const TYPE_LIST_ZIPLIST: u8 = 10;
const TYPE_SET_INTSET: u8 = 11;
const TYPE_ZSET_ZIPLIST: u8 = 12;
const TYPE_HASH_ZIPLIST: u8 = 13;
const TYPE_LIST_QUICKLIST: u8 = 14;
const TYPE_STREAM_LISTPACKS: u8 = 15;
const TYPE_HASH_LISTPACK: u8 = 16;
const TYPE_ZSET_LISTPACK: u8 = 17;
const TYPE_LIST_QUICKLIST_2: u8 = 18;
const TYPE_STREAM_LISTPACKS_2: u8 = 19;
const TYPE_SET_LISTPACK: u8 = 20;
const TYPE_STREAM_LISTPACKS_3: u8 = 21;

/// One record pulled out of the RDB stream: either a key worth migrating
/// or a structurally-skipped one that the caller should count as such.
pub enum RdbItem {
    Key(KeyRecord),
    Skipped { key: Bytes, reason: &'static str },
}

/// Parses a fully-buffered RDB payload record by record.
///
/// Synchronous and allocation-light by design: the async caller
/// (`rdb_sync::run`, and the PSYNC driver's `FullResync` transition)
/// calls [`RdbParser::next_item`] in a loop and yields to the runtime
/// between calls, per §5 "the RDB parser must yield between records".
pub struct RdbParser<'a> {
    buf: &'a [u8],
    pos: usize,
    pending_expiry_ms: Option<i64>,
    done: bool,
}

impl<'a> RdbParser<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < 9 || &buf[0..5] != b"REDIS" {
            bail!("not an RDB payload: missing REDIS magic header");
        }
        Ok(Self { buf, pos: 9, pending_expiry_ms: None, done: false })
    }

    /// Returns the next key record, `None` once `EOF` is reached.
    pub fn next_item(&mut self) -> Result<Option<RdbItem>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let opcode = self.read_u8().context("reading next RDB opcode/type byte")?;
            match opcode {
                OP_EOF => {
                    self.done = true;
                    return Ok(None);
                },
                OP_SELECTDB => {
                    self.read_length()?;
                },
                OP_RESIZEDB => {
                    self.read_length()?;
                    self.read_length()?;
                },
                OP_AUX => {
                    self.read_string()?;
                    self.read_string()?;
                },
                OP_EXPIRETIME_MS => {
                    let ms = self.read_u64_le()? as i64;
                    self.pending_expiry_ms = Some(ms);
                },
                OP_EXPIRETIME => {
                    let secs = self.read_u32_le()? as i64;
                    self.pending_expiry_ms = Some(secs * 1000);
                },
                OP_IDLE => {
                    self.read_length()?;
                },
                OP_FREQ => {
                    self.read_u8()?;
                },
                OP_FUNCTION | OP_FUNCTION2 => {
                    self.read_string()?;
                },
                OP_SLOT_INFO => {
                    self.read_length()?;
                    self.read_length()?;
                    self.read_length()?;
                },
                OP_MODULE_AUX => {
                    bail!("RDB module aux data has no generic skip rule; cannot continue parsing");
                },
                value_type => {
                    let expiry_ms = self.pending_expiry_ms.take();
                    return self.read_object(value_type, expiry_ms).map(Some);
                },
            }
        }
    }

    fn read_object(&mut self, value_type: u8, expiry_ms: Option<i64>) -> Result<RdbItem> {
        let key = self.read_string().context("reading key name")?;
        let ttl_ms = ttl_from_expiry(expiry_ms);

        let payload = match value_type {
            TYPE_STRING => Payload::String(self.read_string()?),
            TYPE_LIST => {
                let n = self.read_length()?;
                Payload::List(self.read_n_strings(n)?)
            },
            TYPE_SET => {
                let n = self.read_length()?;
                Payload::Set(self.read_n_strings(n)?)
            },
            TYPE_HASH => {
                let n = self.read_length()?;
                Payload::Hash(self.read_n_pairs(n)?)
            },
            TYPE_ZSET => {
                let n = self.read_length()?;
                let mut members = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let member = self.read_string()?;
                    let score_str = self.read_string()?;
                    let score: f64 = std::str::from_utf8(&score_str)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow!("invalid RDB zset score"))?;
                    members.push((member, score));
                }
                Payload::SortedSet(members)
            },
            TYPE_ZSET_2 => {
                let n = self.read_length()?;
                let mut members = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let member = self.read_string()?;
                    let score = f64::from_le_bytes(self.read_bytes(8)?.try_into().expect("8 bytes"));
                    members.push((member, score));
                }
                Payload::SortedSet(members)
            },
            TYPE_SET_INTSET => Payload::Set(decode_intset(&self.read_string()?)?),
            TYPE_LIST_ZIPLIST => Payload::List(decode_ziplist(&self.read_string()?)?),
            TYPE_HASH_ZIPLIST => Payload::Hash(pairs_from_flat(decode_ziplist(&self.read_string()?)?)?),
            TYPE_ZSET_ZIPLIST => {
                Payload::SortedSet(scored_pairs_from_flat(decode_ziplist(&self.read_string()?)?)?)
            },
            TYPE_HASH_LISTPACK => Payload::Hash(pairs_from_flat(decode_listpack(&self.read_string()?)?)?),
            TYPE_ZSET_LISTPACK => {
                Payload::SortedSet(scored_pairs_from_flat(decode_listpack(&self.read_string()?)?)?)
            },
            TYPE_SET_LISTPACK => Payload::Set(decode_listpack(&self.read_string()?)?),
            TYPE_LIST_QUICKLIST => {
                let n = self.read_length()?;
                let mut items = Vec::new();
                for _ in 0..n {
                    items.extend(decode_ziplist(&self.read_string()?)?);
                }
                Payload::List(items)
            },
            TYPE_LIST_QUICKLIST_2 => {
                let n = self.read_length()?;
                let mut items = Vec::new();
                for _ in 0..n {
                    let container = self.read_length()?;
                    let blob = self.read_string()?;
                    if container == 1 {
                        items.extend(decode_listpack(&blob)?);
                    } else {
                        items.push(blob);
                    }
                }
                Payload::List(items)
            },
            TYPE_HASH_ZIPMAP => {
                self.read_string()?; // opaque legacy zipmap blob, superseded by ziplist/listpack long ago
                return Ok(RdbItem::Skipped { key, reason: "hash-zipmap encoding not decoded" });
            },
            TYPE_MODULE | TYPE_MODULE_2 => {
                bail!("RDB module value for key {:?} has no generic skip rule", String::from_utf8_lossy(&key));
            },
            TYPE_STREAM_LISTPACKS | TYPE_STREAM_LISTPACKS_2 | TYPE_STREAM_LISTPACKS_3 => {
                self.skip_stream(value_type)?;
                return Ok(RdbItem::Skipped { key, reason: "stream entries not migrated via rdb-sync" });
            },
            other => bail!("unsupported RDB value type byte: {other}"),
        };

        let kind = match &payload {
            Payload::String(_) => DataKind::String,
            Payload::Hash(_) => DataKind::Hash,
            Payload::List(_) => DataKind::List,
            Payload::Set(_) => DataKind::Set,
            Payload::SortedSet(_) => DataKind::SortedSet,
            Payload::Stream(_) => DataKind::Stream,
            Payload::Dump(_) | Payload::Tombstone => unreachable!("rdb parser never produces these"),
        };

        Ok(RdbItem::Key(KeyRecord { key, kind, payload, ttl_ms }))
    }

    /// Structurally skips a stream's rax tree of listpacks plus its
    /// length/last-id/consumer-group metadata, without decoding stream
    /// entries. See the module doc comment.
    fn skip_stream(&mut self, value_type: u8) -> Result<()> {
        let listpacks = self.read_length()?;
        for _ in 0..listpacks {
            self.read_string()?; // master stream ID (16 raw bytes, RDB-string-wrapped)
            self.read_string()?; // listpack blob
        }

        self.read_length()?; // length (element count)
        self.read_length()?; // last_id.ms
        self.read_length()?; // last_id.seq

        if value_type >= TYPE_STREAM_LISTPACKS_2 {
            self.read_length()?; // first_id.ms
            self.read_length()?; // first_id.seq
            self.read_length()?; // max_deleted_entry_id.ms
            self.read_length()?; // max_deleted_entry_id.seq
            self.read_length()?; // entries_added
        }

        let cgroups = self.read_length()?;
        for _ in 0..cgroups {
            self.read_string()?; // group name
            self.read_length()?; // last_delivered_id.ms
            self.read_length()?; // last_delivered_id.seq
            if value_type >= TYPE_STREAM_LISTPACKS_2 {
                self.read_length()?; // entries_read
            }

            let global_pel = self.read_length()?;
            for _ in 0..global_pel {
                self.read_bytes(16)?; // stream ID, fixed-width
                self.read_bytes(8)?; // delivery time, fixed-width
                self.read_length()?; // delivery count
            }

            let consumers = self.read_length()?;
            for _ in 0..consumers {
                self.read_string()?; // consumer name
                self.read_bytes(8)?; // seen time
                if value_type >= TYPE_STREAM_LISTPACKS_3 {
                    self.read_bytes(8)?; // active time
                }
                let consumer_pel = self.read_length()?;
                for _ in 0..consumer_pel {
                    self.read_bytes(16)?; // stream ID referencing the global PEL
                }
            }
        }
        Ok(())
    }

    fn read_n_strings(&mut self, n: u64) -> Result<Vec<Bytes>> {
        (0..n).map(|_| self.read_string()).collect()
    }

    fn read_n_pairs(&mut self, n: u64) -> Result<Vec<(Bytes, Bytes)>> {
        (0..n).map(|_| Ok((self.read_string()?, self.read_string()?))).collect()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(|| anyhow!("unexpected end of RDB payload"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        if self.pos + n > self.buf.len() {
            bail!("unexpected end of RDB payload (wanted {n} bytes)");
        }
        let out = Bytes::copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(out)
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_bytes(4)?.as_ref().try_into().expect("4 bytes")))
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_bytes(4)?.as_ref().try_into().expect("4 bytes")))
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_bytes(8)?.as_ref().try_into().expect("8 bytes")))
    }

    /// Reads one RDB length-encoded integer, or a special encoding marker
    /// folded into the same call (used internally by [`Self::read_string`]
    /// to tell "plain length" from "compact integer/LZF encoding" apart).
    fn read_length_or_encoding(&mut self) -> Result<(u64, Option<u8>)> {
        let first = self.read_u8()?;
        match first >> 6 {
            0b00 => Ok(((first & 0x3F) as u64, None)),
            0b01 => {
                let second = self.read_u8()?;
                Ok((((first as u64 & 0x3F) << 8) | second as u64, None))
            },
            0b10 => {
                if first & 0x3F == 0 {
                    Ok((self.read_u32_be()? as u64, None))
                } else {
                    Ok((self.read_u64_be()?, None))
                }
            },
            _ => Ok((0, Some(first & 0x3F))),
        }
    }

    fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_bytes(8)?.as_ref().try_into().expect("8 bytes")))
    }

    fn read_length(&mut self) -> Result<u64> {
        let (len, encoding) = self.read_length_or_encoding()?;
        if encoding.is_some() {
            bail!("expected a plain length, found a special integer/LZF encoding marker");
        }
        Ok(len)
    }

    /// Reads an RDB "string": a plain length-prefixed byte string, a
    /// compactly-encoded integer (rendered back out as its ASCII decimal
    /// form, matching what a real `GET`/`HGETALL` reply would show), or an
    /// LZF-compressed blob.
    fn read_string(&mut self) -> Result<Bytes> {
        let (len, encoding) = self.read_length_or_encoding()?;
        match encoding {
            None => self.read_bytes(len as usize),
            Some(0) => Ok(Bytes::from((self.read_u8()? as i8).to_string())),
            Some(1) => {
                let v = i16::from_le_bytes(self.read_bytes(2)?.as_ref().try_into().expect("2 bytes"));
                Ok(Bytes::from(v.to_string()))
            },
            Some(2) => {
                let v = i32::from_le_bytes(self.read_bytes(4)?.as_ref().try_into().expect("4 bytes"));
                Ok(Bytes::from(v.to_string()))
            },
            Some(3) => {
                let compressed_len = self.read_length()?;
                let decompressed_len = self.read_length()?;
                let compressed = self.read_bytes(compressed_len as usize)?;
                Ok(Bytes::from(lzf_decompress(&compressed, decompressed_len as usize)?))
            },
            Some(other) => bail!("unsupported RDB string special encoding: {other}"),
        }
    }
}

fn ttl_from_expiry(expiry_ms: Option<i64>) -> i64 {
    match expiry_ms {
        None => TTL_NONE,
        Some(at_ms) => {
            let now_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            (at_ms - now_ms).max(TTL_PERSISTENT)
        },
    }
}

/// Decodes liblzf-compressed data, the scheme Redis uses for RDB string
/// compression.
fn lzf_decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut i = 0usize;
    while i < input.len() {
        let ctrl = input[i] as usize;
        i += 1;
        if ctrl < 32 {
            let len = ctrl + 1;
            if i + len > input.len() {
                bail!("LZF literal run overruns input");
            }
            out.extend_from_slice(&input[i..i + len]);
            i += len;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                len += *input.get(i).ok_or_else(|| anyhow!("LZF truncated length byte"))? as usize;
                i += 1;
            }
            let low = *input.get(i).ok_or_else(|| anyhow!("LZF truncated reference byte"))? as usize;
            i += 1;
            let ref_offset = ((ctrl & 0x1F) << 8) | low;
            let mut ref_pos = out
                .len()
                .checked_sub(ref_offset + 1)
                .ok_or_else(|| anyhow!("LZF back-reference points before start of output"))?;
            for _ in 0..(len + 2) {
                let b = out[ref_pos];
                out.push(b);
                ref_pos += 1;
            }
        }
    }
    Ok(out)
}

/// Decodes a little-endian Redis `intset` blob into its members, rendered
/// as ASCII decimal strings (what `SMEMBERS` would actually return).
fn decode_intset(blob: &[u8]) -> Result<Vec<Bytes>> {
    if blob.len() < 8 {
        bail!("intset blob too short");
    }
    let encoding = u32::from_le_bytes(blob[0..4].try_into().expect("4 bytes")) as usize;
    let length = u32::from_le_bytes(blob[4..8].try_into().expect("4 bytes")) as usize;
    let mut out = Vec::with_capacity(length);
    let mut pos = 8;
    for _ in 0..length {
        if pos + encoding > blob.len() {
            bail!("intset blob truncated");
        }
        let value: i64 = match encoding {
            2 => i16::from_le_bytes(blob[pos..pos + 2].try_into().expect("2 bytes")) as i64,
            4 => i32::from_le_bytes(blob[pos..pos + 4].try_into().expect("4 bytes")) as i64,
            8 => i64::from_le_bytes(blob[pos..pos + 8].try_into().expect("8 bytes")),
            other => bail!("unsupported intset encoding width: {other}"),
        };
        out.push(Bytes::from(value.to_string()));
        pos += encoding;
    }
    Ok(out)
}

/// Bounds-checks a forthcoming `blob[start..start+len]` read the way
/// `decode_intset` already does for its fixed-width fields, so a
/// truncated ziplist/listpack blob returns `Err` instead of panicking on
/// an out-of-bounds slice.
fn check_slice(blob: &[u8], start: usize, len: usize, what: &str) -> Result<()> {
    if start + len > blob.len() {
        bail!("{what} truncated");
    }
    Ok(())
}

/// Decodes a legacy `ziplist` blob into its flat entry list (one `Bytes`
/// per entry; callers chunk pairs of entries into hash/zset members as
/// needed).
fn decode_ziplist(blob: &[u8]) -> Result<Vec<Bytes>> {
    if blob.len() < 11 {
        bail!("ziplist blob too short");
    }
    let mut pos = 10; // zlbytes(4) + zltail(4) + zllen(2)
    let mut out = Vec::new();
    while pos < blob.len() {
        if blob[pos] == 0xFF {
            break;
        }
        // prevlen
        if blob[pos] < 254 {
            pos += 1;
        } else {
            pos += 5;
        }
        if pos >= blob.len() {
            bail!("ziplist truncated mid-entry");
        }
        let b0 = blob[pos];
        match b0 >> 6 {
            0b00 => {
                let len = (b0 & 0x3F) as usize;
                pos += 1;
                check_slice(blob, pos, len, "ziplist 6-bit string entry")?;
                out.push(Bytes::copy_from_slice(&blob[pos..pos + len]));
                pos += len;
            },
            0b01 => {
                check_slice(blob, pos, 2, "ziplist 14-bit length header")?;
                let len = (((b0 & 0x3F) as usize) << 8) | blob[pos + 1] as usize;
                pos += 2;
                check_slice(blob, pos, len, "ziplist 14-bit string entry")?;
                out.push(Bytes::copy_from_slice(&blob[pos..pos + len]));
                pos += len;
            },
            0b10 => {
                check_slice(blob, pos + 1, 4, "ziplist 32-bit length header")?;
                let len = u32::from_be_bytes(blob[pos + 1..pos + 5].try_into().expect("4 bytes")) as usize;
                pos += 5;
                check_slice(blob, pos, len, "ziplist 32-bit string entry")?;
                out.push(Bytes::copy_from_slice(&blob[pos..pos + len]));
                pos += len;
            },
            _ => {
                // integer encodings, all under the 0xC0 prefix
                let (value, consumed): (i64, usize) = match b0 {
                    0xC0 => {
                        check_slice(blob, pos + 1, 2, "ziplist int16 entry")?;
                        (
                            i16::from_le_bytes(blob[pos + 1..pos + 3].try_into().expect("2 bytes")) as i64,
                            3,
                        )
                    },
                    0xD0 => {
                        check_slice(blob, pos + 1, 4, "ziplist int32 entry")?;
                        (
                            i32::from_le_bytes(blob[pos + 1..pos + 5].try_into().expect("4 bytes")) as i64,
                            5,
                        )
                    },
                    0xE0 => {
                        check_slice(blob, pos + 1, 8, "ziplist int64 entry")?;
                        (
                            i64::from_le_bytes(blob[pos + 1..pos + 9].try_into().expect("8 bytes")),
                            9,
                        )
                    },
                    0xF0 => {
                        check_slice(blob, pos + 1, 3, "ziplist int24 entry")?;
                        let mut raw = [0u8; 4];
                        raw[..3].copy_from_slice(&blob[pos + 1..pos + 4]);
                        let mut v = i32::from_le_bytes(raw);
                        if v & 0x0080_0000 != 0 {
                            v |= -0x0100_0000i32; // sign-extend 24-bit
                        }
                        (v as i64, 4)
                    },
                    0xFE => {
                        check_slice(blob, pos + 1, 1, "ziplist int8 entry")?;
                        (blob[pos + 1] as i8 as i64, 2)
                    },
                    other if (0xF1..=0xFD).contains(&other) => ((other & 0x0F) as i64 - 1, 1),
                    other => bail!("unsupported ziplist entry encoding: {other:#x}"),
                };
                out.push(Bytes::from(value.to_string()));
                pos += consumed;
            },
        }
    }
    Ok(out)
}

/// Decodes a `listpack` blob (the ziplist successor used since Redis 7)
/// into its flat entry list.
fn decode_listpack(blob: &[u8]) -> Result<Vec<Bytes>> {
    if blob.len() < 7 {
        bail!("listpack blob too short");
    }
    let mut pos = 6; // total-bytes(4) + num-elements(2)
    let mut out = Vec::new();
    while pos < blob.len() && blob[pos] != 0xFF {
        let start = pos;
        let b0 = blob[pos];
        let (value, data_len): (Bytes, usize) = if b0 & 0x80 == 0 {
            (Bytes::from((b0 & 0x7F).to_string()), 1)
        } else if b0 & 0xC0 == 0x80 {
            let len = (b0 & 0x3F) as usize;
            check_slice(blob, pos + 1, len, "listpack 6-bit string entry")?;
            (Bytes::copy_from_slice(&blob[pos + 1..pos + 1 + len]), 1 + len)
        } else if b0 & 0xE0 == 0xC0 {
            check_slice(blob, pos + 1, 1, "listpack 13-bit int header")?;
            let raw = (((b0 & 0x1F) as u16) << 8) | blob[pos + 1] as u16;
            let v = if raw & 0x1000 != 0 { raw as i16 | !0x1FFFi16 } else { raw as i16 };
            (Bytes::from(v.to_string()), 2)
        } else if b0 & 0xF0 == 0xE0 {
            check_slice(blob, pos + 1, 1, "listpack 12-bit length header")?;
            let len = (((b0 & 0x0F) as usize) << 8) | blob[pos + 1] as usize;
            check_slice(blob, pos + 2, len, "listpack 12-bit string entry")?;
            (Bytes::copy_from_slice(&blob[pos + 2..pos + 2 + len]), 2 + len)
        } else {
            match b0 {
                0xF1 => {
                    check_slice(blob, pos + 1, 2, "listpack int16 entry")?;
                    let v = i16::from_le_bytes(blob[pos + 1..pos + 3].try_into().expect("2 bytes"));
                    (Bytes::from(v.to_string()), 3)
                },
                0xF2 => {
                    check_slice(blob, pos + 1, 3, "listpack int24 entry")?;
                    let mut raw = [0u8; 4];
                    raw[..3].copy_from_slice(&blob[pos + 1..pos + 4]);
                    let mut v = i32::from_le_bytes(raw);
                    if v & 0x0080_0000 != 0 {
                        v |= -0x0100_0000i32;
                    }
                    (Bytes::from(v.to_string()), 4)
                },
                0xF3 => {
                    check_slice(blob, pos + 1, 4, "listpack int32 entry")?;
                    let v = i32::from_le_bytes(blob[pos + 1..pos + 5].try_into().expect("4 bytes"));
                    (Bytes::from(v.to_string()), 5)
                },
                0xF4 => {
                    check_slice(blob, pos + 1, 8, "listpack int64 entry")?;
                    let v = i64::from_le_bytes(blob[pos + 1..pos + 9].try_into().expect("8 bytes"));
                    (Bytes::from(v.to_string()), 9)
                },
                0xF0 => {
                    check_slice(blob, pos + 1, 4, "listpack 32-bit length header")?;
                    let len =
                        u32::from_le_bytes(blob[pos + 1..pos + 5].try_into().expect("4 bytes")) as usize;
                    check_slice(blob, pos + 5, len, "listpack 32-bit string entry")?;
                    (Bytes::copy_from_slice(&blob[pos + 5..pos + 5 + len]), 5 + len)
                },
                other => bail!("unsupported listpack entry encoding: {other:#x}"),
            }
        };
        out.push(value);
        pos = start + data_len + backlen_size(data_len);
    }
    Ok(out)
}

/// Number of bytes the listpack `backlen` trailer occupies for an entry
/// of `entry_len` bytes. We only ever need to skip past it, never decode
/// it, since the entry length is already known from the forward parse.
fn backlen_size(entry_len: usize) -> usize {
    match entry_len {
        0..=127 => 1,
        128..=16383 => 2,
        16384..=2_097_151 => 3,
        2_097_152..=268_435_455 => 4,
        _ => 5,
    }
}

fn pairs_from_flat(flat: Vec<Bytes>) -> Result<Vec<(Bytes, Bytes)>> {
    if flat.len() % 2 != 0 {
        bail!("expected an even number of flat entries for a field/value pair list");
    }
    Ok(flat.chunks(2).map(|c| (c[0].clone(), c[1].clone())).collect())
}

fn scored_pairs_from_flat(flat: Vec<Bytes>) -> Result<Vec<(Bytes, f64)>> {
    if flat.len() % 2 != 0 {
        bail!("expected an even number of flat entries for a member/score pair list");
    }
    flat.chunks(2)
        .map(|c| {
            let score: f64 = std::str::from_utf8(&c[1])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| anyhow!("invalid zset score in ziplist/listpack"))?;
            Ok((c[0].clone(), score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rdb_header() -> Vec<u8> {
        b"REDIS0011".to_vec()
    }

    #[test]
    fn parses_a_single_plain_string_key() {
        let mut buf = rdb_header();
        buf.push(TYPE_STRING);
        buf.push(2); // key length 2, 6-bit encoding
        buf.extend_from_slice(b"k1");
        buf.push(5); // value length 5
        buf.extend_from_slice(b"hello");
        buf.push(OP_EOF);

        let mut parser = RdbParser::new(&buf).unwrap();
        let item = parser.next_item().unwrap().unwrap();
        match item {
            RdbItem::Key(rec) => {
                assert_eq!(&rec.key[..], b"k1");
                assert_eq!(rec.payload, Payload::String(Bytes::from_static(b"hello")));
                assert_eq!(rec.ttl_ms, TTL_NONE);
            },
            RdbItem::Skipped { .. } => panic!("expected a key"),
        }
        assert!(parser.next_item().unwrap().is_none());
    }

    #[test]
    fn parses_expiry_before_a_key() {
        let mut buf = rdb_header();
        buf.push(OP_EXPIRETIME_MS);
        let far_future_ms: u64 = 4_102_444_800_000; // year 2100, comfortably in the future
        buf.extend_from_slice(&far_future_ms.to_le_bytes());
        buf.push(TYPE_STRING);
        buf.push(1);
        buf.extend_from_slice(b"k");
        buf.push(1);
        buf.extend_from_slice(b"v");
        buf.push(OP_EOF);

        let mut parser = RdbParser::new(&buf).unwrap();
        let RdbItem::Key(rec) = parser.next_item().unwrap().unwrap() else { panic!("expected a key") };
        assert!(rec.ttl_ms > 0);
    }

    #[test]
    fn decodes_intset_members() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&2u32.to_le_bytes()); // 2-byte ints
        blob.extend_from_slice(&2u32.to_le_bytes()); // 2 members
        blob.extend_from_slice(&1i16.to_le_bytes());
        blob.extend_from_slice(&2i16.to_le_bytes());
        let members = decode_intset(&blob).unwrap();
        assert_eq!(members, vec![Bytes::from_static(b"1"), Bytes::from_static(b"2")]);
    }

    #[test]
    fn lzf_round_trips_a_simple_literal_run() {
        // A single literal-run-only LZF stream is just ctrl byte (len-1) + raw bytes.
        let input = [4u8, b'h', b'e', b'l', b'l', b'o'];
        let out = lzf_decompress(&input, 5).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn backlen_size_matches_known_thresholds() {
        assert_eq!(backlen_size(10), 1);
        assert_eq!(backlen_size(127), 1);
        assert_eq!(backlen_size(128), 2);
        assert_eq!(backlen_size(16383), 2);
        assert_eq!(backlen_size(16384), 3);
    }
}
